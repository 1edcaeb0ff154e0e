//! Security pipeline errors.

use thiserror::Error;

/// Errors from signing, encryption and their inverses.
///
/// On the receive path these are recoverable: the pipeline maps signature
/// failures to an ebMS `FailedAuthentication` signal and decryption
/// failures to `FailedDecryption`, never a dropped connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    /// No key material registered under the alias.
    #[error("Unknown key alias: {alias}")]
    UnknownAlias { alias: String },

    /// Key bytes do not form a valid key.
    #[error("Invalid key material for alias {alias}")]
    InvalidKey { alias: String },

    /// The signature does not verify over the signed-info block.
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// A recomputed digest differs from the signed digest.
    #[error("Digest mismatch for reference {reference}")]
    DigestMismatch { reference: String },

    /// The signature does not cover one of the attachments.
    #[error("Signature does not cover attachment {content_id}")]
    UncoveredAttachment { content_id: String },

    /// The signature does not cover the SOAP body.
    #[error("Signature does not cover the SOAP body")]
    UncoveredBody,

    /// A signed or encrypted reference points at a part that is absent.
    #[error("Security reference {uri} has no matching part")]
    UnknownReference { uri: String },

    /// The leg requires a signature but the message carries none.
    #[error("Security policy requires a signature but none is present")]
    MissingSignature,

    /// The leg requires encryption but the message is plaintext.
    #[error("Security policy requires encryption but none is present")]
    MissingEncryption,

    /// AEAD encryption failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD decryption failed (wrong key, tampered ciphertext).
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The security header is structurally invalid.
    #[error("Malformed security header: {0}")]
    MalformedHeader(String),

    /// The signature algorithm is not supported by this engine.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedSignatureAlgorithm(String),

    /// Reading attachment content failed.
    #[error("I/O error on part {reference}: {detail}")]
    Io { reference: String, detail: String },
}
