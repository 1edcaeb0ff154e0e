//! # Signing and Verification
//!
//! Digests over the SOAP body and every attachment part, assembled into
//! the signed-info block, Ed25519 signature over that block. Attachment
//! bytes are read, never mutated.
//!
//! Verification recomputes every digest from the (decrypted) message and
//! rebuilds the signed-info serialization from the parsed header, so a
//! single flipped byte in any covered part fails with a typed
//! [`SecurityError`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;

use as4_attachment::Attachment;
use as4_model::{strip_cid, SoapEnvelope, PREFIX_CID};
use as4_pmode::{DigestAlgorithm, SignatureAlgorithm};

use crate::errors::SecurityError;
use crate::header::{signed_info_xml, DigestReference, SignatureInfo};
use crate::keystore::KeyStore;

/// Reference URI of the SOAP body part.
pub const BODY_REFERENCE: &str = "#body";

/// Compute a digest with the configured algorithm.
#[must_use]
pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// Sign an assembled message.
///
/// Produces the signature block for the security header: a digest
/// reference for the body (when present) and for every attachment, plus
/// the signature over the signed-info serialization.
///
/// # Errors
///
/// - `UnknownAlias` when the signing key is not in the store
/// - `Io` when attachment content cannot be read
pub fn sign_message(
    keystore: &KeyStore,
    alias: &str,
    signature_algorithm: SignatureAlgorithm,
    digest_algorithm: DigestAlgorithm,
    envelope: &SoapEnvelope,
    attachments: &[Attachment],
) -> Result<SignatureInfo, SecurityError> {
    let mut references = Vec::with_capacity(attachments.len() + 1);
    references.push(DigestReference {
        uri: BODY_REFERENCE.to_owned(),
        algorithm: digest_algorithm.uri().to_owned(),
        digest_b64: BASE64.encode(digest(digest_algorithm, envelope.body_bytes())),
    });
    for attachment in attachments {
        let content = attachment.content().map_err(|e| SecurityError::Io {
            reference: attachment.content_id().to_owned(),
            detail: e.to_string(),
        })?;
        references.push(DigestReference {
            uri: format!("{PREFIX_CID}{}", attachment.content_id()),
            algorithm: digest_algorithm.uri().to_owned(),
            digest_b64: BASE64.encode(digest(digest_algorithm, &content)),
        });
    }

    let signed_info = signed_info_xml(signature_algorithm.uri(), &references)?;
    let signature = keystore.sign(alias, signed_info.as_bytes())?;
    debug!(alias, references = references.len(), "signed message");

    Ok(SignatureInfo {
        key_alias: alias.to_owned(),
        signature_algorithm: signature_algorithm.uri().to_owned(),
        references,
        signature_b64: BASE64.encode(signature),
    })
}

/// Verify a parsed signature block against the (decrypted) message.
///
/// # Errors
///
/// - `UnsupportedSignatureAlgorithm` for algorithms outside the engine
/// - `DigestMismatch` when a covered part was altered
/// - `UncoveredBody` / `UncoveredAttachment` when coverage is incomplete
/// - `UnknownReference` when a reference targets a missing part
/// - `UnknownAlias` / `SignatureVerificationFailed` from the key store
pub fn verify_message(
    keystore: &KeyStore,
    signature: &SignatureInfo,
    envelope: &SoapEnvelope,
    attachments: &[Attachment],
) -> Result<(), SecurityError> {
    if signature.signature_algorithm != SignatureAlgorithm::Ed25519.uri() {
        return Err(SecurityError::UnsupportedSignatureAlgorithm(
            signature.signature_algorithm.clone(),
        ));
    }

    for reference in &signature.references {
        let algorithm = DigestAlgorithm::from_uri(&reference.algorithm).ok_or_else(|| {
            SecurityError::MalformedHeader(format!(
                "unknown digest algorithm {}",
                reference.algorithm
            ))
        })?;
        let actual = if reference.uri == BODY_REFERENCE {
            digest(algorithm, envelope.body_bytes())
        } else {
            let content_id = strip_cid(&reference.uri).ok_or_else(|| {
                SecurityError::UnknownReference {
                    uri: reference.uri.clone(),
                }
            })?;
            let attachment = attachments
                .iter()
                .find(|a| a.content_id() == content_id)
                .ok_or_else(|| SecurityError::UnknownReference {
                    uri: reference.uri.clone(),
                })?;
            let content = attachment.content().map_err(|e| SecurityError::Io {
                reference: reference.uri.clone(),
                detail: e.to_string(),
            })?;
            digest(algorithm, &content)
        };
        if BASE64.encode(actual) != reference.digest_b64 {
            return Err(SecurityError::DigestMismatch {
                reference: reference.uri.clone(),
            });
        }
    }

    // Coverage: the body and every attachment must be referenced.
    if !envelope.body_bytes().is_empty()
        && !signature.references.iter().any(|r| r.uri == BODY_REFERENCE)
    {
        return Err(SecurityError::UncoveredBody);
    }
    for attachment in attachments {
        let uri = format!("{PREFIX_CID}{}", attachment.content_id());
        if !signature.references.iter().any(|r| r.uri == uri) {
            return Err(SecurityError::UncoveredAttachment {
                content_id: attachment.content_id().to_owned(),
            });
        }
    }

    let signed_info = signed_info_xml(&signature.signature_algorithm, &signature.references)?;
    let decoded = BASE64
        .decode(&signature.signature_b64)
        .map_err(|_| SecurityError::SignatureVerificationFailed)?;
    let bytes: [u8; 64] = decoded
        .try_into()
        .map_err(|_| SecurityError::SignatureVerificationFailed)?;
    keystore.verify(&signature.key_alias, signed_info.as_bytes(), &bytes)?;
    debug!(alias = %signature.key_alias, "signature verified");
    Ok(())
}
