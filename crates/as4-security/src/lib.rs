//! # Security Pipeline
//!
//! Two composable transforms over an assembled message, applied in an
//! order that is fixed by construction and deliberately not configurable:
//!
//! 1. **Sign**: digests over the SOAP body and every attachment part,
//!    signature over the signed-info block, embedded as a security header.
//!    Signing never mutates attachment bytes.
//! 2. **Encrypt**: AES-256-GCM over body and attachment content under a
//!    fresh per-message content-encryption key, wrapped for the recipient
//!    key alias.
//!
//! Outbound is always sign-then-encrypt; inbound is always
//! decrypt-then-verify. A peer that signed ciphertext (the reversed
//! order) fails digest verification after decryption and is rejected
//! with a [`SecurityError`]; there is no best-effort recovery.

pub mod encrypt;
pub mod errors;
pub mod header;
pub mod keystore;
pub mod pipeline;
pub mod sign;
pub mod symmetric;

pub use errors::SecurityError;
pub use header::{DigestReference, EncryptedDataRef, EncryptionInfo, SecurityHeader, SignatureInfo};
pub use keystore::KeyStore;
pub use pipeline::{InboundSecurityReport, SecurityPipeline};
