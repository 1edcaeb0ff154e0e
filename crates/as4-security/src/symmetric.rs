//! # Symmetric Encryption
//!
//! AES-256-GCM content encryption. Nonces are 96-bit random values
//! carried beside each encrypted part; keys are 256-bit.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::errors::SecurityError;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Generate a random 256-bit content-encryption key.
#[must_use]
pub fn generate_key() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    bytes
}

/// Encrypt with a fresh random nonce.
///
/// Returns `(ciphertext, nonce)`.
///
/// # Errors
///
/// `SecurityError::EncryptionFailed` when the AEAD rejects the input.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN]), SecurityError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| SecurityError::EncryptionFailed(e.to_string()))?;
    Ok((ciphertext, nonce))
}

/// Decrypt and authenticate.
///
/// # Errors
///
/// `SecurityError::DecryptionFailed` on wrong key, wrong nonce or
/// tampered ciphertext.
pub fn decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SecurityError> {
    if nonce.len() != NONCE_LEN {
        return Err(SecurityError::DecryptionFailed(format!(
            "nonce length {} (expected {NONCE_LEN})",
            nonce.len()
        )));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| SecurityError::DecryptionFailed(e.to_string()))
}
