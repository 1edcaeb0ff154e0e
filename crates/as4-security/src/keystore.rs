//! # Key Store
//!
//! Alias-addressed key material: Ed25519 signing/verifying keys and
//! AES-256 key-encryption keys. The store is filled at configuration time
//! (from whatever keystore backend the host application uses) and read by
//! the pipeline; an alias that is not present is a [`SecurityError`],
//! which the receive path reports as an authentication/decryption error
//! signal rather than a crash.

use std::collections::HashMap;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

use crate::errors::SecurityError;

/// AES-256 key-encryption key (256-bit), zeroized on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct KeyEncryptionKey([u8; 32]);

impl KeyEncryptionKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Alias-addressed key material for one endpoint.
#[derive(Default)]
pub struct KeyStore {
    signing: HashMap<String, SigningKey>,
    verifying: HashMap<String, VerifyingKey>,
    key_encryption: HashMap<String, KeyEncryptionKey>,
}

impl KeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a signing keypair under the alias; the verifying half is
    /// registered under the same alias.
    pub fn generate_signing_key(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        self.verifying
            .insert(alias.clone(), signing_key.verifying_key());
        self.signing.insert(alias, signing_key);
    }

    /// Register a signing key from a 32-byte seed (deterministic).
    pub fn add_signing_seed(&mut self, alias: impl Into<String>, seed: [u8; 32]) {
        let alias = alias.into();
        let signing_key = SigningKey::from_bytes(&seed);
        self.verifying
            .insert(alias.clone(), signing_key.verifying_key());
        self.signing.insert(alias, signing_key);
    }

    /// Register a peer's verifying key.
    ///
    /// # Errors
    ///
    /// `SecurityError::InvalidKey` when the bytes are not a curve point.
    pub fn add_verifying_key(
        &mut self,
        alias: impl Into<String>,
        bytes: [u8; 32],
    ) -> Result<(), SecurityError> {
        let alias = alias.into();
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| SecurityError::InvalidKey {
            alias: alias.clone(),
        })?;
        self.verifying.insert(alias, key);
        Ok(())
    }

    /// The verifying key bytes for an alias, for exchange with a peer.
    #[must_use]
    pub fn verifying_key_bytes(&self, alias: &str) -> Option<[u8; 32]> {
        self.verifying.get(alias).map(|key| key.to_bytes())
    }

    /// Generate a key-encryption key under the alias.
    pub fn generate_key_encryption_key(&mut self, alias: impl Into<String>) {
        self.key_encryption
            .insert(alias.into(), KeyEncryptionKey::generate());
    }

    /// Register a pre-shared key-encryption key.
    pub fn add_key_encryption_key(&mut self, alias: impl Into<String>, key: KeyEncryptionKey) {
        self.key_encryption.insert(alias.into(), key);
    }

    /// The key-encryption key for an alias.
    ///
    /// # Errors
    ///
    /// `SecurityError::UnknownAlias` when nothing is registered.
    pub fn key_encryption_key(&self, alias: &str) -> Result<&KeyEncryptionKey, SecurityError> {
        self.key_encryption
            .get(alias)
            .ok_or_else(|| SecurityError::UnknownAlias {
                alias: alias.to_owned(),
            })
    }

    /// Sign a message with the alias's signing key.
    ///
    /// # Errors
    ///
    /// `SecurityError::UnknownAlias` when nothing is registered.
    pub fn sign(&self, alias: &str, message: &[u8]) -> Result<[u8; 64], SecurityError> {
        let key = self
            .signing
            .get(alias)
            .ok_or_else(|| SecurityError::UnknownAlias {
                alias: alias.to_owned(),
            })?;
        Ok(key.sign(message).to_bytes())
    }

    /// Verify a signature with the alias's verifying key.
    ///
    /// # Errors
    ///
    /// - `SecurityError::UnknownAlias` when nothing is registered
    /// - `SecurityError::SignatureVerificationFailed` on mismatch
    pub fn verify(
        &self,
        alias: &str,
        message: &[u8],
        signature: &[u8; 64],
    ) -> Result<(), SecurityError> {
        let key = self
            .verifying
            .get(alias)
            .ok_or_else(|| SecurityError::UnknownAlias {
                alias: alias.to_owned(),
            })?;
        key.verify(message, &Signature::from_bytes(signature))
            .map_err(|_| SecurityError::SignatureVerificationFailed)
    }
}
