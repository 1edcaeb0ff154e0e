//! # Pipeline Ordering
//!
//! The only public way to apply security transforms. Outbound runs
//! sign-then-encrypt, inbound runs decrypt-then-verify; the order is
//! fixed here and not configurable, because reversing it breaks
//! interoperability with conforming stacks. A peer that deviated
//! (signed ciphertext) fails digest verification after decryption and
//! surfaces as a [`SecurityError`].
//!
//! Inbound exposes the two stages separately so the receive state
//! machine can attribute failures to its `Decrypted` and `Verified`
//! stages (decryption failures and authentication failures map to
//! different ebMS error codes).

use std::sync::Arc;

use tracing::debug;

use as4_attachment::Attachment;
use as4_model::{PartDigest, SoapEnvelope};
use as4_pmode::LegSecurity;

use crate::encrypt::{decrypt_message, encrypt_message};
use crate::errors::SecurityError;
use crate::header::SecurityHeader;
use crate::keystore::KeyStore;
use crate::sign::{sign_message, verify_message};

/// What the inbound transforms established about a message.
#[derive(Clone, Debug, Default)]
pub struct InboundSecurityReport {
    /// An encrypted-key block was present and decryption succeeded.
    pub decrypted: bool,
    /// A signature block was present and verified.
    pub verified: bool,
    /// Digests covered by the verified signature, for the
    /// non-repudiation receipt.
    pub digests: Vec<PartDigest>,
}

/// Applies and inverts the security transforms of a leg.
#[derive(Clone)]
pub struct SecurityPipeline {
    keystore: Arc<KeyStore>,
}

impl SecurityPipeline {
    /// Pipeline over the endpoint's key material.
    #[must_use]
    pub fn new(keystore: Arc<KeyStore>) -> Self {
        Self { keystore }
    }

    /// The underlying key store.
    #[must_use]
    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    /// Apply the leg's outbound transforms: sign first, then encrypt.
    ///
    /// # Errors
    ///
    /// - `MissingSignature` / `MissingEncryption` when the leg demands a
    ///   transform but carries no alias (normally caught by PMode
    ///   validation)
    /// - Any signing/encryption failure from the underlying transforms
    pub fn apply_outbound(
        &self,
        envelope: &mut SoapEnvelope,
        attachments: &mut [Attachment],
        security: &LegSecurity,
    ) -> Result<(), SecurityError> {
        let mut header = SecurityHeader::default();

        if security.sign {
            let alias = security
                .signing_key_alias
                .as_deref()
                .ok_or(SecurityError::MissingSignature)?;
            header.signature = Some(sign_message(
                &self.keystore,
                alias,
                security.signature_algorithm,
                security.digest_algorithm,
                envelope,
                attachments,
            )?);
        }

        if security.encrypt {
            let alias = security
                .encryption_key_alias
                .as_deref()
                .ok_or(SecurityError::MissingEncryption)?;
            header.encryption = Some(encrypt_message(
                &self.keystore,
                envelope,
                attachments,
                alias,
                security.encryption_algorithm,
            )?);
        }

        if !header.is_empty() {
            envelope.security = Some(header.to_xml()?);
        }
        debug!(
            signed = security.sign,
            encrypted = security.encrypt,
            "outbound security applied"
        );
        Ok(())
    }

    /// Inbound stage one: decrypt whatever the header declares encrypted.
    ///
    /// Returns whether decryption ran. Enforces the leg policy: a leg
    /// that requires encryption rejects plaintext messages.
    ///
    /// # Errors
    ///
    /// Decryption failures (`UnknownAlias`, `DecryptionFailed`,
    /// `UnknownReference`) and `MissingEncryption` policy violations.
    pub fn decrypt_inbound(
        &self,
        envelope: &mut SoapEnvelope,
        attachments: &mut [Attachment],
        security: &LegSecurity,
    ) -> Result<bool, SecurityError> {
        let header = Self::parse_header(envelope)?;
        match header.encryption {
            Some(encryption) => {
                decrypt_message(&self.keystore, &encryption, envelope, attachments)?;
                Ok(true)
            }
            None if security.encrypt => Err(SecurityError::MissingEncryption),
            None => Ok(false),
        }
    }

    /// Inbound stage two: verify the signature, after decryption.
    ///
    /// Returns the covered digests when a signature verified, `None`
    /// when the message was unsigned. Enforces the leg policy: a leg
    /// that requires signing rejects unsigned messages.
    ///
    /// # Errors
    ///
    /// Verification failures (`DigestMismatch`, `UncoveredAttachment`,
    /// `SignatureVerificationFailed`, `UnknownAlias`) and
    /// `MissingSignature` policy violations.
    pub fn verify_inbound(
        &self,
        envelope: &SoapEnvelope,
        attachments: &[Attachment],
        security: &LegSecurity,
    ) -> Result<Option<Vec<PartDigest>>, SecurityError> {
        let header = Self::parse_header(envelope)?;
        match header.signature {
            Some(signature) => {
                verify_message(&self.keystore, &signature, envelope, attachments)?;
                Ok(Some(signature.part_digests()))
            }
            None if security.sign => Err(SecurityError::MissingSignature),
            None => Ok(None),
        }
    }

    /// Both inbound stages in the fixed decrypt-then-verify order.
    ///
    /// # Errors
    ///
    /// See [`SecurityPipeline::decrypt_inbound`] and
    /// [`SecurityPipeline::verify_inbound`].
    pub fn apply_inbound(
        &self,
        envelope: &mut SoapEnvelope,
        attachments: &mut [Attachment],
        security: &LegSecurity,
    ) -> Result<InboundSecurityReport, SecurityError> {
        let decrypted = self.decrypt_inbound(envelope, attachments, security)?;
        let digests = self.verify_inbound(envelope, attachments, security)?;
        Ok(InboundSecurityReport {
            decrypted,
            verified: digests.is_some(),
            digests: digests.unwrap_or_default(),
        })
    }

    fn parse_header(envelope: &SoapEnvelope) -> Result<SecurityHeader, SecurityError> {
        envelope
            .security
            .as_deref()
            .map_or_else(|| Ok(SecurityHeader::default()), SecurityHeader::parse)
    }
}
