//! # Content Encryption
//!
//! AES-256-GCM over the SOAP body and attachment content under a fresh
//! per-message content-encryption key (CEK). The CEK is wrapped with the
//! recipient alias's key-encryption key and carried in the security
//! header together with one data reference (nonce + original content
//! type) per encrypted part. Encrypted attachment parts travel as
//! `application/octet-stream`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;
use zeroize::Zeroize;

use as4_attachment::{Attachment, PayloadSource};
use as4_model::{strip_cid, SoapEnvelope, PREFIX_CID};
use as4_pmode::EncryptionAlgorithm;

use crate::errors::SecurityError;
use crate::header::{EncryptedDataRef, EncryptionInfo};
use crate::keystore::KeyStore;
use crate::sign::BODY_REFERENCE;
use crate::symmetric;

/// MIME type of encrypted attachment parts on the wire.
pub const ENCRYPTED_PART_MIME_TYPE: &str = "application/octet-stream";

const ENCRYPTED_BODY_OPEN: &str = "<xenc:EncryptedData>";
const ENCRYPTED_BODY_CLOSE: &str = "</xenc:EncryptedData>";

/// Encrypt body and attachments in place.
///
/// # Errors
///
/// - `UnknownAlias` when no key-encryption key is registered
/// - `EncryptionFailed` / `Io` on transform failures
pub fn encrypt_message(
    keystore: &KeyStore,
    envelope: &mut SoapEnvelope,
    attachments: &mut [Attachment],
    alias: &str,
    algorithm: EncryptionAlgorithm,
) -> Result<EncryptionInfo, SecurityError> {
    let kek = keystore.key_encryption_key(alias)?;
    let mut cek = symmetric::generate_key();
    let mut data_refs = Vec::with_capacity(attachments.len() + 1);

    if let Some(body) = envelope.body.take() {
        let (ciphertext, nonce) = symmetric::encrypt(&cek, body.as_bytes())?;
        envelope.body = Some(format!(
            "{ENCRYPTED_BODY_OPEN}{}{ENCRYPTED_BODY_CLOSE}",
            BASE64.encode(ciphertext)
        ));
        data_refs.push(EncryptedDataRef {
            uri: BODY_REFERENCE.to_owned(),
            nonce_b64: BASE64.encode(nonce),
            content_type: None,
        });
    }

    for attachment in attachments.iter_mut() {
        let content = attachment.content().map_err(|e| SecurityError::Io {
            reference: attachment.content_id().to_owned(),
            detail: e.to_string(),
        })?;
        let (ciphertext, nonce) = symmetric::encrypt(&cek, &content)?;
        data_refs.push(EncryptedDataRef {
            uri: format!("{PREFIX_CID}{}", attachment.content_id()),
            nonce_b64: BASE64.encode(nonce),
            content_type: Some(attachment.mime_type().to_owned()),
        });
        attachment.replace_content(
            PayloadSource::Bytes(ciphertext.into()),
            ENCRYPTED_PART_MIME_TYPE,
        );
    }

    // Wrap the CEK under the recipient's key-encryption key.
    let (wrapped, wrap_nonce) = symmetric::encrypt(kek.as_bytes(), &cek)?;
    cek.zeroize();
    let mut key_blob = wrap_nonce.to_vec();
    key_blob.extend_from_slice(&wrapped);
    debug!(alias, parts = data_refs.len(), "encrypted message");

    Ok(EncryptionInfo {
        key_alias: alias.to_owned(),
        algorithm: algorithm.uri().to_owned(),
        encrypted_key_b64: BASE64.encode(key_blob),
        data_refs,
    })
}

/// Invert [`encrypt_message`] from a parsed encrypted-key block.
///
/// # Errors
///
/// - `UnknownAlias` when the referenced key-encryption key is absent
/// - `DecryptionFailed` on wrong key material or tampered ciphertext
/// - `UnknownReference` when a data reference targets a missing part
pub fn decrypt_message(
    keystore: &KeyStore,
    encryption: &EncryptionInfo,
    envelope: &mut SoapEnvelope,
    attachments: &mut [Attachment],
) -> Result<(), SecurityError> {
    let kek = keystore.key_encryption_key(&encryption.key_alias)?;

    let key_blob = BASE64
        .decode(&encryption.encrypted_key_b64)
        .map_err(|e| SecurityError::DecryptionFailed(format!("encrypted key: {e}")))?;
    if key_blob.len() <= symmetric::NONCE_LEN {
        return Err(SecurityError::DecryptionFailed(
            "encrypted key too short".to_owned(),
        ));
    }
    let (wrap_nonce, wrapped) = key_blob.split_at(symmetric::NONCE_LEN);
    let mut cek_vec = symmetric::decrypt(kek.as_bytes(), wrap_nonce, wrapped)?;
    let cek: [u8; 32] = cek_vec.as_slice().try_into().map_err(|_| {
        SecurityError::DecryptionFailed("content key has wrong length".to_owned())
    })?;
    cek_vec.zeroize();

    for data_ref in &encryption.data_refs {
        let nonce = BASE64
            .decode(&data_ref.nonce_b64)
            .map_err(|e| SecurityError::DecryptionFailed(format!("nonce: {e}")))?;

        if data_ref.uri == BODY_REFERENCE {
            let body = envelope
                .body
                .take()
                .ok_or_else(|| SecurityError::UnknownReference {
                    uri: data_ref.uri.clone(),
                })?;
            let inner = body
                .strip_prefix(ENCRYPTED_BODY_OPEN)
                .and_then(|rest| rest.strip_suffix(ENCRYPTED_BODY_CLOSE))
                .ok_or_else(|| {
                    SecurityError::DecryptionFailed("unexpected encrypted body form".to_owned())
                })?;
            let ciphertext = BASE64
                .decode(inner.trim())
                .map_err(|e| SecurityError::DecryptionFailed(format!("body: {e}")))?;
            let plaintext = symmetric::decrypt(&cek, &nonce, &ciphertext)?;
            envelope.body = Some(String::from_utf8(plaintext).map_err(|e| {
                SecurityError::DecryptionFailed(format!("body is not UTF-8: {e}"))
            })?);
        } else {
            let content_id =
                strip_cid(&data_ref.uri).ok_or_else(|| SecurityError::UnknownReference {
                    uri: data_ref.uri.clone(),
                })?;
            let attachment = attachments
                .iter_mut()
                .find(|a| a.content_id() == content_id)
                .ok_or_else(|| SecurityError::UnknownReference {
                    uri: data_ref.uri.clone(),
                })?;
            let ciphertext = attachment.content().map_err(|e| SecurityError::Io {
                reference: data_ref.uri.clone(),
                detail: e.to_string(),
            })?;
            let plaintext = symmetric::decrypt(&cek, &nonce, &ciphertext)?;
            let restored_type = data_ref
                .content_type
                .clone()
                .unwrap_or_else(|| ENCRYPTED_PART_MIME_TYPE.to_owned());
            attachment.replace_content(PayloadSource::Bytes(plaintext.into()), restored_type);
        }
    }

    let mut cek = cek;
    cek.zeroize();
    debug!(alias = %encryption.key_alias, parts = encryption.data_refs.len(), "decrypted message");
    Ok(())
}
