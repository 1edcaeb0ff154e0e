//! # Security Header Codec
//!
//! The `wsse:Security` header carried in the SOAP header: a signature
//! block (signed-info with digest references, signature value, key name)
//! and/or an encrypted-key block (wrapped content-encryption key plus one
//! data reference per encrypted part).
//!
//! The signed-info block has exactly one serialization, produced by
//! [`signed_info_xml`]; signer and verifier both use it, so the signature
//! input is reproducible from the parsed header alone.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use as4_model::PartDigest;

use crate::errors::SecurityError;

/// WS-Security extension namespace.
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// XML digital signature namespace.
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML encryption namespace.
pub const XENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Digest of one covered part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestReference {
    /// `#body` or a `cid:` href.
    pub uri: String,
    /// Digest algorithm URI.
    pub algorithm: String,
    /// Base64 digest value.
    pub digest_b64: String,
}

/// Parsed or assembled signature block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureInfo {
    /// Alias of the signing key (KeyName).
    pub key_alias: String,
    /// Signature algorithm URI.
    pub signature_algorithm: String,
    /// Digest references, body first then attachments in part order.
    pub references: Vec<DigestReference>,
    /// Base64 signature over the signed-info block.
    pub signature_b64: String,
}

impl SignatureInfo {
    /// Convert the covered digests into receipt non-repudiation entries.
    #[must_use]
    pub fn part_digests(&self) -> Vec<PartDigest> {
        self.references
            .iter()
            .map(|reference| PartDigest {
                reference: reference.uri.clone(),
                algorithm: reference.algorithm.clone(),
                digest_b64: reference.digest_b64.clone(),
            })
            .collect()
    }
}

/// One encrypted part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedDataRef {
    /// `#body` or a `cid:` href.
    pub uri: String,
    /// Base64 AEAD nonce for this part.
    pub nonce_b64: String,
    /// Wire MIME type the part had before encryption.
    pub content_type: Option<String>,
}

/// Parsed or assembled encrypted-key block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// Alias of the recipient's key-encryption key (KeyName).
    pub key_alias: String,
    /// Content-encryption algorithm URI.
    pub algorithm: String,
    /// Base64 `nonce || ciphertext` of the wrapped content key.
    pub encrypted_key_b64: String,
    /// One entry per encrypted part.
    pub data_refs: Vec<EncryptedDataRef>,
}

/// The full security header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityHeader {
    /// Signature block, when the message is signed.
    pub signature: Option<SignatureInfo>,
    /// Encrypted-key block, when the message is encrypted.
    pub encryption: Option<EncryptionInfo>,
}

impl SecurityHeader {
    /// True when neither transform is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signature.is_none() && self.encryption.is_none()
    }

    /// Serialize to the raw header XML embedded in the SOAP header.
    ///
    /// # Errors
    ///
    /// `SecurityError::MalformedHeader` on writer failures.
    pub fn to_xml(&self) -> Result<String, SecurityError> {
        let mut writer = Writer::new(Vec::new());

        let mut root = BytesStart::new("wsse:Security");
        root.push_attribute(("xmlns:wsse", WSSE_NS));
        root.push_attribute(("xmlns:ds", DS_NS));
        root.push_attribute(("xmlns:xenc", XENC_NS));
        writer.write_event(Event::Start(root)).map_err(wr)?;

        if let Some(signature) = &self.signature {
            writer
                .write_event(Event::Start(BytesStart::new("ds:Signature")))
                .map_err(wr)?;
            let signed_info =
                signed_info_xml(&signature.signature_algorithm, &signature.references)?;
            writer
                .write_event(Event::Text(BytesText::from_escaped(signed_info.as_str())))
                .map_err(wr)?;
            text_element(&mut writer, "ds:SignatureValue", &signature.signature_b64)?;
            writer
                .write_event(Event::Start(BytesStart::new("ds:KeyInfo")))
                .map_err(wr)?;
            text_element(&mut writer, "wsse:KeyName", &signature.key_alias)?;
            writer
                .write_event(Event::End(BytesEnd::new("ds:KeyInfo")))
                .map_err(wr)?;
            writer
                .write_event(Event::End(BytesEnd::new("ds:Signature")))
                .map_err(wr)?;
        }

        if let Some(encryption) = &self.encryption {
            writer
                .write_event(Event::Start(BytesStart::new("xenc:EncryptedKey")))
                .map_err(wr)?;
            let mut method = BytesStart::new("xenc:EncryptionMethod");
            method.push_attribute(("Algorithm", encryption.algorithm.as_str()));
            writer.write_event(Event::Empty(method)).map_err(wr)?;
            writer
                .write_event(Event::Start(BytesStart::new("ds:KeyInfo")))
                .map_err(wr)?;
            text_element(&mut writer, "wsse:KeyName", &encryption.key_alias)?;
            writer
                .write_event(Event::End(BytesEnd::new("ds:KeyInfo")))
                .map_err(wr)?;
            text_element(&mut writer, "xenc:CipherValue", &encryption.encrypted_key_b64)?;
            writer
                .write_event(Event::Start(BytesStart::new("xenc:ReferenceList")))
                .map_err(wr)?;
            for data_ref in &encryption.data_refs {
                let mut element = BytesStart::new("xenc:DataReference");
                element.push_attribute(("URI", data_ref.uri.as_str()));
                element.push_attribute(("Nonce", data_ref.nonce_b64.as_str()));
                if let Some(content_type) = &data_ref.content_type {
                    element.push_attribute(("ContentType", content_type.as_str()));
                }
                writer.write_event(Event::Empty(element)).map_err(wr)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("xenc:ReferenceList")))
                .map_err(wr)?;
            writer
                .write_event(Event::End(BytesEnd::new("xenc:EncryptedKey")))
                .map_err(wr)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("wsse:Security")))
            .map_err(wr)?;

        String::from_utf8(writer.into_inner()).map_err(|e| SecurityError::MalformedHeader(e.to_string()))
    }

    /// Parse the raw header XML captured from an inbound envelope.
    ///
    /// # Errors
    ///
    /// `SecurityError::MalformedHeader` on structural problems.
    pub fn parse(raw: &str) -> Result<Self, SecurityError> {
        let mut reader = Reader::from_str(raw);
        reader.config_mut().trim_text(true);

        #[derive(PartialEq)]
        enum Section {
            None,
            Signature,
            EncryptedKey,
        }

        let mut section = Section::None;
        let mut signature: Option<SignatureInfo> = None;
        let mut encryption: Option<EncryptionInfo> = None;

        // Signature accumulator
        let mut sig_alias = String::new();
        let mut sig_algorithm = String::new();
        let mut sig_value = String::new();
        let mut references: Vec<DigestReference> = Vec::new();
        let mut current_ref: Option<DigestReference> = None;

        // Encryption accumulator
        let mut enc_alias = String::new();
        let mut enc_algorithm = String::new();
        let mut enc_key = String::new();
        let mut data_refs: Vec<EncryptedDataRef> = Vec::new();

        loop {
            match reader.read_event().map_err(rd)? {
                Event::Start(e) => match local(&e).as_str() {
                    "Signature" => section = Section::Signature,
                    "EncryptedKey" => section = Section::EncryptedKey,
                    "Reference" if section == Section::Signature => {
                        current_ref = Some(DigestReference {
                            uri: required_attr(&e, "URI")?,
                            algorithm: String::new(),
                            digest_b64: String::new(),
                        });
                    }
                    "DigestValue" => {
                        let value = leaf_text(&mut reader, "DigestValue")?;
                        if let Some(reference) = current_ref.as_mut() {
                            reference.digest_b64 = value;
                        }
                    }
                    "SignatureValue" => sig_value = leaf_text(&mut reader, "SignatureValue")?,
                    "KeyName" => {
                        let value = leaf_text(&mut reader, "KeyName")?;
                        match section {
                            Section::Signature => sig_alias = value,
                            Section::EncryptedKey => enc_alias = value,
                            Section::None => {}
                        }
                    }
                    "CipherValue" => enc_key = leaf_text(&mut reader, "CipherValue")?,
                    _ => {}
                },
                Event::Empty(e) => match local(&e).as_str() {
                    "SignatureMethod" => sig_algorithm = required_attr(&e, "Algorithm")?,
                    "EncryptionMethod" => enc_algorithm = required_attr(&e, "Algorithm")?,
                    "DigestMethod" => {
                        if let Some(reference) = current_ref.as_mut() {
                            reference.algorithm = required_attr(&e, "Algorithm")?;
                        }
                    }
                    "DataReference" if section == Section::EncryptedKey => {
                        data_refs.push(EncryptedDataRef {
                            uri: required_attr(&e, "URI")?,
                            nonce_b64: required_attr(&e, "Nonce")?,
                            content_type: optional_attr(&e, "ContentType")?,
                        });
                    }
                    _ => {}
                },
                Event::End(e) => match String::from_utf8_lossy(e.local_name().as_ref()).as_ref() {
                    "Reference" => {
                        if let Some(reference) = current_ref.take() {
                            references.push(reference);
                        }
                    }
                    "Signature" => {
                        if sig_value.is_empty() || sig_alias.is_empty() {
                            return Err(SecurityError::MalformedHeader(
                                "signature block missing value or key name".to_owned(),
                            ));
                        }
                        signature = Some(SignatureInfo {
                            key_alias: std::mem::take(&mut sig_alias),
                            signature_algorithm: std::mem::take(&mut sig_algorithm),
                            references: std::mem::take(&mut references),
                            signature_b64: std::mem::take(&mut sig_value),
                        });
                        section = Section::None;
                    }
                    "EncryptedKey" => {
                        if enc_key.is_empty() || enc_alias.is_empty() {
                            return Err(SecurityError::MalformedHeader(
                                "encrypted-key block missing cipher value or key name".to_owned(),
                            ));
                        }
                        encryption = Some(EncryptionInfo {
                            key_alias: std::mem::take(&mut enc_alias),
                            algorithm: std::mem::take(&mut enc_algorithm),
                            encrypted_key_b64: std::mem::take(&mut enc_key),
                            data_refs: std::mem::take(&mut data_refs),
                        });
                        section = Section::None;
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self {
            signature,
            encryption,
        })
    }
}

/// The canonical signed-info serialization. This is the exact byte input
/// of the signature.
pub fn signed_info_xml(
    algorithm: &str,
    references: &[DigestReference],
) -> Result<String, SecurityError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new("ds:SignedInfo")))
        .map_err(wr)?;
    let mut method = BytesStart::new("ds:SignatureMethod");
    method.push_attribute(("Algorithm", algorithm));
    writer.write_event(Event::Empty(method)).map_err(wr)?;
    for reference in references {
        let mut element = BytesStart::new("ds:Reference");
        element.push_attribute(("URI", reference.uri.as_str()));
        writer.write_event(Event::Start(element)).map_err(wr)?;
        let mut digest_method = BytesStart::new("ds:DigestMethod");
        digest_method.push_attribute(("Algorithm", reference.algorithm.as_str()));
        writer.write_event(Event::Empty(digest_method)).map_err(wr)?;
        text_element(&mut writer, "ds:DigestValue", &reference.digest_b64)?;
        writer
            .write_event(Event::End(BytesEnd::new("ds:Reference")))
            .map_err(wr)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("ds:SignedInfo")))
        .map_err(wr)?;
    String::from_utf8(writer.into_inner()).map_err(|e| SecurityError::MalformedHeader(e.to_string()))
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), SecurityError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(wr)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(wr)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(wr)
}

fn leaf_text(reader: &mut Reader<&[u8]>, end: &str) -> Result<String, SecurityError> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(rd)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(rd)?),
            Event::End(e) if String::from_utf8_lossy(e.local_name().as_ref()) == end => break,
            Event::Eof => {
                return Err(SecurityError::MalformedHeader(
                    "unexpected end of security header".to_owned(),
                ))
            }
            _ => {}
        }
    }
    Ok(text.trim().to_owned())
}

fn local(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn required_attr(e: &BytesStart<'_>, name: &str) -> Result<String, SecurityError> {
    optional_attr(e, name)?.ok_or_else(|| {
        SecurityError::MalformedHeader(format!("missing attribute {name} on {}", local(e)))
    })
}

fn optional_attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, SecurityError> {
    e.try_get_attribute(name)
        .map_err(rd)?
        .map(|a| a.unescape_value().map(|v| v.into_owned()))
        .transpose()
        .map_err(rd)
}

fn wr<E: std::fmt::Display>(err: E) -> SecurityError {
    SecurityError::MalformedHeader(err.to_string())
}

fn rd<E: std::fmt::Display>(err: E) -> SecurityError {
    SecurityError::MalformedHeader(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> SecurityHeader {
        SecurityHeader {
            signature: Some(SignatureInfo {
                key_alias: "sender-sig".to_owned(),
                signature_algorithm: "http://www.w3.org/2021/04/xmldsig-more#eddsa-ed25519"
                    .to_owned(),
                references: vec![
                    DigestReference {
                        uri: "#body".to_owned(),
                        algorithm: "http://www.w3.org/2001/04/xmlenc#sha256".to_owned(),
                        digest_b64: "Zm9v".to_owned(),
                    },
                    DigestReference {
                        uri: "cid:part1@x".to_owned(),
                        algorithm: "http://www.w3.org/2001/04/xmlenc#sha256".to_owned(),
                        digest_b64: "YmFy".to_owned(),
                    },
                ],
                signature_b64: "c2ln".to_owned(),
            }),
            encryption: Some(EncryptionInfo {
                key_alias: "receiver-enc".to_owned(),
                algorithm: "http://www.w3.org/2009/xmlenc11#aes256-gcm".to_owned(),
                encrypted_key_b64: "a2V5".to_owned(),
                data_refs: vec![EncryptedDataRef {
                    uri: "cid:part1@x".to_owned(),
                    nonce_b64: "bm9uY2U=".to_owned(),
                    content_type: Some("image/jpeg".to_owned()),
                }],
            }),
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let xml = header.to_xml().unwrap();
        let parsed = SecurityHeader::parse(&xml).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_signature_only_roundtrip() {
        let mut header = sample_header();
        header.encryption = None;
        let parsed = SecurityHeader::parse(&header.to_xml().unwrap()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_encryption_only_roundtrip() {
        let mut header = sample_header();
        header.signature = None;
        let parsed = SecurityHeader::parse(&header.to_xml().unwrap()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_signed_info_is_deterministic() {
        let header = sample_header();
        let signature = header.signature.unwrap();
        let a = signed_info_xml(&signature.signature_algorithm, &signature.references).unwrap();
        let b = signed_info_xml(&signature.signature_algorithm, &signature.references).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("<ds:SignedInfo>"));
    }

    #[test]
    fn test_signature_without_value_rejected() {
        let xml = r#"<wsse:Security xmlns:wsse="x" xmlns:ds="y"><ds:Signature><ds:SignedInfo/></ds:Signature></wsse:Security>"#;
        assert!(matches!(
            SecurityHeader::parse(xml),
            Err(SecurityError::MalformedHeader(_))
        ));
    }
}
