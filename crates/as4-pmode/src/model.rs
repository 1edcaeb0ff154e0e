//! # PMode Entities
//!
//! The typed agreement between two parties. Everything here is plain data
//! with serde derives so an external store (file, database) can persist
//! agreements; the engine itself only ever consumes resolved values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use as4_model::{CompressionMode, SoapVersion};

use crate::errors::ConfigError;

/// Message exchange pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mep {
    /// One business message, one direction.
    #[default]
    OneWay,
    /// Request and reply, two legs in opposite directions.
    TwoWay,
}

impl Mep {
    /// Number of legs this pattern requires.
    #[must_use]
    pub fn required_legs(self) -> usize {
        match self {
            Mep::OneWay => 1,
            Mep::TwoWay => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Mep::OneWay => "one-way",
            Mep::TwoWay => "two-way",
        }
    }
}

/// Transport binding of the exchange pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MepBinding {
    /// Sender initiates the HTTP request carrying the User Message.
    #[default]
    Push,
    /// Receiver polls with a PullRequest signal.
    Pull,
}

impl MepBinding {
    /// Binding name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MepBinding::Push => "push",
            MepBinding::Pull => "pull",
        }
    }
}

/// Digest algorithm of a signing leg.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Algorithm identifier embedded in digest references.
    #[must_use]
    pub fn uri(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            DigestAlgorithm::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            DigestAlgorithm::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Resolve an algorithm from its identifier.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.uri() == uri)
    }
}

/// Signature algorithm of a signing leg.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519 over the signed-info block.
    #[default]
    Ed25519,
}

impl SignatureAlgorithm {
    /// Algorithm identifier embedded in the security header.
    #[must_use]
    pub fn uri(self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "http://www.w3.org/2021/04/xmldsig-more#eddsa-ed25519",
        }
    }
}

/// Content encryption algorithm of an encrypting leg.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// AES-256 in Galois/Counter mode.
    #[default]
    Aes256Gcm,
}

impl EncryptionAlgorithm {
    /// Algorithm identifier embedded in the security header.
    #[must_use]
    pub fn uri(self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }
}

/// Security requirements of one leg.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegSecurity {
    /// Whether the leg must be signed.
    pub sign: bool,
    /// Key alias used for signing (sender) and verification (receiver).
    pub signing_key_alias: Option<String>,
    /// Signature algorithm.
    pub signature_algorithm: SignatureAlgorithm,
    /// Digest algorithm for body and attachment references.
    pub digest_algorithm: DigestAlgorithm,
    /// Whether the leg must be encrypted.
    pub encrypt: bool,
    /// Key alias of the recipient's key-encryption key.
    pub encryption_key_alias: Option<String>,
    /// Content encryption algorithm.
    pub encryption_algorithm: EncryptionAlgorithm,
}

/// One direction of the exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    /// SOAP version used on this leg.
    pub soap_version: SoapVersion,
    /// Security requirements.
    pub security: LegSecurity,
    /// `true` when the response signal travels on the HTTP response of the
    /// same exchange; `false` for asynchronous signals.
    pub sync_response: bool,
}

/// Party identity in an agreement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyConfig {
    /// Party id value.
    pub id: String,
    /// Role URI.
    pub role: String,
}

/// Reliability settings of an agreement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reliability {
    /// Number of resends after the first attempt.
    pub retry_count: u32,
    /// Wait between attempts.
    pub retry_interval: Duration,
    /// Whether the receiver runs duplicate elimination for this agreement.
    pub duplicate_detection: bool,
}

impl Default for Reliability {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_interval: Duration::from_secs(10),
            duplicate_detection: true,
        }
    }
}

/// A negotiated processing mode.
///
/// Immutable once resolved: the resolver hands out clones and nothing in
/// the engine mutates them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PMode {
    /// Unique agreement id.
    pub id: String,
    /// Exchange pattern.
    pub mep: Mep,
    /// Transport binding.
    pub mep_binding: MepBinding,
    /// Initiating party.
    pub initiator: PartyConfig,
    /// Responding party.
    pub responder: PartyConfig,
    /// Optional agreement reference copied into the message header.
    pub agreement_ref: Option<String>,
    /// Endpoint URL of the responder, used by the send engine.
    pub responder_address: Option<String>,
    /// Service this agreement covers; `None` matches any.
    pub service: Option<String>,
    /// Action this agreement covers; `None` matches any.
    pub action: Option<String>,
    /// Leg configurations (one per direction).
    pub legs: Vec<Leg>,
    /// Default compression applied to outgoing attachments.
    pub default_compression: CompressionMode,
    /// Reliability settings.
    pub reliability: Reliability,
}

impl PMode {
    /// Validate internal consistency.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`] for the possible rejections; all of them fire
    /// before any network I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }
        if self.legs.is_empty() {
            return Err(ConfigError::NoLegs(self.id.clone()));
        }
        let expected = self.mep.required_legs();
        if self.legs.len() != expected {
            return Err(ConfigError::LegCountMismatch {
                pmode: self.id.clone(),
                mep: self.mep.name(),
                expected,
                actual: self.legs.len(),
            });
        }
        for (index, leg) in self.legs.iter().enumerate() {
            if leg.security.sign && leg.security.signing_key_alias.is_none() {
                return Err(ConfigError::MissingSigningAlias {
                    pmode: self.id.clone(),
                    leg: index,
                });
            }
            if leg.security.encrypt && leg.security.encryption_key_alias.is_none() {
                return Err(ConfigError::MissingEncryptionAlias {
                    pmode: self.id.clone(),
                    leg: index,
                });
            }
        }
        if self.reliability.retry_count > 0 && self.reliability.retry_interval.is_zero() {
            return Err(ConfigError::DegenerateRetry {
                pmode: self.id.clone(),
                retries: self.reliability.retry_count,
            });
        }
        Ok(())
    }

    /// The leg carrying the initial User Message.
    #[must_use]
    pub fn request_leg(&self) -> &Leg {
        &self.legs[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn one_way(id: &str) -> PMode {
        PMode {
            id: id.to_owned(),
            mep: Mep::OneWay,
            mep_binding: MepBinding::Push,
            initiator: PartyConfig {
                id: "sender".to_owned(),
                role: "initiator".to_owned(),
            },
            responder: PartyConfig {
                id: "receiver".to_owned(),
                role: "responder".to_owned(),
            },
            agreement_ref: None,
            responder_address: Some("http://localhost:8080/as4".to_owned()),
            service: None,
            action: None,
            legs: vec![Leg::default()],
            default_compression: CompressionMode::None,
            reliability: Reliability::default(),
        }
    }

    #[test]
    fn test_valid_one_way() {
        assert!(one_way("pm-1").validate().is_ok());
    }

    #[test]
    fn test_no_legs_rejected() {
        let mut pmode = one_way("pm-1");
        pmode.legs.clear();
        assert_eq!(pmode.validate(), Err(ConfigError::NoLegs("pm-1".to_owned())));
    }

    #[test]
    fn test_two_way_needs_two_legs() {
        let mut pmode = one_way("pm-2");
        pmode.mep = Mep::TwoWay;
        assert!(matches!(
            pmode.validate(),
            Err(ConfigError::LegCountMismatch { expected: 2, actual: 1, .. })
        ));
        pmode.legs.push(Leg::default());
        assert!(pmode.validate().is_ok());
    }

    #[test]
    fn test_signing_without_alias_rejected() {
        let mut pmode = one_way("pm-3");
        pmode.legs[0].security.sign = true;
        assert!(matches!(
            pmode.validate(),
            Err(ConfigError::MissingSigningAlias { leg: 0, .. })
        ));
        pmode.legs[0].security.signing_key_alias = Some("sig-key".to_owned());
        assert!(pmode.validate().is_ok());
    }

    #[test]
    fn test_encryption_without_alias_rejected() {
        let mut pmode = one_way("pm-4");
        pmode.legs[0].security.encrypt = true;
        assert!(matches!(
            pmode.validate(),
            Err(ConfigError::MissingEncryptionAlias { leg: 0, .. })
        ));
    }

    #[test]
    fn test_degenerate_retry_rejected() {
        let mut pmode = one_way("pm-5");
        pmode.reliability.retry_interval = Duration::ZERO;
        assert!(matches!(
            pmode.validate(),
            Err(ConfigError::DegenerateRetry { retries: 3, .. })
        ));
        pmode.reliability.retry_count = 0;
        assert!(pmode.validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let pmode = one_way("pm-6");
        let json = serde_json::to_string(&pmode).unwrap();
        let restored: PMode = serde_json::from_str(&json).unwrap();
        assert_eq!(pmode, restored);
    }
}
