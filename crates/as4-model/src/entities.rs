//! # Core Domain Entities
//!
//! The ebMS3 User Message and its constituent parts.
//!
//! ## Entities
//!
//! - [`UserMessage`]: a business-document-carrying message
//! - [`Party`]: sender or receiver identity (id, optional id type, role)
//! - [`CollaborationInfo`]: service, action, conversation, agreement
//! - [`PartInfo`]: reference from the header to one payload part
//! - [`MessageProperty`] / [`PartProperty`]: name/value metadata pairs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::MalformedMessage;
use crate::ids::{MessageId, PREFIX_CID};

/// Default role assigned to a party when the agreement does not name one.
pub const DEFAULT_PARTY_ROLE: &str =
    "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/defaultRole";

/// Reserved part-property name carrying the original (pre-compression)
/// MIME type of an attachment.
pub const PROP_MIME_TYPE: &str = "MimeType";

/// Reserved part-property name carrying the compression MIME type of an
/// attachment (`application/gzip` when compressed).
pub const PROP_COMPRESSION_TYPE: &str = "CompressionType";

/// Reserved part-property name carrying the character set of a textual
/// attachment.
pub const PROP_CHARACTER_SET: &str = "CharacterSet";

/// One side of the exchange: party identifier plus role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Party identifier value (e.g. a Peppol participant id).
    pub id: String,
    /// Optional identifier scheme/type attribute.
    pub id_type: Option<String>,
    /// Role URI of the party in this exchange.
    pub role: String,
}

impl Party {
    /// Create a party with the default ebMS role.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            id_type: None,
            role: DEFAULT_PARTY_ROLE.to_owned(),
        }
    }

    /// Create a party with an explicit role URI.
    pub fn with_role(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            id_type: None,
            role: role.into(),
        }
    }
}

/// Collaboration context of a User Message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationInfo {
    /// Optional reference to the partner agreement.
    pub agreement_ref: Option<String>,
    /// Service value.
    pub service: String,
    /// Optional service type attribute.
    pub service_type: Option<String>,
    /// Action within the service.
    pub action: String,
}

/// A name/value message property, optionally typed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageProperty {
    /// Property name.
    pub name: String,
    /// Optional type attribute.
    pub prop_type: Option<String>,
    /// Property value.
    pub value: String,
}

impl MessageProperty {
    /// Create an untyped property.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prop_type: None,
            value: value.into(),
        }
    }
}

/// A part-scoped property (same shape as a message property).
pub type PartProperty = MessageProperty;

/// Header reference to one payload part, addressed by `cid:` href.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    /// The `cid:`-prefixed href of the MIME part.
    pub href: String,
    /// Part-scoped properties (MimeType, CompressionType, ...).
    pub properties: Vec<PartProperty>,
}

impl PartInfo {
    /// Create a part reference for a raw content id (the `cid:` prefix is
    /// added here).
    pub fn for_content_id(content_id: &str) -> Self {
        Self {
            href: format!("{PREFIX_CID}{content_id}"),
            properties: Vec::new(),
        }
    }

    /// Look up a part property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Construction input for [`UserMessage::build`].
///
/// Optional fields are filled with generated values: absent message ids are
/// generated once, absent conversation ids get a fresh UUID, absent
/// timestamps use the current instant.
#[derive(Clone, Debug, Default)]
pub struct UserMessageConfig {
    /// Explicit message id; generated when `None`.
    pub message_id: Option<String>,
    /// Conversation id; generated when `None`.
    pub conversation_id: Option<String>,
    /// Message timestamp; `Utc::now()` when `None`.
    pub timestamp: Option<DateTime<Utc>>,
    /// Sending party.
    pub from: Option<Party>,
    /// Receiving party.
    pub to: Option<Party>,
    /// Optional agreement reference.
    pub agreement_ref: Option<String>,
    /// Service value.
    pub service: Option<String>,
    /// Optional service type.
    pub service_type: Option<String>,
    /// Action value.
    pub action: Option<String>,
    /// Message properties.
    pub properties: Vec<MessageProperty>,
    /// Payload part references, in part order.
    pub parts: Vec<PartInfo>,
}

/// An ebMS3 User Message.
///
/// The message id is immutable once assigned; there is deliberately no
/// setter and the field is private to this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    message_id: MessageId,
    /// Message creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Conversation id grouping related messages.
    pub conversation_id: String,
    /// Sending party.
    pub from: Party,
    /// Receiving party.
    pub to: Party,
    /// Collaboration context.
    pub collaboration: CollaborationInfo,
    /// Message properties.
    pub properties: Vec<MessageProperty>,
    /// Ordered payload part references.
    pub parts: Vec<PartInfo>,
}

impl UserMessage {
    /// Validating constructor.
    ///
    /// # Errors
    ///
    /// - `MissingElement` when party info, service or action are absent
    /// - `EmptyValue` when a mandatory value is blank
    /// - `InvalidPartReference` when a part href lacks the `cid:` prefix
    pub fn build(config: UserMessageConfig) -> Result<Self, MalformedMessage> {
        let from = config.from.ok_or(MalformedMessage::MissingElement("From"))?;
        let to = config.to.ok_or(MalformedMessage::MissingElement("To"))?;
        if from.id.trim().is_empty() {
            return Err(MalformedMessage::EmptyValue("From/PartyId"));
        }
        if to.id.trim().is_empty() {
            return Err(MalformedMessage::EmptyValue("To/PartyId"));
        }

        let service = config
            .service
            .ok_or(MalformedMessage::MissingElement("Service"))?;
        let action = config
            .action
            .ok_or(MalformedMessage::MissingElement("Action"))?;
        if service.trim().is_empty() {
            return Err(MalformedMessage::EmptyValue("Service"));
        }
        if action.trim().is_empty() {
            return Err(MalformedMessage::EmptyValue("Action"));
        }

        for part in &config.parts {
            if !part.href.starts_with(PREFIX_CID) {
                return Err(MalformedMessage::InvalidPartReference {
                    href: part.href.clone(),
                });
            }
        }

        let message_id = match config.message_id {
            Some(value) => MessageId::from_value(&value)?,
            None => MessageId::generate(),
        };

        Ok(Self {
            message_id,
            timestamp: config.timestamp.unwrap_or_else(Utc::now),
            conversation_id: config
                .conversation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            from,
            to,
            collaboration: CollaborationInfo {
                agreement_ref: config.agreement_ref,
                service,
                service_type: config.service_type,
                action,
            },
            properties: config.properties,
            parts: config.parts,
        })
    }

    /// The immutable message id.
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Reassemble a message parsed from the wire. Crate-internal; the
    /// public construction path is [`UserMessage::build`].
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_wire(
        message_id: MessageId,
        timestamp: DateTime<Utc>,
        conversation_id: String,
        from: Party,
        to: Party,
        collaboration: CollaborationInfo,
        properties: Vec<MessageProperty>,
        parts: Vec<PartInfo>,
    ) -> Self {
        Self {
            message_id,
            timestamp,
            conversation_id,
            from,
            to,
            collaboration,
            properties,
            parts,
        }
    }

    /// Check that every part reference resolves against the given set of
    /// attachment content ids (order-insensitive, exact match).
    ///
    /// # Errors
    ///
    /// `DanglingPartReference` for the first href without a matching id.
    pub fn check_part_references<'a, I>(&self, content_ids: I) -> Result<(), MalformedMessage>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids: Vec<&str> = content_ids.into_iter().collect();
        for part in &self.parts {
            let Some(cid) = crate::ids::strip_cid(&part.href) else {
                return Err(MalformedMessage::InvalidPartReference {
                    href: part.href.clone(),
                });
            };
            if !ids.contains(&cid) {
                return Err(MalformedMessage::DanglingPartReference {
                    href: part.href.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UserMessageConfig {
        UserMessageConfig {
            from: Some(Party::new("sender")),
            to: Some(Party::new("receiver")),
            service: Some("tc1".to_owned()),
            action: Some("Deliver".to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_generates_ids() {
        let msg = UserMessage::build(config()).unwrap();
        assert!(!msg.message_id().as_str().is_empty());
        assert!(!msg.conversation_id.is_empty());
    }

    #[test]
    fn test_build_keeps_explicit_id() {
        let mut cfg = config();
        cfg.message_id = Some("fixed@example.com".to_owned());
        let msg = UserMessage::build(cfg).unwrap();
        assert_eq!(msg.message_id().as_str(), "fixed@example.com");
    }

    #[test]
    fn test_missing_party_rejected() {
        let mut cfg = config();
        cfg.from = None;
        assert_eq!(
            UserMessage::build(cfg),
            Err(MalformedMessage::MissingElement("From"))
        );
    }

    #[test]
    fn test_blank_action_rejected() {
        let mut cfg = config();
        cfg.action = Some("  ".to_owned());
        assert_eq!(
            UserMessage::build(cfg),
            Err(MalformedMessage::EmptyValue("Action"))
        );
    }

    #[test]
    fn test_part_href_must_be_cid() {
        let mut cfg = config();
        cfg.parts = vec![PartInfo {
            href: "http://example.com/part".to_owned(),
            properties: Vec::new(),
        }];
        assert!(matches!(
            UserMessage::build(cfg),
            Err(MalformedMessage::InvalidPartReference { .. })
        ));
    }

    #[test]
    fn test_part_reference_check() {
        let mut cfg = config();
        cfg.parts = vec![PartInfo::for_content_id("part1@host")];
        let msg = UserMessage::build(cfg).unwrap();

        assert!(msg.check_part_references(["part1@host"]).is_ok());
        assert!(matches!(
            msg.check_part_references(["other@host"]),
            Err(MalformedMessage::DanglingPartReference { .. })
        ));
    }
}
