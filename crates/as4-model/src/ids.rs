//! Message and content identifier handling.
//!
//! ebMS3 message ids follow the `local@domain` convention of RFC 2822
//! message identifiers; MIME attachment parts are addressed through
//! `cid:` hrefs that must match the part's `Content-ID` header exactly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::MalformedMessage;

/// Prefix linking an ebMS `PartInfo` href to a MIME part content id.
pub const PREFIX_CID: &str = "cid:";

/// Domain suffix used for generated message and content identifiers.
pub const ID_DOMAIN: &str = "as4.engine";

/// An ebMS3 message identifier.
///
/// Globally unique, assigned exactly once. Generated ids use the
/// `<uuid>@<domain>` form; ids received from a peer are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh globally unique message id.
    pub fn generate() -> Self {
        Self(format!("{}@{}", Uuid::new_v4(), ID_DOMAIN))
    }

    /// Wrap an id received on the wire.
    ///
    /// # Errors
    ///
    /// `MalformedMessage::EmptyValue` when the value is blank.
    pub fn from_value(value: &str) -> Result<Self, MalformedMessage> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(MalformedMessage::EmptyValue("MessageId"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a fresh content id for a MIME attachment part (without the
/// `cid:` prefix and without the angle brackets of the MIME header form).
#[must_use]
pub fn new_content_id() -> String {
    format!("{}@{}", Uuid::new_v4(), ID_DOMAIN)
}

/// Strip the `cid:` prefix from a part href, if present.
#[must_use]
pub fn strip_cid(href: &str) -> Option<&str> {
    href.strip_prefix(PREFIX_CID)
}
