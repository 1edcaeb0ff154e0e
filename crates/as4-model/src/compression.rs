//! Payload compression modes.

use serde::{Deserialize, Serialize};

/// MIME type an attachment carries while compressed.
pub const GZIP_MIME_TYPE: &str = "application/gzip";

/// Compression applied to an attachment before packaging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMode {
    /// Pass-through; bytes ship as-is.
    #[default]
    None,
    /// RFC 1952 gzip.
    Gzip,
}

impl CompressionMode {
    /// MIME type of the compressed representation, when one applies.
    #[must_use]
    pub fn mime_type(self) -> Option<&'static str> {
        match self {
            CompressionMode::None => None,
            CompressionMode::Gzip => Some(GZIP_MIME_TYPE),
        }
    }

    /// Resolve a mode from the `CompressionType` part property value.
    #[must_use]
    pub fn from_mime_type(value: &str) -> Option<Self> {
        (value == GZIP_MIME_TYPE).then_some(CompressionMode::Gzip)
    }
}
