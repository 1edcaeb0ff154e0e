//! MIME packaging errors.

use thiserror::Error;

/// Errors raised while packing or unpacking the multipart body.
///
/// On the receive path these map to an ebMS `ValueInconsistent` signal;
/// the peer gets a deterministic response for malformed packaging.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedMime {
    /// `multipart/related` content type without a boundary parameter.
    #[error("multipart content type declares no boundary")]
    MissingBoundary,

    /// The declared boundary never occurs in the body.
    #[error("declared boundary does not occur in the body")]
    BoundaryNotFound,

    /// The closing `--boundary--` delimiter is missing.
    #[error("multipart body is not terminated by a closing boundary")]
    MissingTerminator,

    /// A part is structurally broken (no header/content separation).
    #[error("malformed MIME part at index {index}")]
    MalformedPart { index: usize },

    /// An attachment part has no `Content-ID` header.
    #[error("MIME part at index {index} has no Content-ID")]
    MissingContentId { index: usize },

    /// The root part is not valid UTF-8 XML.
    #[error("root part is not valid UTF-8: {0}")]
    RootNotUtf8(String),

    /// The request body is empty.
    #[error("empty message body")]
    EmptyBody,

    /// An attachment source failed to read while packing.
    #[error("failed to read attachment {content_id}: {detail}")]
    PartRead { content_id: String, detail: String },
}
