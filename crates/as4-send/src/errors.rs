//! Send-side errors.

use std::time::Duration;

use thiserror::Error;

use as4_attachment::CompressionError;
use as4_mime::MalformedMime;
use as4_model::MalformedMessage;
use as4_pmode::ConfigError;
use as4_security::SecurityError;

/// Local failures while building or sending a message.
///
/// These never cross the wire: they are returned to the caller as typed
/// values. Transport-level failures are not here — they feed the retry
/// loop and surface through the outcome instead.
#[derive(Debug, Error)]
pub enum SendError {
    /// The agreement is invalid or unusable for this send.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The message could not be constructed or serialized.
    #[error(transparent)]
    Message(#[from] MalformedMessage),

    /// Attachment compression failed.
    #[error(transparent)]
    Compression(#[from] CompressionError),

    /// The security pipeline failed.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// MIME packaging failed.
    #[error(transparent)]
    Mime(#[from] MalformedMime),

    /// The caller's overall per-message timeout elapsed.
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}
