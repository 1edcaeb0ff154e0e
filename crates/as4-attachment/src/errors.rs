//! Attachment codec errors.

use thiserror::Error;

/// Errors from attachment compression and decompression.
///
/// All of these are recoverable on the receive path: the pipeline maps
/// them to an ebMS `ValueInconsistent` error signal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompressionError {
    /// Declared gzip but the stream does not start with the gzip magic.
    #[error("Attachment {content_id}: declared gzip but stream has no gzip magic")]
    NotGzip { content_id: String },

    /// The gzip stream is present but corrupt.
    #[error("Attachment {content_id}: corrupt gzip stream: {detail}")]
    CorruptStream { content_id: String, detail: String },

    /// Decompression requested on an uncompressed attachment.
    #[error("Attachment {content_id} is not compressed")]
    NotCompressed { content_id: String },

    /// The `CompressionType` part property names an unsupported scheme.
    #[error("Unsupported compression type: {value}")]
    UnsupportedCompressionType { value: String },

    /// Reading the payload source failed.
    #[error("I/O error on attachment {content_id}: {detail}")]
    Io { content_id: String, detail: String },
}
