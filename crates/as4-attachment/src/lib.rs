//! # Attachment Model and Codec
//!
//! Payload parts travelling beside the SOAP envelope: binary content from
//! memory or file, the declared MIME type, the compression state, and the
//! part properties that let the receiver restore the original payload.
//!
//! Compression is gzip-only, mirrored by the `CompressionType` part
//! property on the wire. Decompression validates the gzip magic before
//! inflating: a part whose declared mode does not match its bytes is a
//! recoverable [`CompressionError`], not a crash, because such messages
//! legitimately arrive from interoperating but buggy peers.

pub mod attachment;
pub mod codec;
pub mod errors;

pub use attachment::{Attachment, PayloadSource};
pub use errors::CompressionError;
