//! # Compression Codec
//!
//! Gzip transform over attachment content. Compression rewrites the wire
//! MIME type to `application/gzip` and keeps the original type in the
//! attachment so the receiver can invert the transform; decompression is
//! the exact inverse and validates the gzip magic before inflating.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use as4_model::compression::GZIP_MIME_TYPE;
use as4_model::CompressionMode;

use crate::attachment::{Attachment, PayloadSource};
use crate::errors::CompressionError;

/// First two bytes of every RFC 1952 stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

impl Attachment {
    /// Compress the content in place with the given mode.
    ///
    /// `CompressionMode::None` leaves the attachment untouched. Gzip
    /// streams the source through the encoder (the source is read once)
    /// and records the original MIME type for the receiver.
    ///
    /// # Errors
    ///
    /// `CompressionError::Io` when the source cannot be read.
    pub fn compress(&mut self, mode: CompressionMode) -> Result<(), CompressionError> {
        match mode {
            CompressionMode::None => Ok(()),
            CompressionMode::Gzip => {
                if self.compression() == CompressionMode::Gzip {
                    return Ok(());
                }
                let content_id = self.content_id().to_owned();
                let mut reader = self.source.reader().map_err(|e| CompressionError::Io {
                    content_id: content_id.clone(),
                    detail: e.to_string(),
                })?;
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                std::io::copy(&mut reader, &mut encoder)
                    .and_then(|_| encoder.flush())
                    .map_err(|e| CompressionError::Io {
                        content_id: content_id.clone(),
                        detail: e.to_string(),
                    })?;
                let compressed = encoder.finish().map_err(|e| CompressionError::Io {
                    content_id: content_id.clone(),
                    detail: e.to_string(),
                })?;
                debug!(content_id = %content_id, bytes = compressed.len(), "compressed attachment");
                drop(reader);
                self.set_transformed(
                    PayloadSource::Bytes(compressed.into()),
                    GZIP_MIME_TYPE.to_owned(),
                    CompressionMode::Gzip,
                );
                Ok(())
            }
        }
    }

    /// Invert [`Attachment::compress`], restoring the original content
    /// and MIME type.
    ///
    /// # Errors
    ///
    /// - `NotCompressed` when the attachment is not marked compressed
    /// - `NotGzip` when the declared mode does not match the stream
    ///   (missing gzip magic)
    /// - `CorruptStream` when inflation fails mid-stream
    pub fn decompress(&mut self) -> Result<(), CompressionError> {
        if self.compression() != CompressionMode::Gzip {
            return Err(CompressionError::NotCompressed {
                content_id: self.content_id().to_owned(),
            });
        }
        let content_id = self.content_id().to_owned();
        let content = self.content()?;
        if content.len() < GZIP_MAGIC.len() || content[..2] != GZIP_MAGIC {
            return Err(CompressionError::NotGzip { content_id });
        }
        let mut decoder = GzDecoder::new(content.as_ref());
        let mut restored = Vec::new();
        decoder
            .read_to_end(&mut restored)
            .map_err(|e| CompressionError::CorruptStream {
                content_id: content_id.clone(),
                detail: e.to_string(),
            })?;
        debug!(content_id = %content_id, bytes = restored.len(), "decompressed attachment");
        self.set_restored(PayloadSource::Bytes(restored.into()));
        Ok(())
    }
}
