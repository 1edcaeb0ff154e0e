//! # Attachment Entity
//!
//! One payload part: content source, MIME typing, compression state.
//!
//! Ownership follows the message flow: the sender creates an attachment
//! from an external payload source and the message owns it exclusively
//! until it is handed to the MIME packager; on the receive side the
//! pipeline owns attachments until they are dispatched to the business
//! consumer.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use bytes::Bytes;

use as4_model::entities::{PartProperty, PROP_CHARACTER_SET, PROP_COMPRESSION_TYPE, PROP_MIME_TYPE};
use as4_model::{new_content_id, CompressionMode, MessageProperty, PartInfo};

use crate::errors::CompressionError;

/// Where attachment bytes come from.
///
/// File-backed sources are opened lazily and streamed; they are read at
/// most once per packaging pass.
#[derive(Clone, Debug)]
pub enum PayloadSource {
    /// In-memory content.
    Bytes(Bytes),
    /// Content on disk.
    File(PathBuf),
}

impl PayloadSource {
    /// Open a streaming reader over the content.
    ///
    /// # Errors
    ///
    /// I/O failure opening a file-backed source.
    pub fn reader(&self) -> std::io::Result<Box<dyn Read + Send + '_>> {
        match self {
            PayloadSource::Bytes(bytes) => Ok(Box::new(bytes.as_ref())),
            PayloadSource::File(path) => Ok(Box::new(File::open(path)?)),
        }
    }

    /// Materialize the content.
    ///
    /// # Errors
    ///
    /// I/O failure reading a file-backed source.
    pub fn to_bytes(&self) -> std::io::Result<Bytes> {
        match self {
            PayloadSource::Bytes(bytes) => Ok(bytes.clone()),
            PayloadSource::File(path) => {
                let mut buf = Vec::new();
                File::open(path)?.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// A payload part beside the SOAP envelope.
#[derive(Clone, Debug)]
pub struct Attachment {
    content_id: String,
    /// Content source; replaced when the codec transforms the part.
    pub source: PayloadSource,
    /// MIME type of the bytes as they travel on the wire.
    mime_type: String,
    /// MIME type before compression; equals `mime_type` when uncompressed.
    original_mime_type: String,
    compression: CompressionMode,
    character_set: Option<String>,
}

impl Attachment {
    /// Attachment over in-memory content.
    #[must_use]
    pub fn from_bytes(mime_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let mime_type = mime_type.into();
        Self {
            content_id: new_content_id(),
            source: PayloadSource::Bytes(content.into()),
            original_mime_type: mime_type.clone(),
            mime_type,
            compression: CompressionMode::None,
            character_set: None,
        }
    }

    /// Attachment over a file on disk.
    #[must_use]
    pub fn from_file(mime_type: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let mime_type = mime_type.into();
        Self {
            content_id: new_content_id(),
            source: PayloadSource::File(path.into()),
            original_mime_type: mime_type.clone(),
            mime_type,
            compression: CompressionMode::None,
            character_set: None,
        }
    }

    /// Reconstruct an attachment from an unpacked MIME part. The content
    /// id and MIME type come from the part headers; compression state is
    /// applied later from the header part properties.
    #[must_use]
    pub fn from_wire_part(
        content_id: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        let mime_type = mime_type.into();
        Self {
            content_id: content_id.into(),
            source: PayloadSource::Bytes(content.into()),
            original_mime_type: mime_type.clone(),
            mime_type,
            compression: CompressionMode::None,
            character_set: None,
        }
    }

    /// Set an explicit content id (wire form, without `cid:`).
    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = content_id.into();
        self
    }

    /// Declare the character set of a textual payload.
    #[must_use]
    pub fn with_character_set(mut self, charset: impl Into<String>) -> Self {
        self.character_set = Some(charset.into());
        self
    }

    /// The part content id (without `cid:`).
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// MIME type of the bytes currently held.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// MIME type of the business payload before compression.
    #[must_use]
    pub fn original_mime_type(&self) -> &str {
        &self.original_mime_type
    }

    /// Current compression state.
    #[must_use]
    pub fn compression(&self) -> CompressionMode {
        self.compression
    }

    /// Materialize the current content.
    ///
    /// # Errors
    ///
    /// `CompressionError::Io` when a file-backed source fails to read.
    pub fn content(&self) -> Result<Bytes, CompressionError> {
        self.source.to_bytes().map_err(|e| CompressionError::Io {
            content_id: self.content_id.clone(),
            detail: e.to_string(),
        })
    }

    /// Part properties describing this attachment in the message header.
    #[must_use]
    pub fn part_properties(&self) -> Vec<PartProperty> {
        let mut properties = vec![MessageProperty::new(PROP_MIME_TYPE, &self.original_mime_type)];
        if let Some(compressed_type) = self.compression.mime_type() {
            properties.push(MessageProperty::new(PROP_COMPRESSION_TYPE, compressed_type));
        }
        if let Some(charset) = &self.character_set {
            properties.push(MessageProperty::new(PROP_CHARACTER_SET, charset));
        }
        properties
    }

    /// Header part reference for this attachment.
    #[must_use]
    pub fn part_info(&self) -> PartInfo {
        let mut part = PartInfo::for_content_id(&self.content_id);
        part.properties = self.part_properties();
        part
    }

    /// Apply the compression state declared in the header part properties
    /// of an inbound message.
    ///
    /// # Errors
    ///
    /// `UnsupportedCompressionType` when the property names a scheme this
    /// engine does not implement.
    pub fn apply_part_properties(&mut self, part: &PartInfo) -> Result<(), CompressionError> {
        if let Some(declared) = part.property(PROP_COMPRESSION_TYPE) {
            let mode = CompressionMode::from_mime_type(declared).ok_or_else(|| {
                CompressionError::UnsupportedCompressionType {
                    value: declared.to_owned(),
                }
            })?;
            self.compression = mode;
        }
        if let Some(original) = part.property(PROP_MIME_TYPE) {
            self.original_mime_type = original.to_owned();
        }
        if let Some(charset) = part.property(PROP_CHARACTER_SET) {
            self.character_set = Some(charset.to_owned());
        }
        Ok(())
    }

    /// Replace the wire content and MIME type, keeping the compression
    /// state and the original MIME type. Used when a transform (e.g.
    /// content encryption) substitutes the part bytes.
    pub fn replace_content(&mut self, source: PayloadSource, mime_type: impl Into<String>) {
        self.source = source;
        self.mime_type = mime_type.into();
    }

    pub(crate) fn set_transformed(
        &mut self,
        source: PayloadSource,
        mime_type: String,
        compression: CompressionMode,
    ) {
        self.source = source;
        self.mime_type = mime_type;
        self.compression = compression;
    }

    pub(crate) fn set_restored(&mut self, source: PayloadSource) {
        self.source = source;
        self.mime_type = self.original_mime_type.clone();
        self.compression = CompressionMode::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_bytes_defaults() {
        let attachment = Attachment::from_bytes("application/xml", &b"<a/>"[..]);
        assert_eq!(attachment.mime_type(), "application/xml");
        assert_eq!(attachment.original_mime_type(), "application/xml");
        assert_eq!(attachment.compression(), CompressionMode::None);
        assert!(attachment.content_id().contains('@'));
    }

    #[test]
    fn test_file_source_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"file payload").unwrap();

        let attachment =
            Attachment::from_file("application/octet-stream", file.path()).with_content_id("f@x");
        assert_eq!(attachment.content().unwrap().as_ref(), b"file payload");
    }

    #[test]
    fn test_part_info_carries_mime_property() {
        let attachment = Attachment::from_bytes("image/jpeg", &b"jpg"[..]).with_content_id("a@x");
        let part = attachment.part_info();
        assert_eq!(part.href, "cid:a@x");
        assert_eq!(part.property(PROP_MIME_TYPE), Some("image/jpeg"));
        assert_eq!(part.property(PROP_COMPRESSION_TYPE), None);
    }

    #[test]
    fn test_unsupported_compression_property() {
        let mut attachment = Attachment::from_wire_part("a@x", "application/zstd", &b"zz"[..]);
        let mut part = PartInfo::for_content_id("a@x");
        part.properties
            .push(MessageProperty::new(PROP_COMPRESSION_TYPE, "application/zstd"));

        assert!(matches!(
            attachment.apply_part_properties(&part),
            Err(CompressionError::UnsupportedCompressionType { .. })
        ));
    }
}
