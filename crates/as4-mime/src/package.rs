//! # Package Assembly
//!
//! Builds the outbound `multipart/related` body. Attachment parts keep
//! their payload source: file-backed content is streamed into the output
//! writer, so pass-through packaging stays constant-memory per part.

use std::io::Write;

use uuid::Uuid;

use as4_attachment::{Attachment, PayloadSource};
use as4_model::{new_content_id, SoapVersion};

use crate::errors::MalformedMime;

/// One attachment part of the package.
#[derive(Clone, Debug)]
pub struct MimeBodyPart {
    /// Content id (without `cid:` and without angle brackets).
    pub content_id: String,
    /// Wire MIME type of the part.
    pub content_type: String,
    /// Part payload.
    pub source: PayloadSource,
}

/// An assembled SOAP-with-attachments package.
#[derive(Clone, Debug)]
pub struct MimePackage {
    soap_version: SoapVersion,
    boundary: String,
    root_content_id: String,
    envelope_xml: String,
    parts: Vec<MimeBodyPart>,
}

impl MimePackage {
    /// Assemble a package from a serialized envelope and its attachments.
    ///
    /// With no attachments the package degenerates to a plain SOAP
    /// document (no multipart framing).
    #[must_use]
    pub fn pack(soap_version: SoapVersion, envelope_xml: String, attachments: &[Attachment]) -> Self {
        let parts = attachments
            .iter()
            .map(|attachment| MimeBodyPart {
                content_id: attachment.content_id().to_owned(),
                content_type: attachment.mime_type().to_owned(),
                source: attachment.source.clone(),
            })
            .collect();
        Self {
            soap_version,
            boundary: format!("----=_Part_{}", Uuid::new_v4().simple()),
            root_content_id: new_content_id(),
            envelope_xml,
            parts,
        }
    }

    /// The multipart boundary (empty meaning for single-part packages).
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The serialized SOAP envelope.
    #[must_use]
    pub fn envelope_xml(&self) -> &str {
        &self.envelope_xml
    }

    /// Attachment parts in package order.
    #[must_use]
    pub fn parts(&self) -> &[MimeBodyPart] {
        &self.parts
    }

    /// True when the package has multipart framing.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Value of the HTTP `Content-Type` header for this package.
    #[must_use]
    pub fn content_type_header(&self) -> String {
        if self.is_multipart() {
            format!(
                "multipart/related; boundary=\"{}\"; type=\"{}\"; start=\"<{}>\"",
                self.boundary,
                self.soap_version.mime_type(),
                self.root_content_id
            )
        } else {
            format!("{}; charset=utf-8", self.soap_version.mime_type())
        }
    }

    /// MIME headers mirrored onto the HTTP request.
    #[must_use]
    pub fn transport_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", self.content_type_header()),
            ("MIME-Version", "1.0".to_owned()),
        ]
    }

    /// Stream the body into a writer.
    ///
    /// # Errors
    ///
    /// `MalformedMime::PartRead` when an attachment source fails to read.
    pub fn write_body<W: Write>(&self, out: &mut W) -> Result<(), MalformedMime> {
        if !self.is_multipart() {
            return out
                .write_all(self.envelope_xml.as_bytes())
                .map_err(|e| part_read("<root>", &e));
        }

        write_delimiter(out, &self.boundary).map_err(|e| part_read("<root>", &e))?;
        write_part_headers(
            out,
            &format!("{}; charset=utf-8", self.soap_version.mime_type()),
            &self.root_content_id,
        )
        .map_err(|e| part_read("<root>", &e))?;
        out.write_all(self.envelope_xml.as_bytes())
            .map_err(|e| part_read("<root>", &e))?;

        for part in &self.parts {
            out.write_all(b"\r\n").map_err(|e| part_read(&part.content_id, &e))?;
            write_delimiter(out, &self.boundary).map_err(|e| part_read(&part.content_id, &e))?;
            write_part_headers(out, &part.content_type, &part.content_id)
                .map_err(|e| part_read(&part.content_id, &e))?;
            let mut reader = part
                .source
                .reader()
                .map_err(|e| part_read(&part.content_id, &e))?;
            std::io::copy(&mut reader, out).map_err(|e| part_read(&part.content_id, &e))?;
        }

        out.write_all(b"\r\n").map_err(|e| part_read("<root>", &e))?;
        out.write_all(format!("--{}--\r\n", self.boundary).as_bytes())
            .map_err(|e| part_read("<root>", &e))
    }

    /// Materialize the body.
    ///
    /// # Errors
    ///
    /// See [`MimePackage::write_body`].
    pub fn body(&self) -> Result<Vec<u8>, MalformedMime> {
        let mut buf = Vec::new();
        self.write_body(&mut buf)?;
        Ok(buf)
    }
}

fn part_read(content_id: &str, error: &dyn std::fmt::Display) -> MalformedMime {
    MalformedMime::PartRead {
        content_id: content_id.to_owned(),
        detail: error.to_string(),
    }
}

fn write_delimiter<W: Write>(out: &mut W, boundary: &str) -> std::io::Result<()> {
    out.write_all(format!("--{boundary}\r\n").as_bytes())
}

fn write_part_headers<W: Write>(
    out: &mut W,
    content_type: &str,
    content_id: &str,
) -> std::io::Result<()> {
    out.write_all(format!("Content-Type: {content_type}\r\n").as_bytes())?;
    out.write_all(b"Content-Transfer-Encoding: binary\r\n")?;
    out.write_all(format!("Content-ID: <{content_id}>\r\n").as_bytes())?;
    out.write_all(b"\r\n")
}
