//! # Package Parsing
//!
//! The exact inverse of packing: splits a `multipart/related` body at the
//! declared boundary into the root envelope and one attachment per part.
//! A boundary that does not cleanly partition the stream is a
//! [`MalformedMime`] error, never a panic, since the body comes straight
//! off the wire.

use tracing::debug;

use as4_attachment::Attachment;

use crate::errors::MalformedMime;

/// Split an inbound HTTP body into envelope XML and attachments.
///
/// Non-multipart content types are treated as a bare SOAP document with
/// zero attachments.
///
/// # Errors
///
/// See [`MalformedMime`] for the possible rejections.
pub fn unpack(content_type: &str, body: &[u8]) -> Result<(String, Vec<Attachment>), MalformedMime> {
    if body.is_empty() {
        return Err(MalformedMime::EmptyBody);
    }

    let main_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if main_type != "multipart/related" {
        let envelope = String::from_utf8(body.to_vec())
            .map_err(|e| MalformedMime::RootNotUtf8(e.to_string()))?;
        return Ok((envelope, Vec::new()));
    }

    let boundary = parameter(content_type, "boundary").ok_or(MalformedMime::MissingBoundary)?;
    let sections = split_sections(body, &boundary)?;
    let Some((root_section, attachment_sections)) = sections.split_first() else {
        return Err(MalformedMime::MalformedPart { index: 0 });
    };

    let (_, root_content) = parse_part(root_section, 0)?;
    let envelope = String::from_utf8(root_content.to_vec())
        .map_err(|e| MalformedMime::RootNotUtf8(e.to_string()))?;

    let mut attachments = Vec::with_capacity(attachment_sections.len());
    for (offset, section) in attachment_sections.iter().enumerate() {
        let index = offset + 1;
        let (headers, content) = parse_part(section, index)?;
        let content_id = header_value(&headers, "content-id")
            .map(strip_brackets)
            .ok_or(MalformedMime::MissingContentId { index })?;
        let part_type =
            header_value(&headers, "content-type").unwrap_or("application/octet-stream");
        attachments.push(Attachment::from_wire_part(
            content_id,
            part_type,
            content.to_vec(),
        ));
    }

    debug!(parts = attachments.len(), "unpacked multipart message");
    Ok((envelope, attachments))
}

/// Extract a parameter from a content type value, unquoting if needed.
fn parameter(content_type: &str, name: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|part| part.split_once('='))
        .find_map(|(key, value)| {
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().trim_matches('"').to_owned())
        })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// Cut the body into per-part sections (headers + content), validating
/// that the boundary partitions the stream and that the closing
/// delimiter is present.
fn split_sections<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>, MalformedMime> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut sections: Vec<&[u8]> = Vec::new();
    let mut content_start: Option<usize> = None;
    let mut pos = 0;

    loop {
        let Some(idx) = find(body, &delimiter, pos) else {
            return if sections.is_empty() && content_start.is_none() {
                Err(MalformedMime::BoundaryNotFound)
            } else {
                Err(MalformedMime::MissingTerminator)
            };
        };
        let at_line_start = idx == 0 || (idx >= 2 && &body[idx - 2..idx] == b"\r\n");
        if !at_line_start {
            pos = idx + delimiter.len();
            continue;
        }

        if let Some(start) = content_start.take() {
            // Strip the CRLF that precedes the delimiter.
            sections.push(&body[start..idx.saturating_sub(2)]);
        }

        let after = idx + delimiter.len();
        if body.len() >= after + 2 && &body[after..after + 2] == b"--" {
            return if sections.is_empty() {
                Err(MalformedMime::MalformedPart { index: 0 })
            } else {
                Ok(sections)
            };
        }

        // Tolerate transport padding between the delimiter and end of line.
        let line_end = find(body, b"\r\n", after).ok_or(MalformedMime::MissingTerminator)?;
        content_start = Some(line_end + 2);
        pos = line_end + 2;
    }
}

type Headers = Vec<(String, String)>;

fn parse_part(section: &[u8], index: usize) -> Result<(Headers, &[u8]), MalformedMime> {
    let split = find(section, b"\r\n\r\n", 0).ok_or(MalformedMime::MalformedPart { index })?;
    let header_block = &section[..split];
    let content = &section[split + 4..];

    let mut headers = Headers::new();
    for line in header_block.split(|&b| b == b'\n') {
        let line = match line.last() {
            Some(b'\r') => &line[..line.len() - 1],
            _ => line,
        };
        if line.is_empty() {
            continue;
        }
        let text =
            std::str::from_utf8(line).map_err(|_| MalformedMime::MalformedPart { index })?;
        let (name, value) = text
            .split_once(':')
            .ok_or(MalformedMime::MalformedPart { index })?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
    }
    Ok((headers, content))
}

fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn strip_brackets(value: &str) -> &str {
    value
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .unwrap_or(value)
}
