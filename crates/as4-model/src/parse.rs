//! # SOAP Envelope Codec (parser side)
//!
//! Event-driven parser for inbound envelopes. Matching is by local element
//! name so that peers using different namespace prefixes still parse; the
//! security header and the SOAP body are captured as verbatim byte spans of
//! the input, keeping digest computation stable across the wire.
//!
//! Missing mandatory elements surface as [`MalformedMessage`] values. The
//! receive pipeline turns those into ebMS Error signals; they must never
//! abort the connection.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::entities::{
    CollaborationInfo, MessageProperty, PartInfo, Party, UserMessage, DEFAULT_PARTY_ROLE,
};
use crate::envelope::{xml_err, MessagingContent, SoapEnvelope};
use crate::errors::MalformedMessage;
use crate::ids::MessageId;
use crate::signal::{
    EbmsError, EbmsErrorCode, PartDigest, Receipt, Severity, SignalBody, SignalMessage,
};
use crate::soap::SoapVersion;

type XmlReader<'i> = Reader<&'i [u8]>;

/// Parse a SOAP envelope document.
pub fn envelope_from_xml(xml: &str) -> Result<SoapEnvelope, MalformedMessage> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut soap_version: Option<SoapVersion> = None;
    let mut security: Option<String> = None;
    let mut body: Option<String> = None;
    let mut content: Option<MessagingContent> = None;
    let mut saw_envelope = false;
    let mut saw_messaging = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                if !saw_envelope {
                    let name = local(&e);
                    if name != "Envelope" {
                        return Err(MalformedMessage::UnexpectedRoot(name));
                    }
                    soap_version = detect_soap_version(&e)?;
                    if soap_version.is_none() {
                        return Err(MalformedMessage::UnsupportedSoapNamespace);
                    }
                    saw_envelope = true;
                    continue;
                }
                match local(&e).as_str() {
                    "Header" => {}
                    "Messaging" => {
                        saw_messaging = true;
                        content = Some(parse_messaging(&mut reader)?);
                    }
                    "Security" => {
                        let span = reader.read_to_end(e.name()).map_err(xml_err)?;
                        security = Some(xml[span.start as usize..span.end as usize].to_owned());
                    }
                    "Body" => {
                        let span = reader.read_to_end(e.name()).map_err(xml_err)?;
                        let inner = &xml[span.start as usize..span.end as usize];
                        if !inner.trim().is_empty() {
                            body = Some(inner.to_owned());
                        }
                    }
                    _ => {
                        reader.read_to_end(e.name()).map_err(xml_err)?;
                    }
                }
            }
            Event::Empty(e) => {
                if !saw_envelope {
                    return Err(MalformedMessage::UnexpectedRoot(local(&e)));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_envelope {
        return Err(MalformedMessage::Xml("no root element".to_owned()));
    }
    let soap_version = soap_version.ok_or(MalformedMessage::UnsupportedSoapNamespace)?;
    let content = match content {
        Some(content) => content,
        None if saw_messaging => return Err(MalformedMessage::MissingElement("UserMessage")),
        None => return Err(MalformedMessage::MissingMessaging),
    };

    Ok(SoapEnvelope {
        soap_version,
        content,
        security,
        body,
    })
}

fn detect_soap_version(root: &BytesStart<'_>) -> Result<Option<SoapVersion>, MalformedMessage> {
    for attr in root.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            let value = attr.unescape_value().map_err(xml_err)?;
            if let Some(version) = SoapVersion::from_namespace(&value) {
                return Ok(Some(version));
            }
        }
    }
    Ok(None)
}

fn local(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn local_end(e: &quick_xml::events::BytesEnd<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(
    e: &BytesStart<'_>,
    name: &str,
) -> Result<Option<String>, MalformedMessage> {
    Ok(e.try_get_attribute(name)
        .map_err(xml_err)?
        .map(|a| a.unescape_value().map(|v| v.into_owned()))
        .transpose()
        .map_err(xml_err)?)
}

/// Read the text content of a leaf element, skipping nested markup.
fn read_leaf_text(reader: &mut XmlReader<'_>, end: &str) -> Result<String, MalformedMessage> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(xml_err)?),
            Event::CData(c) => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                reader.read_to_end(QName(&name)).map_err(xml_err)?;
            }
            Event::End(e) if local_end(&e) == end => break,
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }
    Ok(text.trim().to_owned())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, MalformedMessage> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| MalformedMessage::InvalidTimestamp(value.to_owned()))
}

fn parse_messaging(reader: &mut XmlReader<'_>) -> Result<MessagingContent, MalformedMessage> {
    let mut content: Option<MessagingContent> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match local(&e).as_str() {
                "UserMessage" => {
                    content = Some(MessagingContent::User(parse_user_message(reader)?));
                }
                "SignalMessage" => {
                    content = Some(MessagingContent::Signal(parse_signal_message(reader)?));
                }
                _ => {
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
            },
            Event::End(e) if local_end(&e) == "Messaging" => break,
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }
    content.ok_or(MalformedMessage::MissingElement("UserMessage"))
}

fn parse_user_message(reader: &mut XmlReader<'_>) -> Result<UserMessage, MalformedMessage> {
    let mut timestamp: Option<DateTime<Utc>> = None;
    let mut message_id: Option<MessageId> = None;
    let mut from: Option<Party> = None;
    let mut to: Option<Party> = None;
    let mut agreement_ref: Option<String> = None;
    let mut service: Option<String> = None;
    let mut service_type: Option<String> = None;
    let mut action: Option<String> = None;
    let mut conversation_id: Option<String> = None;
    let mut properties: Vec<MessageProperty> = Vec::new();
    let mut parts: Vec<PartInfo> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match local(&e).as_str() {
                // Containers: descend.
                "MessageInfo" | "PartyInfo" | "CollaborationInfo" | "MessageProperties"
                | "PayloadInfo" => {}
                "Timestamp" => {
                    timestamp = Some(parse_timestamp(&read_leaf_text(reader, "Timestamp")?)?);
                }
                "MessageId" => {
                    message_id = Some(MessageId::from_value(&read_leaf_text(reader, "MessageId")?)?);
                }
                "RefToMessageId" => {
                    read_leaf_text(reader, "RefToMessageId")?;
                }
                "From" => from = Some(parse_party(reader, "From")?),
                "To" => to = Some(parse_party(reader, "To")?),
                "AgreementRef" => {
                    agreement_ref = Some(read_leaf_text(reader, "AgreementRef")?);
                }
                "Service" => {
                    service_type = attribute(&e, "type")?;
                    service = Some(read_leaf_text(reader, "Service")?);
                }
                "Action" => action = Some(read_leaf_text(reader, "Action")?),
                "ConversationId" => {
                    conversation_id = Some(read_leaf_text(reader, "ConversationId")?);
                }
                "Property" => properties.push(parse_property(reader, &e)?),
                "PartInfo" => parts.push(parse_part_info(reader, &e)?),
                _ => {
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
            },
            Event::Empty(e) => match local(&e).as_str() {
                "PartInfo" => parts.push(empty_part_info(&e)?),
                "Property" => properties.push(empty_property(&e)?),
                _ => {}
            },
            Event::End(e) if local_end(&e) == "UserMessage" => break,
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }

    let message_id = message_id.ok_or(MalformedMessage::MissingElement("MessageId"))?;
    let from = from.ok_or(MalformedMessage::MissingElement("PartyInfo"))?;
    let to = to.ok_or(MalformedMessage::MissingElement("PartyInfo"))?;
    let service = service.ok_or(MalformedMessage::MissingElement("Service"))?;
    let action = action.ok_or(MalformedMessage::MissingElement("Action"))?;

    Ok(UserMessage::from_wire(
        message_id,
        timestamp.unwrap_or_else(Utc::now),
        conversation_id.unwrap_or_default(),
        from,
        to,
        CollaborationInfo {
            agreement_ref,
            service,
            service_type,
            action,
        },
        properties,
        parts,
    ))
}

fn parse_party(reader: &mut XmlReader<'_>, end: &str) -> Result<Party, MalformedMessage> {
    let mut id: Option<String> = None;
    let mut id_type: Option<String> = None;
    let mut role: Option<String> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match local(&e).as_str() {
                "PartyId" => {
                    id_type = attribute(&e, "type")?;
                    id = Some(read_leaf_text(reader, "PartyId")?);
                }
                "Role" => role = Some(read_leaf_text(reader, "Role")?),
                _ => {
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
            },
            Event::End(e) if local_end(&e) == end => break,
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }
    let id = id.ok_or(MalformedMessage::MissingElement("PartyId"))?;
    if id.is_empty() {
        return Err(MalformedMessage::EmptyValue("PartyId"));
    }
    Ok(Party {
        id,
        id_type,
        role: role.unwrap_or_else(|| DEFAULT_PARTY_ROLE.to_owned()),
    })
}

fn parse_property(
    reader: &mut XmlReader<'_>,
    e: &BytesStart<'_>,
) -> Result<MessageProperty, MalformedMessage> {
    let name = attribute(e, "name")?.ok_or(MalformedMessage::MissingElement("Property/@name"))?;
    let prop_type = attribute(e, "type")?;
    let value = read_leaf_text(reader, "Property")?;
    Ok(MessageProperty {
        name,
        prop_type,
        value,
    })
}

fn empty_property(e: &BytesStart<'_>) -> Result<MessageProperty, MalformedMessage> {
    let name = attribute(e, "name")?.ok_or(MalformedMessage::MissingElement("Property/@name"))?;
    let prop_type = attribute(e, "type")?;
    Ok(MessageProperty {
        name,
        prop_type,
        value: String::new(),
    })
}

fn parse_part_info(
    reader: &mut XmlReader<'_>,
    e: &BytesStart<'_>,
) -> Result<PartInfo, MalformedMessage> {
    let href = attribute(e, "href")?.ok_or(MalformedMessage::MissingElement("PartInfo/@href"))?;
    let mut properties: Vec<MessageProperty> = Vec::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match local(&e).as_str() {
                "PartProperties" => {}
                "Property" => properties.push(parse_property(reader, &e)?),
                _ => {
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
            },
            Event::Empty(e) if local(&e) == "Property" => properties.push(empty_property(&e)?),
            Event::End(e) if local_end(&e) == "PartInfo" => break,
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }
    Ok(PartInfo { href, properties })
}

fn empty_part_info(e: &BytesStart<'_>) -> Result<PartInfo, MalformedMessage> {
    let href = attribute(e, "href")?.ok_or(MalformedMessage::MissingElement("PartInfo/@href"))?;
    Ok(PartInfo {
        href,
        properties: Vec::new(),
    })
}

fn parse_signal_message(reader: &mut XmlReader<'_>) -> Result<SignalMessage, MalformedMessage> {
    let mut timestamp: Option<DateTime<Utc>> = None;
    let mut message_id: Option<MessageId> = None;
    let mut ref_to: Option<String> = None;
    let mut receipt: Option<Receipt> = None;
    let mut errors: Vec<EbmsError> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match local(&e).as_str() {
                "MessageInfo" => {}
                "Timestamp" => {
                    timestamp = Some(parse_timestamp(&read_leaf_text(reader, "Timestamp")?)?);
                }
                "MessageId" => {
                    message_id = Some(MessageId::from_value(&read_leaf_text(reader, "MessageId")?)?);
                }
                "RefToMessageId" => {
                    ref_to = Some(read_leaf_text(reader, "RefToMessageId")?);
                }
                "Receipt" => receipt = Some(parse_receipt(reader)?),
                "Error" => errors.push(parse_error(reader, &e)?),
                _ => {
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
            },
            Event::Empty(e) => match local(&e).as_str() {
                "Receipt" => receipt = Some(Receipt::default()),
                "Error" => errors.push(error_from_attributes(&e, None)?),
                _ => {}
            },
            Event::End(e) if local_end(&e) == "SignalMessage" => break,
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }

    let message_id = message_id.ok_or(MalformedMessage::MissingElement("MessageId"))?;
    let ref_to = ref_to.ok_or(MalformedMessage::MissingElement("RefToMessageId"))?;
    let body = match (receipt, errors.is_empty()) {
        (Some(receipt), _) => SignalBody::Receipt(receipt),
        (None, false) => SignalBody::Error(errors),
        (None, true) => return Err(MalformedMessage::MissingElement("Receipt")),
    };

    Ok(SignalMessage::from_wire(
        message_id,
        timestamp.unwrap_or_else(Utc::now),
        ref_to,
        body,
    ))
}

fn parse_receipt(reader: &mut XmlReader<'_>) -> Result<Receipt, MalformedMessage> {
    let mut digests: Vec<PartDigest> = Vec::new();
    let mut current: Option<PartDigest> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match local(&e).as_str() {
                "NonRepudiationInformation" | "MessagePartNRInformation" => {}
                "Reference" => {
                    let reference = attribute(&e, "URI")?
                        .ok_or(MalformedMessage::MissingElement("Reference/@URI"))?;
                    current = Some(PartDigest {
                        reference,
                        algorithm: String::new(),
                        digest_b64: String::new(),
                    });
                }
                "DigestValue" => {
                    let value = read_leaf_text(reader, "DigestValue")?;
                    if let Some(digest) = current.as_mut() {
                        digest.digest_b64 = value;
                    }
                }
                _ => {
                    reader.read_to_end(e.name()).map_err(xml_err)?;
                }
            },
            Event::Empty(e) if local(&e) == "DigestMethod" => {
                if let Some(digest) = current.as_mut() {
                    digest.algorithm = attribute(&e, "Algorithm")?.unwrap_or_default();
                }
            }
            Event::End(e) => match local_end(&e).as_str() {
                "Reference" => {
                    if let Some(digest) = current.take() {
                        digests.push(digest);
                    }
                }
                "Receipt" => break,
                _ => {}
            },
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }
    Ok(Receipt {
        non_repudiation: digests,
    })
}

fn parse_error(
    reader: &mut XmlReader<'_>,
    e: &BytesStart<'_>,
) -> Result<EbmsError, MalformedMessage> {
    let mut detail: Option<String> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(inner) => match local(&inner).as_str() {
                "Description" => detail = Some(read_leaf_text(reader, "Description")?),
                "ErrorDetail" => {
                    let text = read_leaf_text(reader, "ErrorDetail")?;
                    detail.get_or_insert(text);
                }
                _ => {
                    reader.read_to_end(inner.name()).map_err(xml_err)?;
                }
            },
            Event::End(end) if local_end(&end) == "Error" => break,
            Event::Eof => {
                return Err(MalformedMessage::Xml("unexpected end of document".to_owned()))
            }
            _ => {}
        }
    }
    error_from_attributes(e, detail)
}

fn error_from_attributes(
    e: &BytesStart<'_>,
    detail: Option<String>,
) -> Result<EbmsError, MalformedMessage> {
    let code_str =
        attribute(e, "errorCode")?.ok_or(MalformedMessage::MissingElement("Error/@errorCode"))?;
    let code = EbmsErrorCode::parse(&code_str)?;
    let severity = attribute(e, "severity")?
        .and_then(|s| Severity::from_str_opt(&s))
        .unwrap_or(Severity::Failure);
    let short_description = attribute(e, "shortDescription")?
        .unwrap_or_else(|| code.short_description().to_owned());
    let ref_to_message_in_error = attribute(e, "refToMessageInError")?;
    Ok(EbmsError {
        code,
        severity,
        short_description,
        detail,
        ref_to_message_in_error,
    })
}
