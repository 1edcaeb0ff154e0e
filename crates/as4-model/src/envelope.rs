//! # SOAP Envelope Codec (writer side)
//!
//! Serializes a User or Signal Message into a SOAP 1.1/1.2 envelope with
//! the `eb:Messaging` header block. Child element order follows the ebMS3
//! schema: MessageInfo, PartyInfo, CollaborationInfo, MessageProperties,
//! PayloadInfo.
//!
//! The security header and the SOAP body are carried as raw XML strings:
//! they are emitted verbatim so that digests computed over them survive a
//! serialize/parse round trip byte-for-byte.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::entities::UserMessage;
use crate::errors::MalformedMessage;
use crate::signal::{SignalBody, SignalMessage};
use crate::soap::SoapVersion;

/// ebMS3 core namespace.
pub const EBMS_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/";

/// The message carried in the `eb:Messaging` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessagingContent {
    /// A business-document-carrying User Message.
    User(UserMessage),
    /// A Receipt or Error Signal Message.
    Signal(SignalMessage),
}

/// In-memory form of one SOAP envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoapEnvelope {
    /// SOAP version the envelope is serialized with.
    pub soap_version: SoapVersion,
    /// The `eb:Messaging` content.
    pub content: MessagingContent,
    /// Raw security header XML, if present. Serialization emits it
    /// verbatim; parsing captures the inner content of the header
    /// element (the security codec matches elements by local name, so
    /// both forms parse the same).
    pub security: Option<String>,
    /// Raw inner XML of the SOAP body; `None` renders an empty body.
    pub body: Option<String>,
}

impl SoapEnvelope {
    /// Envelope around a User Message.
    #[must_use]
    pub fn user(soap_version: SoapVersion, message: UserMessage) -> Self {
        Self {
            soap_version,
            content: MessagingContent::User(message),
            security: None,
            body: None,
        }
    }

    /// Envelope around a Signal Message.
    #[must_use]
    pub fn signal(soap_version: SoapVersion, signal: SignalMessage) -> Self {
        Self {
            soap_version,
            content: MessagingContent::Signal(signal),
            security: None,
            body: None,
        }
    }

    /// The contained User Message, if any.
    #[must_use]
    pub fn user_message(&self) -> Option<&UserMessage> {
        match &self.content {
            MessagingContent::User(m) => Some(m),
            MessagingContent::Signal(_) => None,
        }
    }

    /// The contained Signal Message, if any.
    #[must_use]
    pub fn signal_message(&self) -> Option<&SignalMessage> {
        match &self.content {
            MessagingContent::Signal(s) => Some(s),
            MessagingContent::User(_) => None,
        }
    }

    /// Bytes of the body content as used for digest computation.
    #[must_use]
    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().map_or(&[], str::as_bytes)
    }

    /// Serialize to an XML document.
    ///
    /// # Errors
    ///
    /// `MalformedMessage::Xml` on writer failures.
    pub fn to_xml(&self) -> Result<String, MalformedMessage> {
        let soap = soap_prefix(self.soap_version);
        let mut writer = Writer::new(Vec::new());

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;

        let envelope_name = format!("{soap}:Envelope");
        let mut envelope = BytesStart::new(envelope_name.as_str());
        envelope.push_attribute((format!("xmlns:{soap}").as_str(), self.soap_version.namespace()));
        envelope.push_attribute(("xmlns:eb", EBMS_NS));
        writer.write_event(Event::Start(envelope)).map_err(xml_err)?;

        let header_name = format!("{soap}:Header");
        writer
            .write_event(Event::Start(BytesStart::new(header_name.as_str())))
            .map_err(xml_err)?;

        let mut messaging = BytesStart::new("eb:Messaging");
        messaging.push_attribute((
            format!("{soap}:mustUnderstand").as_str(),
            self.soap_version.must_understand(),
        ));
        writer.write_event(Event::Start(messaging)).map_err(xml_err)?;
        match &self.content {
            MessagingContent::User(message) => write_user_message(&mut writer, message)?,
            MessagingContent::Signal(signal) => write_signal_message(&mut writer, signal)?,
        }
        writer
            .write_event(Event::End(BytesEnd::new("eb:Messaging")))
            .map_err(xml_err)?;

        if let Some(security) = &self.security {
            write_raw(&mut writer, security)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(header_name.as_str())))
            .map_err(xml_err)?;

        let body_name = format!("{soap}:Body");
        match &self.body {
            Some(content) => {
                writer
                    .write_event(Event::Start(BytesStart::new(body_name.as_str())))
                    .map_err(xml_err)?;
                write_raw(&mut writer, content)?;
                writer
                    .write_event(Event::End(BytesEnd::new(body_name.as_str())))
                    .map_err(xml_err)?;
            }
            None => {
                writer
                    .write_event(Event::Empty(BytesStart::new(body_name.as_str())))
                    .map_err(xml_err)?;
            }
        }

        writer
            .write_event(Event::End(BytesEnd::new(envelope_name.as_str())))
            .map_err(xml_err)?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| MalformedMessage::Xml(e.to_string()))
    }

    /// Parse an XML document. See [`crate::parse`].
    pub fn from_xml(xml: &str) -> Result<Self, MalformedMessage> {
        crate::parse::envelope_from_xml(xml)
    }
}

pub(crate) fn soap_prefix(version: SoapVersion) -> &'static str {
    match version {
        SoapVersion::Soap11 => "S11",
        SoapVersion::Soap12 => "S12",
    }
}

pub(crate) fn xml_err<E: std::fmt::Display>(err: E) -> MalformedMessage {
    MalformedMessage::Xml(err.to_string())
}

type XmlWriter = Writer<Vec<u8>>;

/// Emit pre-serialized XML verbatim.
fn write_raw(writer: &mut XmlWriter, raw: &str) -> Result<(), MalformedMessage> {
    writer
        .write_event(Event::Text(BytesText::from_escaped(raw)))
        .map_err(xml_err)
}

fn write_text_element(
    writer: &mut XmlWriter,
    name: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<(), MalformedMessage> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        start.push_attribute((*key, *value));
    }
    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

fn start(writer: &mut XmlWriter, name: &str) -> Result<(), MalformedMessage> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<(), MalformedMessage> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn write_user_message(writer: &mut XmlWriter, message: &UserMessage) -> Result<(), MalformedMessage> {
    start(writer, "eb:UserMessage")?;

    start(writer, "eb:MessageInfo")?;
    write_text_element(writer, "eb:Timestamp", &[], &format_timestamp(&message.timestamp))?;
    write_text_element(writer, "eb:MessageId", &[], message.message_id().as_str())?;
    end(writer, "eb:MessageInfo")?;

    start(writer, "eb:PartyInfo")?;
    for (container, party) in [("eb:From", &message.from), ("eb:To", &message.to)] {
        start(writer, container)?;
        match &party.id_type {
            Some(id_type) => write_text_element(
                writer,
                "eb:PartyId",
                &[("type", id_type.as_str())],
                &party.id,
            )?,
            None => write_text_element(writer, "eb:PartyId", &[], &party.id)?,
        }
        write_text_element(writer, "eb:Role", &[], &party.role)?;
        end(writer, container)?;
    }
    end(writer, "eb:PartyInfo")?;

    start(writer, "eb:CollaborationInfo")?;
    if let Some(agreement) = &message.collaboration.agreement_ref {
        write_text_element(writer, "eb:AgreementRef", &[], agreement)?;
    }
    match &message.collaboration.service_type {
        Some(service_type) => write_text_element(
            writer,
            "eb:Service",
            &[("type", service_type.as_str())],
            &message.collaboration.service,
        )?,
        None => write_text_element(writer, "eb:Service", &[], &message.collaboration.service)?,
    }
    write_text_element(writer, "eb:Action", &[], &message.collaboration.action)?;
    write_text_element(writer, "eb:ConversationId", &[], &message.conversation_id)?;
    end(writer, "eb:CollaborationInfo")?;

    if !message.properties.is_empty() {
        start(writer, "eb:MessageProperties")?;
        for property in &message.properties {
            write_property(writer, property)?;
        }
        end(writer, "eb:MessageProperties")?;
    }

    if !message.parts.is_empty() {
        start(writer, "eb:PayloadInfo")?;
        for part in &message.parts {
            let mut part_start = BytesStart::new("eb:PartInfo");
            part_start.push_attribute(("href", part.href.as_str()));
            if part.properties.is_empty() {
                writer.write_event(Event::Empty(part_start)).map_err(xml_err)?;
            } else {
                writer.write_event(Event::Start(part_start)).map_err(xml_err)?;
                start(writer, "eb:PartProperties")?;
                for property in &part.properties {
                    write_property(writer, property)?;
                }
                end(writer, "eb:PartProperties")?;
                end(writer, "eb:PartInfo")?;
            }
        }
        end(writer, "eb:PayloadInfo")?;
    }

    end(writer, "eb:UserMessage")
}

fn write_property(
    writer: &mut XmlWriter,
    property: &crate::entities::MessageProperty,
) -> Result<(), MalformedMessage> {
    match &property.prop_type {
        Some(prop_type) => write_text_element(
            writer,
            "eb:Property",
            &[("name", property.name.as_str()), ("type", prop_type.as_str())],
            &property.value,
        ),
        None => write_text_element(
            writer,
            "eb:Property",
            &[("name", property.name.as_str())],
            &property.value,
        ),
    }
}

fn write_signal_message(
    writer: &mut XmlWriter,
    signal: &SignalMessage,
) -> Result<(), MalformedMessage> {
    start(writer, "eb:SignalMessage")?;

    start(writer, "eb:MessageInfo")?;
    write_text_element(writer, "eb:Timestamp", &[], &format_timestamp(&signal.timestamp))?;
    write_text_element(writer, "eb:MessageId", &[], signal.message_id().as_str())?;
    write_text_element(writer, "eb:RefToMessageId", &[], &signal.ref_to_message_id)?;
    end(writer, "eb:MessageInfo")?;

    match &signal.body {
        SignalBody::Receipt(receipt) => {
            if receipt.non_repudiation.is_empty() {
                writer
                    .write_event(Event::Empty(BytesStart::new("eb:Receipt")))
                    .map_err(xml_err)?;
            } else {
                start(writer, "eb:Receipt")?;
                start(writer, "eb:NonRepudiationInformation")?;
                for digest in &receipt.non_repudiation {
                    start(writer, "eb:MessagePartNRInformation")?;
                    let mut reference = BytesStart::new("eb:Reference");
                    reference.push_attribute(("URI", digest.reference.as_str()));
                    writer.write_event(Event::Start(reference)).map_err(xml_err)?;
                    let mut method = BytesStart::new("eb:DigestMethod");
                    method.push_attribute(("Algorithm", digest.algorithm.as_str()));
                    writer.write_event(Event::Empty(method)).map_err(xml_err)?;
                    write_text_element(writer, "eb:DigestValue", &[], &digest.digest_b64)?;
                    end(writer, "eb:Reference")?;
                    end(writer, "eb:MessagePartNRInformation")?;
                }
                end(writer, "eb:NonRepudiationInformation")?;
                end(writer, "eb:Receipt")?;
            }
        }
        SignalBody::Error(errors) => {
            for error in errors {
                let mut element = BytesStart::new("eb:Error");
                element.push_attribute(("errorCode", error.code.code()));
                element.push_attribute(("severity", error.severity.as_str()));
                element.push_attribute(("shortDescription", error.short_description.as_str()));
                if let Some(in_error) = &error.ref_to_message_in_error {
                    element.push_attribute(("refToMessageInError", in_error.as_str()));
                }
                match &error.detail {
                    Some(detail) => {
                        writer.write_event(Event::Start(element)).map_err(xml_err)?;
                        write_text_element(
                            writer,
                            "eb:Description",
                            &[("xml:lang", "en")],
                            detail,
                        )?;
                        end(writer, "eb:Error")?;
                    }
                    None => {
                        writer.write_event(Event::Empty(element)).map_err(xml_err)?;
                    }
                }
            }
        }
    }

    end(writer, "eb:SignalMessage")
}
