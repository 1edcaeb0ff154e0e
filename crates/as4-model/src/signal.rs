//! # Signal Messages
//!
//! Protocol-level responses: Receipt (acknowledgment, optionally with
//! non-repudiation digests) and Error (one or more catalogue errors).
//! A Signal Message always carries its own message id plus a
//! `RefToMessageId` pointing at the message it responds to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MalformedMessage;
use crate::ids::MessageId;

/// Severity of an ebMS error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Processing continued; the condition is informational.
    Warning,
    /// Processing stopped; the message was not delivered.
    Failure,
}

impl Severity {
    /// Wire value of the `severity` attribute.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Failure => "failure",
        }
    }

    /// Parse the wire value (case-insensitive).
    #[must_use]
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "warning" => Some(Severity::Warning),
            "failure" => Some(Severity::Failure),
            _ => None,
        }
    }
}

/// The ebMS3/AS4 error catalogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EbmsErrorCode {
    /// EBMS:0001 - a value could not be resolved against the agreement.
    ValueNotRecognized,
    /// EBMS:0002 - a requested feature is not supported.
    FeatureNotSupported,
    /// EBMS:0003 - a value is inconsistent with the rest of the message.
    ValueInconsistent,
    /// EBMS:0004 - any other processing failure.
    Other,
    /// EBMS:0005 - the connection to the next hop failed.
    ConnectionFailure,
    /// EBMS:0006 - pull request against an empty message partition channel.
    EmptyMessagePartitionChannel,
    /// EBMS:0007 - MIME packaging inconsistency.
    MimeInconsistency,
    /// EBMS:0009 - the ebMS header is invalid or incomplete.
    InvalidHeader,
    /// EBMS:0010 - no processing mode matches the message.
    ProcessingModeMismatch,
    /// EBMS:0011 - an external payload could not be retrieved.
    ExternalPayloadError,
    /// EBMS:0101 - signature verification failed.
    FailedAuthentication,
    /// EBMS:0102 - decryption failed.
    FailedDecryption,
    /// EBMS:0103 - message does not comply with the security policy.
    PolicyNoncompliance,
    /// EBMS:0202 - delivery to the next hop failed after retries.
    DeliveryFailure,
    /// EBMS:0301 - an expected receipt never arrived.
    MissingReceipt,
    /// EBMS:0302 - a receipt was structurally invalid.
    InvalidReceipt,
    /// EBMS:0303 - an attachment could not be decompressed.
    DecompressionFailure,
}

impl EbmsErrorCode {
    /// The `EBMS:NNNN` wire code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            EbmsErrorCode::ValueNotRecognized => "EBMS:0001",
            EbmsErrorCode::FeatureNotSupported => "EBMS:0002",
            EbmsErrorCode::ValueInconsistent => "EBMS:0003",
            EbmsErrorCode::Other => "EBMS:0004",
            EbmsErrorCode::ConnectionFailure => "EBMS:0005",
            EbmsErrorCode::EmptyMessagePartitionChannel => "EBMS:0006",
            EbmsErrorCode::MimeInconsistency => "EBMS:0007",
            EbmsErrorCode::InvalidHeader => "EBMS:0009",
            EbmsErrorCode::ProcessingModeMismatch => "EBMS:0010",
            EbmsErrorCode::ExternalPayloadError => "EBMS:0011",
            EbmsErrorCode::FailedAuthentication => "EBMS:0101",
            EbmsErrorCode::FailedDecryption => "EBMS:0102",
            EbmsErrorCode::PolicyNoncompliance => "EBMS:0103",
            EbmsErrorCode::DeliveryFailure => "EBMS:0202",
            EbmsErrorCode::MissingReceipt => "EBMS:0301",
            EbmsErrorCode::InvalidReceipt => "EBMS:0302",
            EbmsErrorCode::DecompressionFailure => "EBMS:0303",
        }
    }

    /// Default short description for the code.
    #[must_use]
    pub fn short_description(self) -> &'static str {
        match self {
            EbmsErrorCode::ValueNotRecognized => "ValueNotRecognized",
            EbmsErrorCode::FeatureNotSupported => "FeatureNotSupported",
            EbmsErrorCode::ValueInconsistent => "ValueInconsistent",
            EbmsErrorCode::Other => "Other",
            EbmsErrorCode::ConnectionFailure => "ConnectionFailure",
            EbmsErrorCode::EmptyMessagePartitionChannel => "EmptyMessagePartitionChannel",
            EbmsErrorCode::MimeInconsistency => "MimeInconsistency",
            EbmsErrorCode::InvalidHeader => "InvalidHeader",
            EbmsErrorCode::ProcessingModeMismatch => "ProcessingModeMismatch",
            EbmsErrorCode::ExternalPayloadError => "ExternalPayloadError",
            EbmsErrorCode::FailedAuthentication => "FailedAuthentication",
            EbmsErrorCode::FailedDecryption => "FailedDecryption",
            EbmsErrorCode::PolicyNoncompliance => "PolicyNoncompliance",
            EbmsErrorCode::DeliveryFailure => "DeliveryFailure",
            EbmsErrorCode::MissingReceipt => "MissingReceipt",
            EbmsErrorCode::InvalidReceipt => "InvalidReceipt",
            EbmsErrorCode::DecompressionFailure => "DecompressionFailure",
        }
    }

    /// Parse the `EBMS:NNNN` wire code.
    ///
    /// # Errors
    ///
    /// `MalformedMessage::UnknownErrorCode` for codes outside the catalogue.
    pub fn parse(code: &str) -> Result<Self, MalformedMessage> {
        let found = [
            EbmsErrorCode::ValueNotRecognized,
            EbmsErrorCode::FeatureNotSupported,
            EbmsErrorCode::ValueInconsistent,
            EbmsErrorCode::Other,
            EbmsErrorCode::ConnectionFailure,
            EbmsErrorCode::EmptyMessagePartitionChannel,
            EbmsErrorCode::MimeInconsistency,
            EbmsErrorCode::InvalidHeader,
            EbmsErrorCode::ProcessingModeMismatch,
            EbmsErrorCode::ExternalPayloadError,
            EbmsErrorCode::FailedAuthentication,
            EbmsErrorCode::FailedDecryption,
            EbmsErrorCode::PolicyNoncompliance,
            EbmsErrorCode::DeliveryFailure,
            EbmsErrorCode::MissingReceipt,
            EbmsErrorCode::InvalidReceipt,
            EbmsErrorCode::DecompressionFailure,
        ]
        .into_iter()
        .find(|c| c.code() == code);
        found.ok_or_else(|| MalformedMessage::UnknownErrorCode(code.to_owned()))
    }
}

/// One error entry of an Error signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbmsError {
    /// Catalogue code.
    pub code: EbmsErrorCode,
    /// Error severity.
    pub severity: Severity,
    /// Short description attribute.
    pub short_description: String,
    /// Optional long description.
    pub detail: Option<String>,
    /// Optional reference to the message in error.
    pub ref_to_message_in_error: Option<String>,
}

impl EbmsError {
    /// Create a failure-severity error with the catalogue defaults.
    #[must_use]
    pub fn failure(code: EbmsErrorCode) -> Self {
        Self {
            code,
            severity: Severity::Failure,
            short_description: code.short_description().to_owned(),
            detail: None,
            ref_to_message_in_error: None,
        }
    }

    /// Attach a long description.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the id of the message in error.
    #[must_use]
    pub fn in_error(mut self, message_id: impl Into<String>) -> Self {
        self.ref_to_message_in_error = Some(message_id.into());
        self
    }
}

/// Digest reference inside a non-repudiation receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDigest {
    /// URI of the covered part (`#body` or a `cid:` href).
    pub reference: String,
    /// Digest algorithm URI or name.
    pub algorithm: String,
    /// Base64-encoded digest value.
    pub digest_b64: String,
}

/// A Receipt signal body.
///
/// An empty digest list is a simple acknowledgment; a non-empty list
/// carries the non-repudiation digests of the received parts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Digests of the covered parts, in part order.
    pub non_repudiation: Vec<PartDigest>,
}

/// Receipt or Error content of a Signal Message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalBody {
    /// Acknowledgment of successful processing.
    Receipt(Receipt),
    /// One or more processing errors.
    Error(Vec<EbmsError>),
}

/// An ebMS3 Signal Message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    message_id: MessageId,
    /// Signal creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Id of the message this signal responds to.
    pub ref_to_message_id: String,
    /// Receipt or Error content.
    pub body: SignalBody,
}

impl SignalMessage {
    /// Create a Receipt signal for the given message id.
    #[must_use]
    pub fn receipt(ref_to_message_id: impl Into<String>, receipt: Receipt) -> Self {
        Self {
            message_id: MessageId::generate(),
            timestamp: Utc::now(),
            ref_to_message_id: ref_to_message_id.into(),
            body: SignalBody::Receipt(receipt),
        }
    }

    /// Create an Error signal for the given message id.
    #[must_use]
    pub fn error(ref_to_message_id: impl Into<String>, errors: Vec<EbmsError>) -> Self {
        Self {
            message_id: MessageId::generate(),
            timestamp: Utc::now(),
            ref_to_message_id: ref_to_message_id.into(),
            body: SignalBody::Error(errors),
        }
    }

    /// Reassemble a signal parsed from the wire.
    pub(crate) fn from_wire(
        message_id: MessageId,
        timestamp: DateTime<Utc>,
        ref_to_message_id: String,
        body: SignalBody,
    ) -> Self {
        Self {
            message_id,
            timestamp,
            ref_to_message_id,
            body,
        }
    }

    /// The signal's own message id.
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// True when the signal is a Receipt.
    #[must_use]
    pub fn is_receipt(&self) -> bool {
        matches!(self.body, SignalBody::Receipt(_))
    }

    /// The contained errors, empty for receipts.
    #[must_use]
    pub fn errors(&self) -> &[EbmsError] {
        match &self.body {
            SignalBody::Error(errors) => errors,
            SignalBody::Receipt(_) => &[],
        }
    }
}
