//! Structural message errors.

use thiserror::Error;

/// Errors raised while building or parsing ebMS3 messages.
///
/// On the receive path these are recoverable: the pipeline converts them
/// into an ebMS Error signal so the sending peer gets a deterministic
/// response instead of a dropped connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedMessage {
    /// A mandatory element of the ebMS3 schema is missing.
    #[error("Missing mandatory element: {0}")]
    MissingElement(&'static str),

    /// A mandatory value is present but blank.
    #[error("Empty value for {0}")]
    EmptyValue(&'static str),

    /// A part reference does not use the `cid:` scheme.
    #[error("Part reference is not a cid href: {href}")]
    InvalidPartReference { href: String },

    /// A part reference has no matching attachment content id.
    #[error("Part reference {href} does not match any attachment")]
    DanglingPartReference { href: String },

    /// The document is not well-formed XML.
    #[error("Invalid XML: {0}")]
    Xml(String),

    /// The root element is not a SOAP envelope.
    #[error("Unexpected root element: {0}")]
    UnexpectedRoot(String),

    /// The envelope namespace is neither SOAP 1.1 nor SOAP 1.2.
    #[error("Unsupported SOAP namespace on envelope")]
    UnsupportedSoapNamespace,

    /// The `Messaging` header block is absent.
    #[error("Missing eb:Messaging header")]
    MissingMessaging,

    /// An error code on the wire is not part of the ebMS catalogue.
    #[error("Unknown ebMS error code: {0}")]
    UnknownErrorCode(String),

    /// A timestamp could not be parsed as ISO 8601.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
