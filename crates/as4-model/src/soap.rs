//! SOAP version selection.
//!
//! AS4 peers exchange messages over either SOAP 1.1 or SOAP 1.2; the
//! version decides the envelope namespace and the MIME type of the root
//! part of the multipart package.

use serde::{Deserialize, Serialize};

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.2 envelope namespace.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// The SOAP version a message is packaged with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (`text/xml` root part).
    Soap11,
    /// SOAP 1.2 (`application/soap+xml` root part).
    #[default]
    Soap12,
}

impl SoapVersion {
    /// Both supported versions, for parametrized tests.
    pub const ALL: [SoapVersion; 2] = [SoapVersion::Soap11, SoapVersion::Soap12];

    /// MIME type of the SOAP envelope part.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "text/xml",
            SoapVersion::Soap12 => "application/soap+xml",
        }
    }

    /// Envelope namespace URI.
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP_11_NS,
            SoapVersion::Soap12 => SOAP_12_NS,
        }
    }

    /// Value of the `mustUnderstand` attribute on the `Messaging` header.
    /// SOAP 1.1 uses `1`, SOAP 1.2 uses `true`.
    #[must_use]
    pub fn must_understand(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "1",
            SoapVersion::Soap12 => "true",
        }
    }

    /// Resolve a version from an envelope namespace URI.
    #[must_use]
    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            SOAP_11_NS => Some(SoapVersion::Soap11),
            SOAP_12_NS => Some(SoapVersion::Soap12),
            _ => None,
        }
    }
}
