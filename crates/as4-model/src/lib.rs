//! # ebMS3 Message Model
//!
//! Core domain types for the AS4 message exchange engine: User Messages,
//! Signal Messages (Receipt/Error), the ebMS error catalogue, and the
//! SOAP 1.1/1.2 envelope codec for the `eb:Messaging` header block.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: all cross-crate message types live here.
//! - **Immutable identity**: a message id is assigned once (generated when
//!   absent) and never changes afterwards.
//! - **Schema order**: the XML writer emits child elements in the order the
//!   ebMS3 schema fixes; the parser validates mandatory elements and reports
//!   `MalformedMessage` instead of panicking on hostile input.

pub mod compression;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod parse;
pub mod ports;
pub mod signal;
pub mod soap;

pub use compression::CompressionMode;
pub use entities::{
    CollaborationInfo, MessageProperty, PartInfo, PartProperty, Party, UserMessage,
    UserMessageConfig,
};
pub use envelope::{MessagingContent, SoapEnvelope};
pub use errors::MalformedMessage;
pub use ids::{new_content_id, strip_cid, MessageId, PREFIX_CID};
pub use ports::{DumpDirection, DumpSink};
pub use signal::{EbmsError, EbmsErrorCode, PartDigest, Receipt, Severity, SignalBody, SignalMessage};
pub use soap::SoapVersion;
