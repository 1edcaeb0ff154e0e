//! # MIME Packager
//!
//! Assembles and parses the `multipart/related` package: the SOAP envelope
//! as root part plus one part per attachment, each addressed by content id.
//! Messages without attachments travel as a plain SOAP document instead of
//! a one-part multipart, and the parser accepts both forms.
//!
//! MIME headers that HTTP needs (`Content-Type` with boundary and type
//! parameters, `MIME-Version`) are exposed for the transport layer rather
//! than embedded in the body.

pub mod errors;
pub mod package;
pub mod unpack;

pub use errors::MalformedMime;
pub use package::{MimeBodyPart, MimePackage};
pub use unpack::unpack;
