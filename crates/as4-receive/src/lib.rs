//! # Receive Pipeline
//!
//! Per-request state machine for inbound messages:
//!
//! ```text
//! Received -> Unpacked -> Decrypted -> Verified -> PmodeMatched
//!          -> DuplicateChecked -> Dispatched -> ReceiptSent | ErrorSent
//! ```
//!
//! Every stage can short-circuit into error-signal generation with the
//! appropriate ebMS code; any failure discovered after MIME unpacking
//! produces a well-formed Error signal on the HTTP response, never an
//! aborted connection, because the sending peer decides whether to retry
//! based on that response.
//!
//! Duplicate elimination is an atomic claim on the message id: concurrent
//! deliveries of the same id dispatch to the business consumer at most
//! once, and a replayed id gets the byte-identical cached response.

pub mod duplicate;
pub mod pipeline;
pub mod ports;
pub mod state;

pub use duplicate::{ClaimOutcome, DuplicateStore};
pub use pipeline::ReceivePipeline;
pub use ports::{BusinessConsumer, Disposition, InboundSignalHandler};
pub use state::{InboundResponse, ReceiveState};
