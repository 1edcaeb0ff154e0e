//! # Send Engine
//!
//! Outbound half of the exchange: compresses attachments per the
//! agreement, builds the envelope, runs the security pipeline, packs the
//! MIME body and POSTs it to the responder, interpreting the response:
//!
//! - 2xx with a signal body: parsed and returned immediately
//! - 2xx empty: the exchange is asynchronous, the caller correlates the
//!   later signal by `RefToMessageId`
//! - network failure / 5xx: retried per the agreement's reliability
//!   settings with a cancellable wait
//! - 4xx: the peer deterministically refused; surfaced at once, never
//!   retried
//!
//! The message id is generated once and reused across retries so the
//! receiver can deduplicate even when an acknowledgment was lost.

pub mod delivery;
pub mod engine;
pub mod errors;
pub mod transport;

pub use delivery::{DeliveryRecord, DeliveryState, DeliveryStore};
pub use engine::{OutboundRequest, SendEngine, SendOutcome, SignalConsumer};
pub use errors::SendError;
pub use transport::{HttpTransport, HttpResponse, MessageTransport, TransportError};
