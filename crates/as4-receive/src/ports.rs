//! Ports toward the host application.

use async_trait::async_trait;

use as4_attachment::Attachment;
use as4_model::{SignalMessage, UserMessage};

/// Business-level verdict on a delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; a Receipt goes back.
    Ack,
    /// Refused; an Error signal with the reason goes back.
    Nack(String),
}

/// The business consumer behind the receive pipeline.
///
/// Invoked after security and agreement validation with the decoded
/// message, the decompressed attachments and the body payload when the
/// business document travelled in the SOAP body. Ownership of the
/// attachments transfers to the consumer.
#[async_trait]
pub trait BusinessConsumer: Send + Sync {
    /// Handle one validated User Message.
    async fn on_user_message(
        &self,
        message: UserMessage,
        body_payload: Option<String>,
        attachments: Vec<Attachment>,
    ) -> Disposition;
}

/// Handler for Signal Messages arriving on this endpoint (asynchronous
/// Receipts/Errors for messages this endpoint sent earlier). Typically
/// wired to the send engine's correlation.
pub trait InboundSignalHandler: Send + Sync {
    /// Handle one inbound signal.
    fn on_signal(&self, signal: SignalMessage);
}
