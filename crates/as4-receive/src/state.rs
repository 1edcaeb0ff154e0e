//! Pipeline states and the HTTP response they produce.

/// Stages of the inbound state machine, in processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReceiveState {
    /// Raw bytes accepted from the transport.
    Received,
    /// MIME parsed into envelope and attachments.
    Unpacked,
    /// Encrypted content restored to plaintext.
    Decrypted,
    /// Signature verified over the restored content.
    Verified,
    /// An agreement was resolved and its policy holds.
    PmodeMatched,
    /// Duplicate elimination passed (first delivery).
    DuplicateChecked,
    /// The business consumer accepted the message.
    Dispatched,
    /// Terminal: a Receipt went out.
    ReceiptSent,
    /// Terminal: an Error signal went out.
    ErrorSent,
}

impl ReceiveState {
    /// Stage name for logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ReceiveState::Received => "received",
            ReceiveState::Unpacked => "unpacked",
            ReceiveState::Decrypted => "decrypted",
            ReceiveState::Verified => "verified",
            ReceiveState::PmodeMatched => "pmode-matched",
            ReceiveState::DuplicateChecked => "duplicate-checked",
            ReceiveState::Dispatched => "dispatched",
            ReceiveState::ReceiptSent => "receipt-sent",
            ReceiveState::ErrorSent => "error-sent",
        }
    }
}

/// The HTTP response the pipeline hands back to the transport layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` of the response body (empty for empty bodies).
    pub content_type: String,
    /// Serialized signal envelope, or empty for accepted-async responses.
    pub body: Vec<u8>,
    /// The state the pipeline terminated in.
    pub state: ReceiveState,
}

impl InboundResponse {
    /// An empty-bodied acceptance (asynchronous completion).
    #[must_use]
    pub fn accepted(state: ReceiveState) -> Self {
        Self {
            status: 202,
            content_type: String::new(),
            body: Vec::new(),
            state,
        }
    }
}
