//! # Delivery Records
//!
//! Per-message send bookkeeping: attempt count, last HTTP status or
//! error, terminal state. A record is created on the first attempt,
//! updated on every retry and completed when a Receipt correlates or the
//! retries are exhausted. Lookup-and-update is atomic per message id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Lifecycle state of one outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    /// Sent (or sending), no signal correlated yet.
    AwaitingReceipt,
    /// A Receipt correlated; delivery proven.
    Acknowledged,
    /// Retries exhausted or an Error signal correlated.
    Failed,
    /// The peer refused with a 4xx; never retried.
    Rejected,
}

/// Bookkeeping for one outbound message.
#[derive(Clone, Debug)]
pub struct DeliveryRecord {
    /// The message id shared by all attempts.
    pub message_id: String,
    /// When the first attempt was made.
    pub first_attempt: DateTime<Utc>,
    /// Number of attempts so far.
    pub attempts: u32,
    /// Status of the last HTTP response, when one arrived.
    pub last_status: Option<u16>,
    /// Last transport error, when the attempt never got a response.
    pub last_error: Option<String>,
    /// Current state.
    pub state: DeliveryState,
}

/// Concurrent store of delivery records, keyed by message id.
#[derive(Default)]
pub struct DeliveryStore {
    records: DashMap<String, DeliveryRecord>,
}

impl DeliveryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt (creating the record on the first).
    pub fn record_attempt(
        &self,
        message_id: &str,
        status: Option<u16>,
        error: Option<String>,
    ) {
        self.records
            .entry(message_id.to_owned())
            .and_modify(|record| {
                record.attempts += 1;
                record.last_status = status;
                record.last_error.clone_from(&error);
            })
            .or_insert_with(|| DeliveryRecord {
                message_id: message_id.to_owned(),
                first_attempt: Utc::now(),
                attempts: 1,
                last_status: status,
                last_error: error,
                state: DeliveryState::AwaitingReceipt,
            });
    }

    /// Move a record into a terminal state.
    pub fn complete(&self, message_id: &str, state: DeliveryState) {
        if let Some(mut record) = self.records.get_mut(message_id) {
            record.state = state;
        }
    }

    /// Snapshot of a record.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<DeliveryRecord> {
        self.records.get(message_id).map(|r| r.clone())
    }

    /// Number of tracked messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop terminal records older than the retention window.
    pub fn prune(&self, retention: chrono::Duration) {
        let cutoff = Utc::now() - retention;
        self.records.retain(|_, record| {
            record.state == DeliveryState::AwaitingReceipt || record.first_attempt > cutoff
        });
    }
}
