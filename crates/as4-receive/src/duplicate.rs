//! # Duplicate Store
//!
//! Exactly-once dispatch over at-least-once HTTP delivery. The store maps
//! message ids to their processing state and, once terminal, the cached
//! serialized response, so a redelivered id gets the byte-identical
//! answer without touching the business consumer again.
//!
//! Claiming is one atomic lookup-and-insert: two concurrent deliveries of
//! the same id cannot both win. Entries expire after a bounded retention
//! window sized to the longest plausible retry period; expiry is policy,
//! not correctness, and the sweep piggybacks on writes.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::state::InboundResponse;

/// Result of claiming a message id for processing.
#[derive(Clone, Debug)]
pub enum ClaimOutcome {
    /// First delivery; the caller proceeds to dispatch.
    FirstDelivery,
    /// Another delivery of this id is being processed right now.
    AlreadyInFlight,
    /// This id finished processing; replay the cached response.
    AlreadyProcessed(InboundResponse),
}

enum EntryState {
    InFlight,
    Processed(InboundResponse),
}

struct Entry {
    state: EntryState,
    first_seen: Instant,
}

/// Concurrent message-id store with bounded retention.
pub struct DuplicateStore {
    entries: DashMap<String, Entry>,
    retention: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl DuplicateStore {
    /// Default retention window.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

    /// Store with the default retention window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(Self::DEFAULT_RETENTION)
    }

    /// Store with a custom retention window.
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
            sweep_interval: retention / 10,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Atomically claim a message id for processing.
    pub fn claim(&self, message_id: &str) -> ClaimOutcome {
        self.sweep_if_due();
        match self.entries.entry(message_id.to_owned()) {
            MapEntry::Occupied(occupied) => match &occupied.get().state {
                EntryState::InFlight => ClaimOutcome::AlreadyInFlight,
                EntryState::Processed(response) => {
                    debug!(message_id, "duplicate delivery, replaying cached response");
                    ClaimOutcome::AlreadyProcessed(response.clone())
                }
            },
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    state: EntryState::InFlight,
                    first_seen: Instant::now(),
                });
                ClaimOutcome::FirstDelivery
            }
        }
    }

    /// Record the terminal response for a claimed id.
    pub fn complete(&self, message_id: &str, response: InboundResponse) {
        if let Some(mut entry) = self.entries.get_mut(message_id) {
            entry.state = EntryState::Processed(response);
        }
    }

    /// Drop an in-flight claim without caching a response (the message
    /// may be redelivered and processed afresh).
    pub fn release(&self, message_id: &str) {
        self.entries
            .remove_if(message_id, |_, entry| matches!(entry.state, EntryState::InFlight));
    }

    /// Number of tracked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep_if_due(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_sweep.lock();
            if now.duration_since(*last) < self.sweep_interval {
                return;
            }
            *last = now;
        }
        let retention = self.retention;
        self.entries
            .retain(|_, entry| now.duration_since(entry.first_seen) < retention);
    }
}

impl Default for DuplicateStore {
    fn default() -> Self {
        Self::new()
    }
}
