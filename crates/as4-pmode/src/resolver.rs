//! PMode resolution.
//!
//! Both the send and the receive path locate the applicable agreement by
//! the same criteria: the two party ids plus service and action. Storage
//! is behind the [`PModeStore`] trait so file- or database-backed
//! providers can plug in; the in-memory registry is the engine default
//! and the reference implementation.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use as4_model::UserMessage;

use crate::errors::ConfigError;
use crate::model::PMode;

/// Lookup key for PMode resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveCriteria {
    /// Sending party id.
    pub from_party: String,
    /// Receiving party id.
    pub to_party: String,
    /// Service of the message.
    pub service: String,
    /// Action of the message.
    pub action: String,
}

impl ResolveCriteria {
    /// Criteria for an in-memory User Message.
    #[must_use]
    pub fn for_message(message: &UserMessage) -> Self {
        Self {
            from_party: message.from.id.clone(),
            to_party: message.to.id.clone(),
            service: message.collaboration.service.clone(),
            action: message.collaboration.action.clone(),
        }
    }
}

impl std::fmt::Display for ResolveCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}->{} {}/{}",
            self.from_party, self.to_party, self.service, self.action
        )
    }
}

/// Read side of a PMode provider.
pub trait PModeResolver: Send + Sync {
    /// Locate the agreement applicable to the criteria.
    fn resolve(&self, criteria: &ResolveCriteria) -> Option<PMode>;
}

/// Write side of a PMode provider.
pub trait PModeStore: PModeResolver {
    /// Validate and store an agreement, replacing any previous one with
    /// the same id.
    ///
    /// # Errors
    ///
    /// Propagates [`PMode::validate`] failures; invalid agreements are
    /// never stored.
    fn store(&self, pmode: PMode) -> Result<(), ConfigError>;
}

/// In-memory PMode registry.
#[derive(Default)]
pub struct InMemoryPModeRegistry {
    by_id: RwLock<HashMap<String, PMode>>,
}

impl InMemoryPModeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored agreements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    /// True when no agreement is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.read().is_empty()
    }

    /// Fetch an agreement by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<PMode> {
        self.by_id.read().get(id).cloned()
    }

    fn matches(pmode: &PMode, criteria: &ResolveCriteria) -> bool {
        pmode.initiator.id == criteria.from_party
            && pmode.responder.id == criteria.to_party
            && pmode
                .service
                .as_ref()
                .is_none_or(|service| service == &criteria.service)
            && pmode
                .action
                .as_ref()
                .is_none_or(|action| action == &criteria.action)
    }
}

impl PModeResolver for InMemoryPModeRegistry {
    fn resolve(&self, criteria: &ResolveCriteria) -> Option<PMode> {
        let guard = self.by_id.read();
        // Prefer agreements pinned to the exact service/action over
        // wildcard matches.
        let mut wildcard: Option<&PMode> = None;
        for pmode in guard.values() {
            if !Self::matches(pmode, criteria) {
                continue;
            }
            if pmode.service.is_some() && pmode.action.is_some() {
                debug!(pmode = %pmode.id, %criteria, "resolved pinned PMode");
                return Some(pmode.clone());
            }
            wildcard.get_or_insert(pmode);
        }
        let found = wildcard.cloned();
        if let Some(pmode) = &found {
            debug!(pmode = %pmode.id, %criteria, "resolved wildcard PMode");
        }
        found
    }
}

impl PModeStore for InMemoryPModeRegistry {
    fn store(&self, pmode: PMode) -> Result<(), ConfigError> {
        pmode.validate()?;
        debug!(pmode = %pmode.id, "stored PMode");
        self.by_id.write().insert(pmode.id.clone(), pmode);
        Ok(())
    }
}
