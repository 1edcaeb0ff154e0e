//! Named PMode profiles.
//!
//! Communities (e.g. a national e-invoicing network) publish fixed PMode
//! presets. Presets are plain factory functions registered under a name at
//! configuration time; nothing is loaded at runtime.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::model::PMode;

/// Factory producing a preset agreement.
pub type ProfileFactory = fn() -> PMode;

/// Registry of named PMode factories.
#[derive(Default)]
pub struct ProfileRegistry {
    factories: RwLock<HashMap<String, ProfileFactory>>,
}

impl ProfileRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a profile name, replacing any previous
    /// registration with the same name.
    pub fn register(&self, name: impl Into<String>, factory: ProfileFactory) {
        let name = name.into();
        debug!(profile = %name, "registered PMode profile");
        self.factories.write().insert(name, factory);
    }

    /// Build the preset agreement for a profile name.
    #[must_use]
    pub fn build(&self, name: &str) -> Option<PMode> {
        self.factories.read().get(name).map(|factory| factory())
    }

    /// Registered profile names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}
