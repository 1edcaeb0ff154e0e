//! PMode configuration errors.

use thiserror::Error;

/// Errors raised while validating or storing a PMode.
///
/// Configuration errors are fatal for the message they affect: they reject
/// the exchange before any network I/O happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The PMode has no legs at all.
    #[error("PMode {0} defines no legs")]
    NoLegs(String),

    /// The leg count contradicts the MEP.
    #[error("PMode {pmode}: MEP {mep} requires {expected} leg(s), found {actual}")]
    LegCountMismatch {
        pmode: String,
        mep: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A leg demands signing but no signing key alias is configured.
    #[error("PMode {pmode} leg {leg}: signing required but no signing key alias")]
    MissingSigningAlias { pmode: String, leg: usize },

    /// A leg demands encryption but no encryption key alias is configured.
    #[error("PMode {pmode} leg {leg}: encryption required but no encryption key alias")]
    MissingEncryptionAlias { pmode: String, leg: usize },

    /// Retries are configured with a zero interval.
    #[error("PMode {pmode}: {retries} retries configured with zero interval")]
    DegenerateRetry { pmode: String, retries: u32 },

    /// The send path needs an endpoint address but none is configured.
    #[error("PMode {0} has no responder address")]
    MissingResponderAddress(String),

    /// The PMode id is blank.
    #[error("PMode id must not be empty")]
    EmptyId,

    /// The MEP binding is not supported by this channel.
    #[error("PMode {pmode}: MEP binding {binding} is not supported")]
    UnsupportedBinding { pmode: String, binding: &'static str },

    /// No PMode matches the resolution criteria.
    #[error("No PMode matches {0}")]
    NotFound(String),
}
