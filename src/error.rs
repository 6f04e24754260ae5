//! Error types for the decision engines.

use crate::grid::LadderMode;

/// Errors raised by the grid and rebalancing engines.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid grid config: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("ladder mode {0} has no generation rule")]
    UnsupportedLadderMode(LadderMode),

    #[error("grid level {0} does not exist")]
    UnknownLevel(i32),

    #[error("grid level {0} is already filled")]
    AlreadyFilled(i32),

    #[error("another evaluation is in flight for this grid")]
    EvaluationInFlight,

    #[error("stale level set: expected version {expected}, found {actual}")]
    StaleVersion { expected: u64, actual: u64 },

    #[error("grid book lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
