use thiserror::Error;

use crate::ledger::verify::ViolationKind;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Canonicalization(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceFailure(format!("Database error: {}", err))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(format!("Configuration error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Concurrent writers raced on the same scope. Retry with a fresh tail.
    #[error("Chain conflict on {scope}: {reason}")]
    ChainConflict { scope: String, reason: String },

    #[error("Integrity violation in {scope} at sequence {sequence}: {kind}")]
    IntegrityViolation {
        scope: String,
        sequence: u64,
        kind: ViolationKind,
    },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Canonicalization error: {0}")]
    Canonicalization(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn chain_conflict(scope: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChainConflict {
            scope: scope.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChainConflict { .. })
    }
}
