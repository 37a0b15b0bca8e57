use thiserror::Error;

use crate::state_machine::EntityKind;

/// Errors surfaced synchronously to callers of the tracking core.
///
/// Replication failures live in [`MirrorError`](crate::mirror::MirrorError)
/// and never reach a transition caller.
#[derive(Debug, Error)]
pub enum LintasError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{kind} {id} no longer has status {expected}")]
    Conflict {
        kind: EntityKind,
        id: i64,
        expected: String,
    },

    #[error("{kind} {id} is being changed by another request; try again")]
    Contended { kind: EntityKind, id: i64 },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl LintasError {
    /// True for errors the caller can fix by changing the request.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LintasError::InvalidTransition { .. }
                | LintasError::Conflict { .. }
                | LintasError::Contended { .. }
                | LintasError::NotFound { .. }
        )
    }
}

pub type Result<T, E = LintasError> = std::result::Result<T, E>;
