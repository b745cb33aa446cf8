use thiserror::Error;
use uuid::Uuid;

use endorse_core::{CoreError, IntegrityReport};
use endorse_db::DbError;

/// Errors returned by the history services.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Caller input was rejected: bad dates, bad ranks, conflicting state.
    #[error("validation error: {0}")]
    Validation(String),

    /// A read or admin operation referenced a history or period that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another writer saved the same history first. Retry the whole operation.
    #[error("history {history_id} was modified concurrently; retry the operation")]
    Concurrency { history_id: Uuid },

    /// Underlying storage failed.
    #[error("storage error: {0}")]
    Persistence(#[source] DbError),

    /// Stored totals or active-period fields disagree with the periods.
    #[error(transparent)]
    Integrity(#[from] IntegrityReport),
}

impl HistoryError {
    /// `true` when repeating the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            HistoryError::Concurrency { .. } => true,
            HistoryError::Persistence(e) => e.is_transient(),
            HistoryError::Validation(_)
            | HistoryError::NotFound(_)
            | HistoryError::Integrity(_) => false,
        }
    }
}

impl From<DbError> for HistoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::VersionConflict { id, .. } => HistoryError::Concurrency { history_id: id },
            DbError::NotFound => HistoryError::NotFound("record".to_string()),
            other => HistoryError::Persistence(other),
        }
    }
}

impl From<CoreError> for HistoryError {
    fn from(err: CoreError) -> Self {
        HistoryError::Validation(err.to_string())
    }
}
