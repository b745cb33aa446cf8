//! Persistence seam for endorsement histories.

use async_trait::async_trait;
use uuid::Uuid;

use endorse_core::{EndorsementHistory, HistoryKey};

use crate::DbError;

/// Storage for one document per [`HistoryKey`].
///
/// Writes are guarded by the history's `version` token: [`save`] only succeeds
/// when the stored version still equals the version the caller loaded, so a
/// read-modify-write that lost a race fails with
/// [`DbError::VersionConflict`] instead of overwriting the winner.
///
/// # Implementations
///
/// - [`crate::PgHistoryRepository`]: Postgres, periods stored as JSONB
/// - [`crate::MemoryHistoryRepository`]: in-process map, for tests and embedding
///
/// [`save`]: HistoryRepository::save
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Load the history for `key`, creating an empty one named `entity_name`
    /// if none exists. Concurrent callers racing to create the same key all
    /// receive the same document.
    async fn get_or_create(
        &self,
        key: &HistoryKey,
        entity_name: &str,
    ) -> Result<EndorsementHistory, DbError>;

    async fn find(&self, key: &HistoryKey) -> Result<Option<EndorsementHistory>, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<EndorsementHistory>, DbError>;

    /// Upsert the full document. Returns the stored copy with its version
    /// bumped and `updated_at` refreshed.
    async fn save(&self, history: &EndorsementHistory) -> Result<EndorsementHistory, DbError>;

    /// All histories for one user, oldest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EndorsementHistory>, DbError>;

    /// Every history, grouped by user and oldest first within a user.
    async fn list_all(&self) -> Result<Vec<EndorsementHistory>, DbError>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<(), DbError>;
}
