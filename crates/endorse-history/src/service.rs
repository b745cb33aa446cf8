use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use endorse_core::{
    compute_cumulative_snapshot, Clock, CumulativeSnapshot, EndorsementHistory, EntityType,
    HistoryKey,
};
use endorse_db::HistoryRepository;

use crate::admin::AdminCorrectionService;
use crate::error::HistoryError;
use crate::ledger::Ledger;
use crate::position::PositionTracker;
use crate::retry::RetryPolicy;
use crate::tracker::PeriodTracker;

/// One entry of a reordered endorsement list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReorderEntry {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub position: i32,
}

/// Entry point for everything that reads or writes endorsement histories.
///
/// Cheap to clone; clones share the repository, clock and lock table.
#[derive(Clone)]
pub struct HistoryService {
    ledger: Arc<Ledger>,
    periods: PeriodTracker,
    positions: PositionTracker,
    admin: AdminCorrectionService,
}

impl HistoryService {
    #[must_use]
    pub fn new(
        repo: Arc<dyn HistoryRepository>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(repo, clock, retry));
        Self {
            periods: PeriodTracker::new(Arc::clone(&ledger)),
            positions: PositionTracker::new(Arc::clone(&ledger)),
            admin: AdminCorrectionService::new(Arc::clone(&ledger)),
            ledger,
        }
    }

    #[must_use]
    pub fn periods(&self) -> &PeriodTracker {
        &self.periods
    }

    #[must_use]
    pub fn positions(&self) -> &PositionTracker {
        &self.positions
    }

    #[must_use]
    pub fn admin(&self) -> &AdminCorrectionService {
        &self.admin
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.ledger.now()
    }

    /// See [`PeriodTracker::start_period`].
    ///
    /// # Errors
    ///
    /// Propagates validation, concurrency and storage errors.
    pub async fn start_period(
        &self,
        key: &HistoryKey,
        entity_name: &str,
        position: i32,
        start_date: Option<DateTime<Utc>>,
    ) -> Result<EndorsementHistory, HistoryError> {
        self.periods
            .start_period(key, entity_name, position, start_date)
            .await
    }

    /// See [`PeriodTracker::end_period`].
    ///
    /// # Errors
    ///
    /// Propagates validation, concurrency and storage errors.
    pub async fn end_period(
        &self,
        key: &HistoryKey,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Option<EndorsementHistory>, HistoryError> {
        self.periods.end_period(key, end_date).await
    }

    /// Record a rank change dated now.
    ///
    /// # Errors
    ///
    /// Propagates validation, concurrency and storage errors.
    pub async fn update_current_position(
        &self,
        key: &HistoryKey,
        new_position: i32,
    ) -> Result<Option<EndorsementHistory>, HistoryError> {
        self.positions
            .record_position_change(key, new_position, None)
            .await
    }

    /// # Errors
    ///
    /// [`HistoryError::NotFound`] when the key has never been endorsed.
    pub async fn get_history(&self, key: &HistoryKey) -> Result<EndorsementHistory, HistoryError> {
        self.ledger
            .find(key)
            .await?
            .ok_or_else(|| HistoryError::NotFound(format!("endorsement history {key}")))
    }

    /// Stored totals plus live day counts for the open period, as of now.
    ///
    /// # Errors
    ///
    /// [`HistoryError::NotFound`] when the key has never been endorsed.
    pub async fn get_cumulative_days(
        &self,
        key: &HistoryKey,
    ) -> Result<CumulativeSnapshot, HistoryError> {
        let history = self.get_history(key).await?;
        Ok(compute_cumulative_snapshot(&history, self.ledger.now()))
    }

    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn get_user_endorsement_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<EndorsementHistory>, HistoryError> {
        self.ledger.list_for_user(user_id).await
    }

    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn get_all_endorsement_history(
        &self,
    ) -> Result<Vec<EndorsementHistory>, HistoryError> {
        self.ledger.list_all().await
    }

    /// Apply the ranks from a reordered list.
    ///
    /// Tracking is a side effect of the reorder itself, so failures are logged
    /// and skipped rather than returned. Returns the number of entries that
    /// did not fail; entries without an open period count as no-ops.
    pub async fn record_reorder(&self, user_id: &str, entries: &[ReorderEntry]) -> usize {
        let mut applied = 0;
        for entry in entries {
            let key = HistoryKey::new(user_id, entry.entity_type, entry.entity_id.clone());
            match self.update_current_position(&key, entry.position).await {
                Ok(_) => applied += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        entity_type = %entry.entity_type,
                        entity_id = %entry.entity_id,
                        position = entry.position,
                        error = %e,
                        "failed to record reorder position change"
                    );
                }
            }
        }
        applied
    }

    /// # Errors
    ///
    /// Returns the storage error when the repository is unreachable.
    pub async fn ping(&self) -> Result<(), HistoryError> {
        self.ledger.ping().await
    }
}
