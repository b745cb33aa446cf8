use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregation::{sum_closed_periods, Totals};
use crate::clock::to_storage_precision;
use crate::entity::{EntityType, HistoryKey};
use crate::period::{EndorsementPeriod, PositionChange};

/// Everything known about one user's endorsement of one entity.
///
/// The three `total_*` fields are derived: they equal the sum of the closed
/// periods' frozen counts, except after an admin overwrite. The
/// `is_currently_endorsed` / `current_position` / `current_period_start_date`
/// triple mirrors the single open period, if there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementHistory {
    pub id: Uuid,
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub total_days_endorsed: i64,
    pub total_days_in_top5: i64,
    pub total_days_in_top10: i64,
    pub periods: Vec<EndorsementPeriod>,
    pub is_currently_endorsed: bool,
    pub current_position: Option<i32>,
    pub current_period_start_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the repository on every save.
    pub version: i64,
}

impl EndorsementHistory {
    /// A fresh history with zeroed totals and no periods.
    #[must_use]
    pub fn new(key: &HistoryKey, entity_name: &str, now: DateTime<Utc>) -> Self {
        let now = to_storage_precision(now);
        Self {
            id: Uuid::new_v4(),
            user_id: key.user_id.clone(),
            entity_type: key.entity_type,
            entity_id: key.entity_id.clone(),
            entity_name: entity_name.to_string(),
            total_days_endorsed: 0,
            total_days_in_top5: 0,
            total_days_in_top10: 0,
            periods: Vec::new(),
            is_currently_endorsed: false,
            current_position: None,
            current_period_start_date: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> HistoryKey {
        HistoryKey::new(self.user_id.clone(), self.entity_type, self.entity_id.clone())
    }

    #[must_use]
    pub fn totals(&self) -> Totals {
        Totals {
            total_days_endorsed: self.total_days_endorsed,
            total_days_in_top5: self.total_days_in_top5,
            total_days_in_top10: self.total_days_in_top10,
        }
    }

    pub fn set_totals(&mut self, totals: Totals) {
        self.total_days_endorsed = totals.total_days_endorsed;
        self.total_days_in_top5 = totals.total_days_in_top5;
        self.total_days_in_top10 = totals.total_days_in_top10;
    }

    /// Replace the stored totals with the sum over closed periods.
    pub fn recompute_totals(&mut self) {
        self.set_totals(sum_closed_periods(&self.periods));
    }

    #[must_use]
    pub fn active_period(&self) -> Option<&EndorsementPeriod> {
        self.periods.iter().find(|p| p.is_active())
    }

    fn active_index(&self) -> Option<usize> {
        self.periods.iter().position(EndorsementPeriod::is_active)
    }

    /// Append `period` and, if it is open, make it the active period.
    ///
    /// The caller must ensure no other period is open before appending an
    /// open one.
    pub fn push_period(&mut self, period: EndorsementPeriod) {
        if period.is_active() {
            self.is_currently_endorsed = true;
            self.current_position = Some(period.current_position());
            self.current_period_start_date = Some(period.start_date);
        }
        self.periods.push(period);
    }

    /// Record a rank change on the active period. Returns `false` when no
    /// period is open.
    pub fn apply_position_change(&mut self, change: PositionChange) -> bool {
        let Some(idx) = self.active_index() else {
            return false;
        };
        let change = PositionChange::new(change.date, change.position);
        self.periods[idx] = self.periods[idx].clone().with_position_change(change);
        self.current_position = Some(change.position);
        true
    }

    /// Close the active period at `end_date`, then recompute totals from
    /// every closed period. Returns `false` when no period is open.
    pub fn close_active_period(&mut self, end_date: DateTime<Utc>) -> bool {
        let Some(idx) = self.active_index() else {
            return false;
        };
        self.periods[idx] = self.periods[idx].clone().close(end_date);
        self.recompute_totals();
        self.clear_active();
        true
    }

    /// Remove a period by id and recompute totals over what remains.
    pub fn remove_period(&mut self, period_id: Uuid) -> Option<EndorsementPeriod> {
        let idx = self.periods.iter().position(|p| p.id == period_id)?;
        let removed = self.periods.remove(idx);
        if removed.is_active() {
            self.clear_active();
        }
        self.recompute_totals();
        Some(removed)
    }

    fn clear_active(&mut self) {
        self.is_currently_endorsed = false;
        self.current_position = None;
        self.current_period_start_date = None;
    }
}
