//! Endorsement periods: contiguous intervals during which a user endorses an
//! entity, with the rank changes recorded inside them.
//!
//! Periods are value types. Tracking code never edits one in place; it builds
//! the next state with [`EndorsementPeriod::with_position_change`] or
//! [`EndorsementPeriod::close`] and swaps it into the owning history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregation::{compute_period_days, PeriodDays};
use crate::clock::to_storage_precision;
use crate::CoreError;

/// A rank observed at a point in time. Immutable once appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChange {
    pub date: DateTime<Utc>,
    pub position: i32,
}

impl PositionChange {
    #[must_use]
    pub fn new(date: DateTime<Utc>, position: i32) -> Self {
        Self {
            date: to_storage_precision(date),
            position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementPeriod {
    pub id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub start_position: i32,
    #[serde(default)]
    pub position_history: Vec<PositionChange>,
    /// Frozen at close; zero while the period is open.
    #[serde(default)]
    pub days_in_period: i64,
    #[serde(default)]
    pub days_in_top5: i64,
    #[serde(default)]
    pub days_in_top10: i64,
}

impl EndorsementPeriod {
    /// A new open period with no recorded rank changes.
    #[must_use]
    pub fn open(start_date: DateTime<Utc>, start_position: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_date: to_storage_precision(start_date),
            end_date: None,
            start_position,
            position_history: Vec::new(),
            days_in_period: 0,
            days_in_top5: 0,
            days_in_top10: 0,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }

    /// Rank currently in effect: the last recorded change, or the start rank.
    #[must_use]
    pub fn current_position(&self) -> i32 {
        self.position_history
            .last()
            .map_or(self.start_position, |c| c.position)
    }

    /// Date of the latest event in the period (start or last rank change).
    #[must_use]
    pub fn last_event_date(&self) -> DateTime<Utc> {
        self.position_history
            .last()
            .map_or(self.start_date, |c| c.date)
    }

    /// Append a rank change. Callers are responsible for non-decreasing dates.
    #[must_use]
    pub fn with_position_change(mut self, change: PositionChange) -> Self {
        self.position_history
            .push(PositionChange::new(change.date, change.position));
        self
    }

    /// Close the period at `end_date` and freeze its day counts.
    #[must_use]
    pub fn close(mut self, end_date: DateTime<Utc>) -> Self {
        let end_date = to_storage_precision(end_date);
        self.end_date = Some(end_date);
        let days = compute_period_days(&self, end_date);
        self.days_in_period = days.days_in_period;
        self.days_in_top5 = days.days_in_top5;
        self.days_in_top10 = days.days_in_top10;
        self
    }

    /// Stored day counts. Only meaningful once the period is closed.
    #[must_use]
    pub fn frozen_days(&self) -> PeriodDays {
        PeriodDays {
            days_in_period: self.days_in_period,
            days_in_top5: self.days_in_top5,
            days_in_top10: self.days_in_top10,
        }
    }

    #[must_use]
    pub fn position_history_is_sorted(&self) -> bool {
        self.position_history
            .windows(2)
            .all(|pair| pair[0].date <= pair[1].date)
    }
}

/// Reject ranks below 1.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPosition`] for zero or negative positions.
pub fn validate_position(position: i32) -> Result<i32, CoreError> {
    if position >= 1 {
        Ok(position)
    } else {
        Err(CoreError::InvalidPosition(position))
    }
}
