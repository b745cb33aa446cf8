//! Day-count aggregation over endorsement periods.
//!
//! Everything here is pure: no I/O and no clock access. The same functions
//! freeze a period's counts when it closes and project live counts for an
//! open period at read time.
//!
//! Day counts are elapsed time, not calendar days: `ceil(Δms / 86_400_000)`.
//! A thirty-minute interval spanning midnight counts as one day, and
//! daylight-saving transitions are not accounted for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::history::EndorsementHistory;
use crate::period::EndorsementPeriod;

pub const MS_PER_DAY: i64 = 86_400_000;

/// Ranks at or above these thresholds count toward the top-N buckets.
const TOP5_RANK: i32 = 5;
const TOP10_RANK: i32 = 10;

/// Day counts for a single period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDays {
    pub days_in_period: i64,
    pub days_in_top5: i64,
    pub days_in_top10: i64,
}

impl PeriodDays {
    /// The top-5 and top-10 buckets are independent: rank 3 counts toward both.
    fn accumulate_rank(&mut self, position: i32, days: i64) {
        if position <= TOP5_RANK {
            self.days_in_top5 += days;
        }
        if position <= TOP10_RANK {
            self.days_in_top10 += days;
        }
    }
}

/// Cumulative totals stored on a history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total_days_endorsed: i64,
    pub total_days_in_top5: i64,
    pub total_days_in_top10: i64,
}

impl Totals {
    fn add(&mut self, days: PeriodDays) {
        self.total_days_endorsed += days.days_in_period;
        self.total_days_in_top5 += days.days_in_top5;
        self.total_days_in_top10 += days.days_in_top10;
    }
}

/// Read-time view of a history: stored totals plus the live open period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeSnapshot {
    pub total_days_endorsed: i64,
    pub total_days_in_top5: i64,
    pub total_days_in_top10: i64,
    pub is_currently_endorsed: bool,
    pub current_position: Option<i32>,
}

/// Whole days between two instants, rounded up.
#[must_use]
pub fn compute_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let elapsed_ms = end.signed_duration_since(start).num_milliseconds();
    -(-elapsed_ms).div_euclid(MS_PER_DAY)
}

/// Day counts for `period` evaluated at `as_of`.
///
/// A closed period is always evaluated at its own end date. Rank changes are
/// walked in date order starting from the period's start rank; each segment
/// is rounded up independently.
#[must_use]
pub fn compute_period_days(period: &EndorsementPeriod, as_of: DateTime<Utc>) -> PeriodDays {
    let as_of = period.end_date.unwrap_or(as_of);

    let mut changes = period.position_history.clone();
    changes.sort_by_key(|c| c.date);

    let mut days = PeriodDays {
        days_in_period: compute_days(period.start_date, as_of),
        ..PeriodDays::default()
    };

    let mut current_date = period.start_date;
    let mut current_position = period.start_position;
    for change in &changes {
        days.accumulate_rank(current_position, compute_days(current_date, change.date));
        current_date = change.date;
        current_position = change.position;
    }
    days.accumulate_rank(current_position, compute_days(current_date, as_of));

    days
}

/// Sum the frozen counts of every closed period. Open periods contribute nothing.
#[must_use]
pub fn sum_closed_periods(periods: &[EndorsementPeriod]) -> Totals {
    let mut totals = Totals::default();
    for period in periods.iter().filter(|p| !p.is_active()) {
        totals.add(period.frozen_days());
    }
    totals
}

/// Stored totals plus live counts for the open period, if any. Never persisted.
#[must_use]
pub fn compute_cumulative_snapshot(
    history: &EndorsementHistory,
    as_of: DateTime<Utc>,
) -> CumulativeSnapshot {
    let mut totals = history.totals();
    if let Some(active) = history.active_period() {
        totals.add(compute_period_days(active, as_of));
    }

    CumulativeSnapshot {
        total_days_endorsed: totals.total_days_endorsed,
        total_days_in_top5: totals.total_days_in_top5,
        total_days_in_top10: totals.total_days_in_top10,
        is_currently_endorsed: history.is_currently_endorsed,
        current_position: history.current_position,
    }
}

/// One way a history disagrees with its own periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    TotalMismatch {
        field: &'static str,
        stored: i64,
        derived: i64,
    },
    MultipleOpenPeriods {
        count: usize,
    },
    ActiveFlagMismatch {
        flag: bool,
        open_periods: usize,
    },
    CurrentPositionMismatch {
        stored: Option<i32>,
        derived: Option<i32>,
    },
    CurrentStartDateMismatch {
        stored: Option<DateTime<Utc>>,
        derived: Option<DateTime<Utc>>,
    },
    UnsortedPositionHistory {
        period_id: Uuid,
    },
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityViolation::TotalMismatch {
                field,
                stored,
                derived,
            } => write!(f, "{field}: stored {stored}, periods sum to {derived}"),
            IntegrityViolation::MultipleOpenPeriods { count } => {
                write!(f, "{count} periods are open")
            }
            IntegrityViolation::ActiveFlagMismatch { flag, open_periods } => write!(
                f,
                "is_currently_endorsed is {flag} with {open_periods} open period(s)"
            ),
            IntegrityViolation::CurrentPositionMismatch { stored, derived } => write!(
                f,
                "current_position is {stored:?}, open period says {derived:?}"
            ),
            IntegrityViolation::CurrentStartDateMismatch { stored, derived } => write!(
                f,
                "current_period_start_date is {stored:?}, open period says {derived:?}"
            ),
            IntegrityViolation::UnsortedPositionHistory { period_id } => {
                write!(f, "period {period_id} has out-of-order position history")
            }
        }
    }
}

/// Every violation found on a single history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("history {history_id} failed integrity check: {}", summarize(.violations))]
pub struct IntegrityReport {
    pub history_id: Uuid,
    pub violations: Vec<IntegrityViolation>,
}

fn summarize(violations: &[IntegrityViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check that stored totals match the closed periods and that the
/// denormalised active-period fields agree with the periods.
///
/// Histories whose totals were overwritten by an admin fail this check on
/// purpose; it is the only way such drift is surfaced.
///
/// # Errors
///
/// Returns an [`IntegrityReport`] listing every violation found.
pub fn verify_totals(history: &EndorsementHistory) -> Result<(), IntegrityReport> {
    let mut violations = Vec::new();

    let derived = sum_closed_periods(&history.periods);
    let stored = history.totals();
    for (field, stored, derived) in [
        (
            "total_days_endorsed",
            stored.total_days_endorsed,
            derived.total_days_endorsed,
        ),
        (
            "total_days_in_top5",
            stored.total_days_in_top5,
            derived.total_days_in_top5,
        ),
        (
            "total_days_in_top10",
            stored.total_days_in_top10,
            derived.total_days_in_top10,
        ),
    ] {
        if stored != derived {
            violations.push(IntegrityViolation::TotalMismatch {
                field,
                stored,
                derived,
            });
        }
    }

    let open: Vec<&EndorsementPeriod> = history.periods.iter().filter(|p| p.is_active()).collect();
    if open.len() > 1 {
        violations.push(IntegrityViolation::MultipleOpenPeriods { count: open.len() });
    }
    if history.is_currently_endorsed != !open.is_empty() {
        violations.push(IntegrityViolation::ActiveFlagMismatch {
            flag: history.is_currently_endorsed,
            open_periods: open.len(),
        });
    }

    let active = open.first();
    let derived_position = active.map(|p| p.current_position());
    if history.current_position != derived_position {
        violations.push(IntegrityViolation::CurrentPositionMismatch {
            stored: history.current_position,
            derived: derived_position,
        });
    }
    let derived_start = active.map(|p| p.start_date);
    if history.current_period_start_date != derived_start {
        violations.push(IntegrityViolation::CurrentStartDateMismatch {
            stored: history.current_period_start_date,
            derived: derived_start,
        });
    }

    for period in &history.periods {
        if !period.position_history_is_sorted() {
            violations.push(IntegrityViolation::UnsortedPositionHistory {
                period_id: period.id,
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(IntegrityReport {
            history_id: history.id,
            violations,
        })
    }
}

#[cfg(test)]
#[path = "aggregation_test.rs"]
mod tests;
