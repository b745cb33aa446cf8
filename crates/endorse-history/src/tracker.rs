use std::sync::Arc;

use chrono::{DateTime, Utc};

use endorse_core::{validate_position, EndorsementHistory, EndorsementPeriod, HistoryKey};

use crate::error::HistoryError;
use crate::ledger::{Ledger, Load};
use crate::position::append_change;

/// Opens and closes endorsement periods.
#[derive(Clone)]
pub struct PeriodTracker {
    ledger: Arc<Ledger>,
}

impl PeriodTracker {
    pub(crate) fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Start endorsing the entity at `position`.
    ///
    /// When a period is already open this records a position change on it
    /// instead of opening a second one. Either way `entity_name` replaces the
    /// stored display name.
    ///
    /// # Errors
    ///
    /// [`HistoryError::Validation`] for a rank below 1, or when the history is
    /// already active and `start_date` precedes its latest event.
    pub async fn start_period(
        &self,
        key: &HistoryKey,
        entity_name: &str,
        position: i32,
        start_date: Option<DateTime<Utc>>,
    ) -> Result<EndorsementHistory, HistoryError> {
        validate_position(position)?;
        let start = start_date.unwrap_or_else(|| self.ledger.now());

        let saved = self
            .ledger
            .mutate(key, Load::GetOrCreate { entity_name }, |history| {
                let renamed = history.entity_name != entity_name;
                entity_name.clone_into(&mut history.entity_name);
                if history.active_period().is_some() {
                    let moved = append_change(history, position, start)?;
                    return Ok(moved || renamed);
                }
                open_period(history, start, position);
                Ok(true)
            })
            .await?;

        saved.ok_or_else(|| HistoryError::NotFound(format!("endorsement history {key}")))
    }

    /// Stop endorsing the entity at `end_date` (default: now).
    ///
    /// Freezes the open period's day counts and recomputes every total from
    /// the closed periods. Returns `Ok(None)` when the key has no history and
    /// the history unchanged when nothing is open.
    ///
    /// # Errors
    ///
    /// [`HistoryError::Validation`] when `end_date` precedes the open
    /// period's start or its latest rank change.
    pub async fn end_period(
        &self,
        key: &HistoryKey,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Option<EndorsementHistory>, HistoryError> {
        let end = end_date.unwrap_or_else(|| self.ledger.now());

        self.ledger
            .mutate(key, Load::Existing, |history| close_period(history, end))
            .await
    }
}

pub(crate) fn open_period(history: &mut EndorsementHistory, start: DateTime<Utc>, position: i32) {
    let period = EndorsementPeriod::open(start, position);
    tracing::debug!(
        user_id = %history.user_id,
        entity_type = %history.entity_type,
        entity_id = %history.entity_id,
        period_id = %period.id,
        position,
        "opened endorsement period"
    );
    history.push_period(period);
}

pub(crate) fn close_period(
    history: &mut EndorsementHistory,
    end: DateTime<Utc>,
) -> Result<bool, HistoryError> {
    let Some(active) = history.active_period() else {
        return Ok(false);
    };
    let last = active.last_event_date();
    if end < last {
        return Err(HistoryError::Validation(format!(
            "end date {end} precedes the latest recorded event at {last}"
        )));
    }
    let period_id = active.id;

    history.close_active_period(end);
    tracing::debug!(
        user_id = %history.user_id,
        entity_type = %history.entity_type,
        entity_id = %history.entity_id,
        %period_id,
        total_days_endorsed = history.total_days_endorsed,
        "closed endorsement period"
    );
    Ok(true)
}
