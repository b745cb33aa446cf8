use std::sync::Arc;

use chrono::{DateTime, Utc};

use endorse_core::{validate_position, EndorsementHistory, HistoryKey, PositionChange};

use crate::error::HistoryError;
use crate::ledger::{Ledger, Load};

/// Appends rank changes to the active period of a history.
#[derive(Clone)]
pub struct PositionTracker {
    ledger: Arc<Ledger>,
}

impl PositionTracker {
    pub(crate) fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Record that the entity moved to `new_position` at `date` (default: now).
    ///
    /// Returns `Ok(None)` when the key has no history, and the history
    /// unchanged when no period is open. Totals are not touched.
    ///
    /// # Errors
    ///
    /// [`HistoryError::Validation`] for a rank below 1 or a date earlier than
    /// the active period's latest event.
    pub async fn record_position_change(
        &self,
        key: &HistoryKey,
        new_position: i32,
        date: Option<DateTime<Utc>>,
    ) -> Result<Option<EndorsementHistory>, HistoryError> {
        validate_position(new_position)?;
        let date = date.unwrap_or_else(|| self.ledger.now());

        self.ledger
            .mutate(key, Load::Existing, |history| {
                append_change(history, new_position, date)
            })
            .await
    }
}

/// Append `{date, position}` to the active period. Returns `false` when there
/// is no active period.
pub(crate) fn append_change(
    history: &mut EndorsementHistory,
    position: i32,
    date: DateTime<Utc>,
) -> Result<bool, HistoryError> {
    let Some(active) = history.active_period() else {
        return Ok(false);
    };
    let last = active.last_event_date();
    if date < last {
        return Err(HistoryError::Validation(format!(
            "position change at {date} precedes the latest recorded event at {last}"
        )));
    }

    history.apply_position_change(PositionChange { date, position });
    tracing::debug!(
        user_id = %history.user_id,
        entity_type = %history.entity_type,
        entity_id = %history.entity_id,
        position,
        "recorded position change"
    );
    Ok(true)
}
