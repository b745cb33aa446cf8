//! Manual corrections to stored histories.
//!
//! These bypass the normal start/end flow. Every operation still runs under
//! the key lock and the version check, and every change is logged at `warn`
//! so overrides leave an audit trail in the service logs.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use endorse_core::{
    validate_position, verify_totals, EndorsementHistory, EndorsementPeriod, HistoryKey,
    IntegrityReport, Totals,
};

use crate::error::HistoryError;
use crate::ledger::{Ledger, Load};

/// Replacement values for the stored totals. `None` leaves a field as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TotalsOverride {
    pub total_days_endorsed: Option<i64>,
    pub total_days_in_top5: Option<i64>,
    pub total_days_in_top10: Option<i64>,
}

impl TotalsOverride {
    fn is_empty(&self) -> bool {
        self.total_days_endorsed.is_none()
            && self.total_days_in_top5.is_none()
            && self.total_days_in_top10.is_none()
    }

    fn apply_to(self, current: Totals) -> Totals {
        Totals {
            total_days_endorsed: self
                .total_days_endorsed
                .unwrap_or(current.total_days_endorsed),
            total_days_in_top5: self
                .total_days_in_top5
                .unwrap_or(current.total_days_in_top5),
            total_days_in_top10: self
                .total_days_in_top10
                .unwrap_or(current.total_days_in_top10),
        }
    }

    fn validate(&self) -> Result<(), HistoryError> {
        if self.is_empty() {
            return Err(HistoryError::Validation(
                "at least one total must be provided".to_string(),
            ));
        }
        let fields = [
            ("total_days_endorsed", self.total_days_endorsed),
            ("total_days_in_top5", self.total_days_in_top5),
            ("total_days_in_top10", self.total_days_in_top10),
        ];
        for (name, value) in fields {
            if let Some(v) = value.filter(|v| *v < 0) {
                return Err(HistoryError::Validation(format!(
                    "{name} must not be negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Input for [`AdminCorrectionService::insert_backdated_period`].
#[derive(Debug, Clone)]
pub struct BackdatedPeriod {
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub start_position: i32,
}

#[derive(Clone)]
pub struct AdminCorrectionService {
    ledger: Arc<Ledger>,
}

impl AdminCorrectionService {
    pub(crate) fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Overwrite some or all stored totals.
    ///
    /// The next period close recomputes totals from the periods and discards
    /// the override.
    ///
    /// # Errors
    ///
    /// [`HistoryError::Validation`] for an empty or negative override,
    /// [`HistoryError::NotFound`] for an unknown history.
    pub async fn overwrite_totals(
        &self,
        history_id: Uuid,
        totals: TotalsOverride,
    ) -> Result<EndorsementHistory, HistoryError> {
        totals.validate()?;

        self.ledger
            .mutate_by_id(history_id, |history| {
                let before = history.totals();
                let after = totals.apply_to(before);
                history.set_totals(after);
                tracing::warn!(
                    %history_id,
                    user_id = %history.user_id,
                    before_days_endorsed = before.total_days_endorsed,
                    before_days_in_top5 = before.total_days_in_top5,
                    before_days_in_top10 = before.total_days_in_top10,
                    after_days_endorsed = after.total_days_endorsed,
                    after_days_in_top5 = after.total_days_in_top5,
                    after_days_in_top10 = after.total_days_in_top10,
                    "admin overwrote endorsement totals"
                );
                Ok(true)
            })
            .await
    }

    /// Insert a period in the past, creating the history if needed.
    ///
    /// A closed period has its day counts frozen and the totals recomputed.
    /// An open period becomes the active one. Overlap with existing periods is
    /// not checked.
    ///
    /// # Errors
    ///
    /// [`HistoryError::Validation`] when `end_date < start_date`, the rank is
    /// below 1, or an open period is requested while one is already active.
    pub async fn insert_backdated_period(
        &self,
        key: &HistoryKey,
        entity_name: &str,
        period: BackdatedPeriod,
    ) -> Result<EndorsementHistory, HistoryError> {
        validate_position(period.start_position)?;
        if let Some(end) = period.end_date {
            if end < period.start_date {
                return Err(HistoryError::Validation(format!(
                    "end date {end} precedes start date {}",
                    period.start_date
                )));
            }
        }

        let saved = self
            .ledger
            .mutate(key, Load::GetOrCreate { entity_name }, |history| {
                let open = EndorsementPeriod::open(period.start_date, period.start_position);
                let inserted = match period.end_date {
                    Some(end) => {
                        let closed = open.close(end);
                        history.push_period(closed.clone());
                        history.recompute_totals();
                        closed
                    }
                    None => {
                        if let Some(active) = history.active_period() {
                            return Err(HistoryError::Validation(format!(
                                "history already has an active period {}",
                                active.id
                            )));
                        }
                        history.push_period(open.clone());
                        open
                    }
                };
                entity_name.clone_into(&mut history.entity_name);
                tracing::warn!(
                    history_id = %history.id,
                    user_id = %history.user_id,
                    entity_type = %history.entity_type,
                    entity_id = %history.entity_id,
                    period_id = %inserted.id,
                    start_date = %inserted.start_date,
                    closed = !inserted.is_active(),
                    "admin inserted backdated period"
                );
                Ok(true)
            })
            .await?;

        saved.ok_or_else(|| HistoryError::NotFound(format!("endorsement history {key}")))
    }

    /// Remove one period and recompute totals over the rest.
    ///
    /// # Errors
    ///
    /// [`HistoryError::NotFound`] when the history or the period is unknown.
    pub async fn delete_period(
        &self,
        history_id: Uuid,
        period_id: Uuid,
    ) -> Result<EndorsementHistory, HistoryError> {
        self.ledger
            .mutate_by_id(history_id, |history| {
                let removed = history.remove_period(period_id).ok_or_else(|| {
                    HistoryError::NotFound(format!(
                        "period {period_id} in endorsement history {history_id}"
                    ))
                })?;
                tracing::warn!(
                    %history_id,
                    %period_id,
                    was_active = removed.is_active(),
                    total_days_endorsed = history.total_days_endorsed,
                    "admin deleted endorsement period"
                );
                Ok(true)
            })
            .await
    }

    /// Check one history's stored totals and active-period fields.
    ///
    /// # Errors
    ///
    /// [`HistoryError::Integrity`] listing every violation found.
    pub async fn verify(&self, history_id: Uuid) -> Result<(), HistoryError> {
        let history = self.ledger.get_by_id(history_id).await?;
        verify_totals(&history)?;
        Ok(())
    }

    /// Check every stored history. Returns one report per inconsistent history.
    pub async fn verify_all(&self) -> Result<Vec<IntegrityReport>, HistoryError> {
        let histories = self.ledger.list_all().await?;
        let checked = histories.len();
        let reports: Vec<IntegrityReport> = histories
            .iter()
            .filter_map(|h| verify_totals(h).err())
            .collect();
        if !reports.is_empty() {
            tracing::warn!(
                checked,
                inconsistent = reports.len(),
                "integrity check found inconsistent histories"
            );
        }
        Ok(reports)
    }
}

/// Parse an admin-supplied date: an RFC 3339 timestamp or a bare
/// `YYYY-MM-DD`, read as midnight UTC.
///
/// # Errors
///
/// [`HistoryError::Validation`] for anything else.
pub fn parse_admin_date(raw: &str) -> Result<DateTime<Utc>, HistoryError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            HistoryError::Validation(format!(
                "invalid date {raw:?}: expected RFC 3339 or YYYY-MM-DD"
            ))
        })
}
