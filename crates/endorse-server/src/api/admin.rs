//! Admin correction handlers. Mounted behind bearer auth.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use endorse_core::{EndorsementHistory, EntityType, IntegrityViolation};
use endorse_history::{parse_admin_date, BackdatedPeriod, HistoryError, TotalsOverride};

use crate::middleware::RequestId;

use super::{history_key, map_history_error, require_non_empty, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct BackdateRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    /// RFC 3339 or `YYYY-MM-DD`.
    pub start_date: String,
    pub end_date: Option<String>,
    pub start_position: i32,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct VerifyResponse {
    pub history_id: Uuid,
    pub consistent: bool,
    pub violations: Vec<IntegrityViolation>,
}

type Envelope<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn parse_date(req_id: &str, raw: &str) -> Result<chrono::DateTime<chrono::Utc>, ApiError> {
    parse_admin_date(raw).map_err(|e| map_history_error(req_id, &e))
}

/// GET /api/v1/admin/endorsements
pub(in crate::api) async fn list_all_histories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Envelope<Vec<EndorsementHistory>> {
    let histories = state
        .history
        .get_all_endorsement_history()
        .await
        .map_err(|e| map_history_error(&req_id.0, &e))?;
    Ok(ApiResponse::new(&req_id, histories))
}

/// PATCH /api/v1/admin/endorsements/{history_id}/totals
pub(in crate::api) async fn overwrite_totals(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(history_id): Path<Uuid>,
    Json(body): Json<TotalsOverride>,
) -> Envelope<EndorsementHistory> {
    let history = state
        .history
        .admin()
        .overwrite_totals(history_id, body)
        .await
        .map_err(|e| map_history_error(&req_id.0, &e))?;
    Ok(ApiResponse::new(&req_id, history))
}

/// POST /api/v1/admin/endorsements/backdate
pub(in crate::api) async fn insert_backdated_period(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<BackdateRequest>,
) -> Envelope<EndorsementHistory> {
    let rid = &req_id.0;
    let key = history_key(rid, &body.user_id, body.entity_type, &body.entity_id)?;
    require_non_empty(rid, "entity_name", &body.entity_name)?;
    let period = BackdatedPeriod {
        start_date: parse_date(rid, &body.start_date)?,
        end_date: body
            .end_date
            .as_deref()
            .map(|raw| parse_date(rid, raw))
            .transpose()?,
        start_position: body.start_position,
    };

    let history = state
        .history
        .admin()
        .insert_backdated_period(&key, body.entity_name.trim(), period)
        .await
        .map_err(|e| map_history_error(rid, &e))?;
    Ok(ApiResponse::new(&req_id, history))
}

/// DELETE /api/v1/admin/endorsements/{history_id}/periods/{period_id}
pub(in crate::api) async fn delete_period(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((history_id, period_id)): Path<(Uuid, Uuid)>,
) -> Envelope<EndorsementHistory> {
    let history = state
        .history
        .admin()
        .delete_period(history_id, period_id)
        .await
        .map_err(|e| map_history_error(&req_id.0, &e))?;
    Ok(ApiResponse::new(&req_id, history))
}

/// GET /api/v1/admin/endorsements/{history_id}/verify
///
/// Inconsistency is reported in the body with a 200; only unknown ids and
/// storage failures are errors.
pub(in crate::api) async fn verify_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(history_id): Path<Uuid>,
) -> Envelope<VerifyResponse> {
    let violations = match state.history.admin().verify(history_id).await {
        Ok(()) => Vec::new(),
        Err(HistoryError::Integrity(report)) => report.violations,
        Err(e) => return Err(map_history_error(&req_id.0, &e)),
    };
    Ok(ApiResponse::new(
        &req_id,
        VerifyResponse {
            history_id,
            consistent: violations.is_empty(),
            violations,
        },
    ))
}
