//! Tracking and read handlers used by the endorsement list UI.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use endorse_core::{CumulativeSnapshot, EndorsementHistory, EntityType};
use endorse_history::ReorderEntry;

use crate::middleware::RequestId;

use super::{
    history_key, map_history_error, parse_entity_type, require_non_empty, ApiError, ApiResponse,
    AppState,
};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct StartPeriodRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub position: i32,
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct EndPeriodRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdatePositionRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub position: i32,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ReorderRequest {
    pub user_id: String,
    pub entries: Vec<ReorderEntry>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct ReorderResponse {
    pub submitted: usize,
    pub applied: usize,
}

type Envelope<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// POST /api/v1/endorsements/start
pub(in crate::api) async fn start_period(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<StartPeriodRequest>,
) -> Envelope<EndorsementHistory> {
    let rid = &req_id.0;
    let key = history_key(rid, &body.user_id, body.entity_type, &body.entity_id)?;
    require_non_empty(rid, "entity_name", &body.entity_name)?;

    let history = state
        .history
        .start_period(&key, body.entity_name.trim(), body.position, body.start_date)
        .await
        .map_err(|e| map_history_error(rid, &e))?;
    Ok(ApiResponse::new(&req_id, history))
}

/// POST /api/v1/endorsements/end
///
/// `data` is `null` when the entity was never endorsed.
pub(in crate::api) async fn end_period(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<EndPeriodRequest>,
) -> Envelope<Option<EndorsementHistory>> {
    let rid = &req_id.0;
    let key = history_key(rid, &body.user_id, body.entity_type, &body.entity_id)?;

    let history = state
        .history
        .end_period(&key, body.end_date)
        .await
        .map_err(|e| map_history_error(rid, &e))?;
    Ok(ApiResponse::new(&req_id, history))
}

/// POST /api/v1/endorsements/position
pub(in crate::api) async fn update_position(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<UpdatePositionRequest>,
) -> Envelope<Option<EndorsementHistory>> {
    let rid = &req_id.0;
    let key = history_key(rid, &body.user_id, body.entity_type, &body.entity_id)?;

    let history = state
        .history
        .update_current_position(&key, body.position)
        .await
        .map_err(|e| map_history_error(rid, &e))?;
    Ok(ApiResponse::new(&req_id, history))
}

/// POST /api/v1/endorsements/reorder
///
/// Always succeeds once the body parses; per-entry failures are logged.
pub(in crate::api) async fn record_reorder(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ReorderRequest>,
) -> Envelope<ReorderResponse> {
    require_non_empty(&req_id.0, "user_id", &body.user_id)?;

    let applied = state
        .history
        .record_reorder(&body.user_id, &body.entries)
        .await;
    Ok(ApiResponse::new(
        &req_id,
        ReorderResponse {
            submitted: body.entries.len(),
            applied,
        },
    ))
}

/// GET /api/v1/endorsements/{user_id}/{entity_type}/{entity_id}/cumulative
pub(in crate::api) async fn get_cumulative_days(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, entity_type, entity_id)): Path<(String, String, String)>,
) -> Envelope<CumulativeSnapshot> {
    let rid = &req_id.0;
    let entity_type = parse_entity_type(rid, &entity_type)?;
    let key = history_key(rid, &user_id, entity_type, &entity_id)?;

    let snapshot = state
        .history
        .get_cumulative_days(&key)
        .await
        .map_err(|e| map_history_error(rid, &e))?;
    Ok(ApiResponse::new(&req_id, snapshot))
}

/// GET /api/v1/users/{user_id}/endorsements
pub(in crate::api) async fn list_user_histories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(user_id): Path<String>,
) -> Envelope<Vec<EndorsementHistory>> {
    let histories = state
        .history
        .get_user_endorsement_history(&user_id)
        .await
        .map_err(|e| map_history_error(&req_id.0, &e))?;
    Ok(ApiResponse::new(&req_id, histories))
}
