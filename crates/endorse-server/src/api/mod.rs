mod admin;
mod endorsements;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use endorse_core::{EntityType, HistoryKey};
use endorse_history::{HistoryError, HistoryService};

use crate::middleware::{request_id, require_admin_auth, AdminAuth, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub history: HistoryService,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: &RequestId, data: T) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id.0.clone()),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_history_error(request_id: &str, error: &HistoryError) -> ApiError {
    match error {
        HistoryError::Validation(msg) => ApiError::new(request_id, "validation_error", msg),
        HistoryError::NotFound(what) => {
            ApiError::new(request_id, "not_found", format!("{what} not found"))
        }
        HistoryError::Concurrency { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        HistoryError::Integrity(report) => {
            tracing::error!(history_id = %report.history_id, error = %report, "integrity violation");
            ApiError::new(request_id, "internal_error", "stored history is inconsistent")
        }
        HistoryError::Persistence(e) => {
            tracing::error!(error = %e, "storage operation failed");
            ApiError::new(request_id, "internal_error", "storage operation failed")
        }
    }
}

pub(super) fn parse_entity_type(request_id: &str, raw: &str) -> Result<EntityType, ApiError> {
    raw.parse()
        .map_err(|e: endorse_core::CoreError| ApiError::new(request_id, "validation_error", e.to_string()))
}

pub(super) fn require_non_empty(req_id: &str, field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

pub(super) fn history_key(
    req_id: &str,
    user_id: &str,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<HistoryKey, ApiError> {
    require_non_empty(req_id, "user_id", user_id)?;
    require_non_empty(req_id, "entity_id", entity_id)?;
    Ok(HistoryKey::new(user_id, entity_type, entity_id))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn admin_router(auth: AdminAuth) -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/endorsements", get(admin::list_all_histories))
        .route(
            "/api/v1/admin/endorsements/backdate",
            post(admin::insert_backdated_period),
        )
        .route(
            "/api/v1/admin/endorsements/{history_id}/totals",
            patch(admin::overwrite_totals),
        )
        .route(
            "/api/v1/admin/endorsements/{history_id}/periods/{period_id}",
            delete(admin::delete_period),
        )
        .route(
            "/api/v1/admin/endorsements/{history_id}/verify",
            get(admin::verify_history),
        )
        .layer(axum::middleware::from_fn_with_state(auth, require_admin_auth))
}

pub fn build_app(state: AppState, auth: AdminAuth) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/endorsements/start", post(endorsements::start_period))
        .route("/api/v1/endorsements/end", post(endorsements::end_period))
        .route(
            "/api/v1/endorsements/position",
            post(endorsements::update_position),
        )
        .route(
            "/api/v1/endorsements/reorder",
            post(endorsements::record_reorder),
        )
        .route(
            "/api/v1/endorsements/{user_id}/{entity_type}/{entity_id}/cumulative",
            get(endorsements::get_cumulative_days),
        )
        .route(
            "/api/v1/users/{user_id}/endorsements",
            get(endorsements::list_user_histories),
        );

    Router::new()
        .merge(public_routes)
        .merge(admin_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.history.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
