use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use endorse_core::FixedClock;
use endorse_db::MemoryHistoryRepository;
use endorse_history::RetryPolicy;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use super::*;

fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
}

fn test_app(auth: AdminAuth) -> (Router, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(start_of_test()));
    let history = HistoryService::new(
        Arc::new(MemoryHistoryRepository::with_clock(clock.clone())),
        clock.clone(),
        RetryPolicy::none(),
    );
    (build_app(AppState { history }, auth), clock)
}

fn open_app() -> (Router, Arc<FixedClock>) {
    test_app(AdminAuth::from_keys(None, true).expect("auth"))
}

fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json parse")
    };
    (status, json)
}

fn start_body(entity_id: &str, position: i32) -> Value {
    json!({
        "user_id": "user-1",
        "entity_type": "brand",
        "entity_id": entity_id,
        "entity_name": "Acme",
        "position": position,
    })
}

#[test]
fn api_error_validation_error_maps_to_bad_request() {
    let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn concurrency_error_maps_to_conflict() {
    let err = HistoryError::Concurrency {
        history_id: Uuid::new_v4(),
    };
    let response = map_history_error("req-1", &err).into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn health_reports_ok_and_echoes_request_id() {
    let (app, _clock) = open_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "req-abc")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-abc")
    );
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json: Value = serde_json::from_slice(&body).expect("json parse");
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["meta"]["request_id"], "req-abc");
}

#[tokio::test]
async fn start_then_end_freezes_totals() {
    let (app, clock) = open_app();

    let (status, json) = send(
        &app,
        json_request(Method::POST, "/api/v1/endorsements/start", &start_body("acme", 3)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["is_currently_endorsed"], true);
    assert_eq!(json["data"]["current_position"], 3);

    clock.set(start_of_test() + Duration::days(10));
    let (status, json) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/endorsements/end",
            &json!({"user_id": "user-1", "entity_type": "brand", "entity_id": "acme"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_days_endorsed"], 10);
    assert_eq!(json["data"]["total_days_in_top5"], 10);
    assert_eq!(json["data"]["is_currently_endorsed"], false);
}

#[tokio::test]
async fn end_for_unknown_entity_returns_null_data() {
    let (app, _clock) = open_app();
    let (status, json) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/endorsements/end",
            &json!({"user_id": "user-1", "entity_type": "place", "entity_id": "nowhere"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"].is_null());
}

#[tokio::test]
async fn invalid_position_is_a_validation_error() {
    let (app, _clock) = open_app();
    let (status, json) = send(
        &app,
        json_request(Method::POST, "/api/v1/endorsements/start", &start_body("acme", 0)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[tokio::test]
async fn position_update_and_cumulative_read() {
    let (app, clock) = open_app();
    send(
        &app,
        json_request(Method::POST, "/api/v1/endorsements/start", &start_body("acme", 8)),
    )
    .await;

    clock.set(start_of_test() + Duration::days(2));
    let (status, json) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/endorsements/position",
            &json!({"user_id": "user-1", "entity_type": "brand", "entity_id": "acme", "position": 2}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["current_position"], 2);

    clock.set(start_of_test() + Duration::days(5));
    let (status, json) = send(
        &app,
        get_request("/api/v1/endorsements/user-1/brand/acme/cumulative"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_days_endorsed"], 5);
    assert_eq!(json["data"]["total_days_in_top5"], 3);
    assert_eq!(json["data"]["total_days_in_top10"], 5);
    assert_eq!(json["data"]["is_currently_endorsed"], true);
}

#[tokio::test]
async fn cumulative_rejects_unknown_entity_type_and_missing_history() {
    let (app, _clock) = open_app();

    let (status, json) = send(
        &app,
        get_request("/api/v1/endorsements/user-1/person/acme/cumulative"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let (status, json) = send(
        &app,
        get_request("/api/v1/endorsements/user-1/brand/acme/cumulative"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn user_listing_and_reorder() {
    let (app, clock) = open_app();
    for (entity_id, position) in [("acme", 1), ("globex", 2)] {
        send(
            &app,
            json_request(
                Method::POST,
                "/api/v1/endorsements/start",
                &start_body(entity_id, position),
            ),
        )
        .await;
    }

    clock.set(start_of_test() + Duration::days(1));
    let (status, json) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/endorsements/reorder",
            &json!({
                "user_id": "user-1",
                "entries": [
                    {"entity_type": "brand", "entity_id": "globex", "position": 1},
                    {"entity_type": "brand", "entity_id": "acme", "position": 2},
                    {"entity_type": "brand", "entity_id": "acme", "position": -1},
                ],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["submitted"], 3);
    assert_eq!(json["data"]["applied"], 2);

    let (status, json) = send(&app, get_request("/api/v1/users/user-1/endorsements")).await;
    assert_eq!(status, StatusCode::OK);
    let histories = json["data"].as_array().expect("data array");
    assert_eq!(histories.len(), 2);
    let globex = histories
        .iter()
        .find(|h| h["entity_id"] == "globex")
        .expect("globex history");
    assert_eq!(globex["current_position"], 1);
}

#[tokio::test]
async fn admin_routes_require_bearer_token_when_enabled() {
    let (app, _clock) = test_app(AdminAuth::from_keys(Some("secret"), false).expect("auth"));

    let (status, json) = send(&app, get_request("/api/v1/admin/endorsements")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");

    let (status, _json) = send(
        &app,
        Request::builder()
            .uri("/api/v1/admin/endorsements")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _json) = send(&app, get_request("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK, "public routes stay open");
}

#[tokio::test]
async fn admin_backdate_overwrite_verify_and_delete() {
    let (app, _clock) = open_app();

    let (status, json) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/admin/endorsements/backdate",
            &json!({
                "user_id": "user-2",
                "entity_type": "value",
                "entity_id": "honesty",
                "entity_name": "Honesty",
                "start_date": "2024-01-01",
                "end_date": "2024-01-08T00:00:00Z",
                "start_position": 4,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_days_endorsed"], 7);
    let history_id = json["data"]["id"].as_str().expect("id").to_string();
    let period_id = json["data"]["periods"][0]["id"]
        .as_str()
        .expect("period id")
        .to_string();

    let verify_uri = format!("/api/v1/admin/endorsements/{history_id}/verify");
    let (status, json) = send(&app, get_request(&verify_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["consistent"], true);

    let (status, json) = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/api/v1/admin/endorsements/{history_id}/totals"),
            &json!({"total_days_in_top10": 99}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_days_in_top10"], 99);

    let (_status, json) = send(&app, get_request(&verify_uri)).await;
    assert_eq!(json["data"]["consistent"], false);
    assert_eq!(json["data"]["violations"][0]["kind"], "total_mismatch");

    let (status, json) = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!(
                "/api/v1/admin/endorsements/{history_id}/periods/{period_id}"
            ))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_days_endorsed"], 0);
    assert_eq!(json["data"]["total_days_in_top10"], 0);

    let (status, _json) = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!(
                "/api/v1/admin/endorsements/{history_id}/periods/{period_id}"
            ))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_backdate_rejects_bad_dates() {
    let (app, _clock) = open_app();
    let (status, json) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/admin/endorsements/backdate",
            &json!({
                "user_id": "user-2",
                "entity_type": "value",
                "entity_id": "honesty",
                "entity_name": "Honesty",
                "start_date": "last tuesday",
                "start_position": 4,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[tokio::test]
async fn admin_backdate_rejects_blank_key_fields() {
    let (app, _clock) = open_app();

    for (field, blank) in [("user_id", ""), ("entity_id", "  "), ("entity_name", " ")] {
        let mut body = json!({
            "user_id": "user-2",
            "entity_type": "value",
            "entity_id": "honesty",
            "entity_name": "Honesty",
            "start_date": "2024-01-01",
            "end_date": "2024-01-08",
            "start_position": 4,
        });
        body[field] = json!(blank);

        let (status, json) = send(
            &app,
            json_request(Method::POST, "/api/v1/admin/endorsements/backdate", &body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "blank {field}");
        assert_eq!(json["error"]["code"], "validation_error");
        assert!(
            json["error"]["message"]
                .as_str()
                .is_some_and(|m| m.contains(field)),
            "message names {field}: {json}"
        );
    }

    let (status, json) = send(&app, get_request("/api/v1/admin/endorsements")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!([]), "nothing was stored");
}
