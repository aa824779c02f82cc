//! HTTP API tests, driving the router in-process.
//!
//! Tests cover:
//! - Health and metrics endpoints
//! - Email job creation, retrieval and listing
//! - Queued and synchronous delivery
//! - Error status codes and the error envelope

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use courier_core::api::{build_router, AppState};
use courier_core::delivery::{DeliveryOrchestrator, DeliveryWorker, WorkerConfig};
use courier_core::service::EmailJobService;
use courier_core::store::InMemoryEmailJobStore;
use courier_core::transport::RecordingTransport;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(transport: RecordingTransport) -> Router {
    let store = Arc::new(InMemoryEmailJobStore::new());
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        store.clone(),
        Arc::new(transport),
        Duration::from_secs(5),
    ));
    let worker = DeliveryWorker::start(Arc::clone(&orchestrator), WorkerConfig::default());
    build_router(AppState::new(EmailJobService::new(store, orchestrator, worker)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// A job scheduled far enough ahead that nothing dispatches it.
async fn create_deferred(app: &Router, recipient: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/emails",
            json!({
                "recipient": recipient,
                "subject": "Hi",
                "body": "Test",
                "scheduled_time": "2999-01-01T00:00:00Z"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = app(RecordingTransport::new());
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["worker"]["dispatched"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_is_plain_text() {
    let app = app(RecordingTransport::new());
    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

// ============================================================================
// Create / Get / List
// ============================================================================

#[tokio::test]
async fn test_create_returns_pending_job() {
    let app = app(RecordingTransport::new());
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/emails",
            json!({
                "recipient": "a@example.com",
                "subject": "Hi",
                "body": "Test",
                "scheduled_time": "2999-01-01T00:00:00Z"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["recipient"], "a@example.com");
    assert!(body["data"]["sent_time"].is_null());
    assert!(body["data"]["delivery_error"].is_null());
}

#[tokio::test]
async fn test_create_with_missing_field_is_unprocessable() {
    let app = app(RecordingTransport::new());
    let (status, body) = send(
        &app,
        post_json("/api/v1/emails", json!({ "recipient": "a@example.com", "subject": "Hi" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "MISSING_REQUIRED_FIELD");

    let (_, list) = send(&app, get("/api/v1/emails")).await;
    assert_eq!(list["data"]["total"], 0);
}

#[tokio::test]
async fn test_create_with_malformed_schedule_is_a_validation_error() {
    let app = app(RecordingTransport::new());
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/emails",
            json!({
                "recipient": "a@example.com",
                "subject": "Hi",
                "body": "Test",
                "scheduled_time": "next tuesday"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_get_unknown_job_is_not_found() {
    let app = app(RecordingTransport::new());
    let (status, body) = send(&app, get(&format!("/api/v1/emails/{}", Uuid::new_v4()))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "EMAIL_JOB_NOT_FOUND");
}

#[tokio::test]
async fn test_non_uuid_id_is_not_found() {
    let app = app(RecordingTransport::new());
    let (status, body) = send(&app, get("/api/v1/emails/nonexistent-id")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "EMAIL_JOB_NOT_FOUND");
    assert_eq!(body["context"]["email_job_id"], "nonexistent-id");
}

#[tokio::test]
async fn test_list_pages_jobs() {
    let app = app(RecordingTransport::new());
    for i in 0..3 {
        create_deferred(&app, &format!("u{}@example.com", i)).await;
    }

    let (status, body) = send(&app, get("/api/v1/emails?limit=2&offset=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["limit"], 2);
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn test_deliver_and_wait_sends() {
    let transport = RecordingTransport::new();
    let app = app(transport.clone());
    let id = create_deferred(&app, "a@example.com").await;

    let (status, body) = send(
        &app,
        post_empty(&format!("/api/v1/emails/{}/deliver?wait=true", id)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "sent");
    assert_eq!(body["data"]["job"]["status"], "sent");
    assert!(body["data"]["job"]["sent_time"].is_string());
    assert_eq!(transport.send_count(), 1);
}

#[tokio::test]
async fn test_deliver_and_wait_records_rejection() {
    let transport = RecordingTransport::builder()
        .fail_recipient("bad@", "relay rejected recipient")
        .build();
    let app = app(transport);
    let id = create_deferred(&app, "bad@").await;

    let (status, body) = send(
        &app,
        post_empty(&format!("/api/v1/emails/{}/deliver?wait=true", id)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "failed");
    assert_eq!(body["data"]["job"]["delivery_error"], "relay rejected recipient");

    let (_, body) = send(&app, get(&format!("/api/v1/emails/{}", id))).await;
    assert_eq!(body["data"]["status"], "failed");
}

#[tokio::test]
async fn test_queued_delivery_is_accepted_and_completes() {
    let transport = RecordingTransport::new();
    let app = app(transport.clone());
    let id = create_deferred(&app, "a@example.com").await;

    let (status, body) = send(&app, post_empty(&format!("/api/v1/emails/{}/deliver", id))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["id"], id.as_str());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (_, body) = send(&app, get(&format!("/api/v1/emails/{}", id))).await;
        if body["data"]["status"] == "sent" {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job was never sent");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.send_count(), 1);
}

#[tokio::test]
async fn test_redelivery_reports_already_terminal() {
    let transport = RecordingTransport::new();
    let app = app(transport.clone());
    let id = create_deferred(&app, "a@example.com").await;
    let uri = format!("/api/v1/emails/{}/deliver?wait=true", id);

    send(&app, post_empty(&uri)).await;
    let (status, body) = send(&app, post_empty(&uri)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "already_terminal");
    assert_eq!(transport.send_count(), 1);
}

#[tokio::test]
async fn test_deliver_unknown_job_is_not_found() {
    let transport = RecordingTransport::new();
    let app = app(transport.clone());

    for uri in [
        format!("/api/v1/emails/{}/deliver", Uuid::new_v4()),
        format!("/api/v1/emails/{}/deliver?wait=true", Uuid::new_v4()),
        "/api/v1/emails/nonexistent-id/deliver".to_string(),
        "/api/v1/emails/nonexistent-id/deliver?wait=true".to_string(),
    ] {
        let (status, body) = send(&app, post_empty(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "EMAIL_JOB_NOT_FOUND");
    }
    assert_eq!(transport.send_count(), 0);
}
