//! API request handlers.
//!
//! Handlers return `Result<impl IntoResponse, CourierError>` so errors map to
//! HTTP statuses through `CourierError`'s `IntoResponse` impl.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResponse, AppState};
use crate::email::{EmailJobId, NewEmailJob};
use crate::error::CourierError;

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let worker = state.service.worker();
    let accepting = worker.is_accepting();

    Json(serde_json::json!({
        "status": if accepting { "healthy" } else { "draining" },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "worker": worker.stats().snapshot(),
    }))
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    let body = crate::telemetry::MetricsRegistry::global().render();

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Email Job Handlers
// ═══════════════════════════════════════════════════════════════════════════════

/// Missing text fields deserialize as empty so they fail validation with the
/// usual error envelope instead of a bare extractor rejection.
#[derive(Debug, Deserialize)]
pub struct CreateEmailRequest {
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl From<CreateEmailRequest> for NewEmailJob {
    fn from(req: CreateEmailRequest) -> Self {
        Self {
            recipient: req.recipient,
            subject: req.subject,
            body: req.body,
            scheduled_time: req.scheduled_time,
        }
    }
}

pub async fn create_email(
    State(state): State<AppState>,
    payload: Result<Json<CreateEmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, CourierError> {
    let Json(req) = payload.map_err(|rejection| CourierError::validation(rejection.body_text()))?;
    let job = state.service.create_email_job(req.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(job))))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn list_emails(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, CourierError> {
    let page = state
        .service
        .list_email_jobs(query.limit, query.offset)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// An id that is not a UUID cannot name a stored job, so it is reported as
/// not found rather than as a malformed path.
fn parse_job_id(raw: &str) -> Result<EmailJobId, CourierError> {
    Uuid::parse_str(raw)
        .map(EmailJobId)
        .map_err(|_| CourierError::email_job_not_found(raw))
}

pub async fn get_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CourierError> {
    let job = state.service.get_email_job(parse_job_id(&id)?).await?;
    Ok(Json(ApiResponse::success(job)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliverQuery {
    #[serde(default)]
    pub wait: bool,
}

pub async fn deliver_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeliverQuery>,
) -> Result<axum::response::Response, CourierError> {
    let id = parse_job_id(&id)?;

    if query.wait {
        let outcome = state.service.deliver_now(id).await?;
        return Ok((StatusCode::OK, Json(ApiResponse::success(outcome))).into_response());
    }

    let job = state.service.trigger_delivery(id).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(job))).into_response())
}
