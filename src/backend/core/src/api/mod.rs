//! HTTP API for Courier.
//!
//! - `GET /health`, `GET /metrics` (unversioned)
//! - `/api/v1/emails...` (see [`v1::routes`])
//!
//! Every JSON body uses the same envelope: `{ success, data?, error?, error_code? }`.
//! Errors are rendered by the `IntoResponse` impl on `CourierError`.

mod handlers;
pub mod v1;

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::service::EmailJobService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: EmailJobService,
}

impl AppState {
    pub fn new(service: EmailJobService) -> Self {
        Self { service }
    }
}

/// Build the API router.
///
/// ```rust,ignore
/// let app = build_router(AppState::new(service));
/// axum::serve(listener, app).await?;
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1::routes::v1_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Standard API response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CourierError, ErrorResponse};

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_body_shares_envelope_keys() {
        let err = CourierError::email_job_not_found("42");
        let json = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "EMAIL_JOB_NOT_FOUND");
        assert!(json.get("data").is_none());
    }
}
