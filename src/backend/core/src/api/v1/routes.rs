//! V1 API routes.

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::{handlers, AppState};

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

/// Build the V1 API router, mounted under `/api/v1/`.
///
/// - `POST /emails` - Create an email job (201)
/// - `GET /emails?limit&offset` - List jobs, newest first
/// - `GET /emails/:id` - Get one job
/// - `POST /emails/:id/deliver[?wait=true]` - Queue delivery (202), or deliver and wait (200)
pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/emails", post(handlers::create_email).get(handlers::list_emails))
        .route("/emails/:id", get(handlers::get_email))
        .route("/emails/:id/deliver", post(handlers::deliver_email))
}

/// V1 route constants for clients and documentation.
pub mod paths {
    pub const EMAILS: &str = "/api/v1/emails";
    pub const EMAIL: &str = "/api/v1/emails/:id";
    pub const EMAIL_DELIVER: &str = "/api/v1/emails/:id/deliver";

    /// Fill the `:id` segment of a route constant.
    pub fn with_id(path: &str, id: impl std::fmt::Display) -> String {
        path.replace(":id", &id.to_string())
    }
}
