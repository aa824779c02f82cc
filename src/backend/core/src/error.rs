//! Error type shared by the store, the delivery pipeline and the HTTP layer.
//!
//! Every [`CourierError`] carries a stable [`ErrorCode`]. The code decides the
//! HTTP status, how loudly the error is logged and whether a client may retry.
//! Only the user message and the structured context reach API clients; the
//! internal message and source stay in the logs.
//!
//! ```rust,ignore
//! use courier_core::error::{CourierError, Result};
//!
//! fn check(recipient: &str) -> Result<()> {
//!     if recipient.trim().is_empty() {
//!         return Err(CourierError::missing_field("recipient"));
//!     }
//!     Ok(())
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

use crate::telemetry::SensitiveFieldRedactor;

pub type Result<T> = std::result::Result<T, CourierError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes. Serialized names are part of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EmailJobNotFound,
    /// The stored job is already `Sent` or `Failed`.
    EmailJobConflict,
    /// The worker is shutting down or its queue is full.
    WorkerUnavailable,

    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    DatabaseMigrationFailed,
    DuplicateRecord,

    ValidationError,
    MissingRequiredField,
    FieldTooLong,

    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    InternalError,
}

impl ErrorCode {
    /// Numeric form, grouped in blocks of a hundred per category.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::EmailJobNotFound => 1000,
            Self::EmailJobConflict => 1001,
            Self::WorkerUnavailable => 1100,
            Self::DatabaseError => 2000,
            Self::DatabaseConnectionFailed => 2001,
            Self::DatabaseQueryFailed => 2002,
            Self::DatabaseMigrationFailed => 2003,
            Self::DuplicateRecord => 2004,
            Self::ValidationError => 4100,
            Self::MissingRequiredField => 4101,
            Self::FieldTooLong => 4102,
            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,
            Self::InternalError => 9000,
        }
    }

    pub const fn category(&self) -> &'static str {
        match self.numeric_code() / 100 {
            10 => "email_job",
            11 => "delivery",
            20 => "database",
            41 => "validation",
            50 => "configuration",
            _ => "internal",
        }
    }

    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::EmailJobNotFound => StatusCode::NOT_FOUND,
            Self::EmailJobConflict | Self::DuplicateRecord => StatusCode::CONFLICT,
            Self::ValidationError | Self::MissingRequiredField | Self::FieldTooLong => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::WorkerUnavailable | Self::DatabaseConnectionFailed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::EmailJobNotFound
            | Self::EmailJobConflict
            | Self::DuplicateRecord
            | Self::ValidationError
            | Self::MissingRequiredField
            | Self::FieldTooLong => ErrorSeverity::Low,
            Self::WorkerUnavailable => ErrorSeverity::Medium,
            Self::DatabaseConnectionFailed | Self::InternalError => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Whether repeating the same request may succeed without changes.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WorkerUnavailable | Self::DatabaseConnectionFailed | Self::DatabaseQueryFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How loudly an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller mistakes: bad input, unknown ids, repeated triggers.
    Low,
    /// Back-pressure and shutdown.
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CourierError
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct CourierError {
    code: ErrorCode,
    /// Safe to show to API clients.
    message: Cow<'static, str>,
    /// Logged after redaction, never returned to clients.
    internal: Option<String>,
    context: Map<String, Value>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CourierError {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        counter!(
            "courier_errors_total",
            "code" => code.to_string(),
            "category" => code.category(),
            "severity" => code.severity().as_str(),
        )
        .increment(1);

        Self {
            code,
            message: message.into(),
            internal: None,
            context: Map::new(),
            source: None,
        }
    }

    pub fn with_internal(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        internal: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, message);
        error.internal = Some(internal.into());
        error
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", detail)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} must not be empty", field),
        )
        .with_context("field", field)
    }

    pub fn field_too_long(field: &'static str, max_chars: usize) -> Self {
        Self::new(
            ErrorCode::FieldTooLong,
            format!("{} must be at most {} characters", field, max_chars),
        )
        .with_context("field", field)
        .with_context("max_chars", max_chars)
    }

    pub fn email_job_not_found(id: impl fmt::Display) -> Self {
        let id = id.to_string();
        Self::new(ErrorCode::EmailJobNotFound, format!("Email job not found: {}", id))
            .with_context("email_job_id", id)
    }

    /// The job already reached `status`, so it can no longer change.
    pub fn email_job_conflict(id: impl fmt::Display, status: impl fmt::Display) -> Self {
        let id = id.to_string();
        let status = status.to_string();
        Self::new(
            ErrorCode::EmailJobConflict,
            format!("Email job {} is already {}", id, status),
        )
        .with_context("email_job_id", id)
        .with_context("status", status)
    }

    pub fn worker_unavailable(reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::WorkerUnavailable,
            "Delivery worker is not accepting jobs",
            reason,
        )
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a key to the context returned to clients. Unserializable values are dropped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal.as_deref()
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::EmailJobNotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.code == ErrorCode::EmailJobConflict
    }

    /// Emit one event at the level the code's severity calls for.
    pub fn log(&self) {
        let redactor = SensitiveFieldRedactor::global();
        let code = self.code.to_string();
        let internal = self.internal.as_deref().map(|m| redactor.redact_value(m));
        let context: Vec<String> = self
            .context
            .iter()
            .map(|(key, value)| format!("{}={}", key, redactor.redact(key, &value.to_string())))
            .collect();

        match self.code.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => tracing::error!(
                error_code = %code,
                category = self.code.category(),
                severity = self.code.severity().as_str(),
                user_message = %self.message,
                internal = ?internal,
                context = ?context,
                source = ?self.source,
                "request failed"
            ),
            ErrorSeverity::Medium => tracing::warn!(
                error_code = %code,
                category = self.code.category(),
                user_message = %self.message,
                internal = ?internal,
                "request refused"
            ),
            ErrorSeverity::Low => tracing::debug!(
                error_code = %code,
                user_message = %self.message,
                context = ?context,
                "request rejected"
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP rendering
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body. Shares `success`, `error` and `error_code` with `ApiResponse`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: ErrorCode,
    pub numeric_code: u32,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl From<&CourierError> for ErrorResponse {
    fn from(error: &CourierError) -> Self {
        Self {
            success: false,
            error: error.message.to_string(),
            error_code: error.code,
            numeric_code: error.code.numeric_code(),
            retryable: error.is_retryable(),
            context: error.context.clone(),
            timestamp: Utc::now(),
        }
    }
}

impl IntoResponse for CourierError {
    fn into_response(self) -> Response {
        self.log();
        (self.http_status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for CourierError {
    fn from(error: sqlx::Error) -> Self {
        let (code, message) = match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => (
                ErrorCode::DuplicateRecord,
                "A record with this identifier already exists",
            ),
            sqlx::Error::Database(_) => (ErrorCode::DatabaseQueryFailed, "A database error occurred"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to connect to the database",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, message, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for CourierError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::DatabaseMigrationFailed,
            "Database migration failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for CourierError {
    fn from(error: config::ConfigError) -> Self {
        let (code, message) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, message, error.to_string())
    }
}
