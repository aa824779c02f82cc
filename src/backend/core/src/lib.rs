#![allow(clippy::result_large_err)]
//! # Courier Core
//!
//! Outbound email delivery jobs over an SMTP relay.
//!
//! ## Architecture
//!
//! - **Email jobs**: the record and its `Pending -> Sent | Failed` lifecycle
//! - **Store**: PostgreSQL (sqlx) or in-memory persistence with conditional updates
//! - **Transport**: one SMTP send attempt per call (lettre), failures as reasons
//! - **Delivery**: per-job serialized orchestrator, worker pool, due-job scheduler
//! - **API**: axum REST endpoints and Prometheus metrics
//! - **Telemetry**: structured logging, OTLP span export, metrics

pub mod api;
pub mod config;
pub mod db;
pub mod delivery;
pub mod email;
pub mod error;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod transport;

pub use error::{CourierError, ErrorCode, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::delivery::{
        DeliveryOrchestrator, DeliveryOutcome, DeliveryWorker, DueJobScheduler, SchedulerConfig,
        WorkerConfig, WorkerHandle,
    };
    pub use crate::email::{EmailJob, EmailJobId, EmailStatus, NewEmailJob};
    pub use crate::error::{CourierError, ErrorCode, Result};
    pub use crate::service::EmailJobService;
    pub use crate::store::{EmailJobStore, InMemoryEmailJobStore};
    pub use crate::transport::{
        DeliveryFailure, MailTransport, OutboundMessage, RecordingTransport, SmtpMailTransport,
    };
}
