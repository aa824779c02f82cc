//! Durable storage for email jobs.
//!
//! Two backends implement [`EmailJobStore`]:
//!
//! - [`crate::db::Database`]: PostgreSQL via sqlx, used by the server
//! - [`InMemoryEmailJobStore`]: a `DashMap`, used in tests and development
//!
//! Both enforce the same write rule: `update` only succeeds while the stored
//! job is still `Pending`, so a terminal status can never be overwritten.

mod memory;

pub use memory::InMemoryEmailJobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::email::{EmailJob, EmailJobId, NewEmailJob};
use crate::error::Result;

/// Storage operations for email jobs.
#[async_trait]
pub trait EmailJobStore: Send + Sync {
    /// Validate and persist a new `Pending` job.
    async fn create(&self, input: NewEmailJob) -> Result<EmailJob>;

    /// Fetch a job, failing with `EmailJobNotFound` if it does not exist.
    async fn get_by_id(&self, id: EmailJobId) -> Result<EmailJob>;

    /// Persist `status`, `sent_time` and `delivery_error`.
    ///
    /// Fails with `EmailJobNotFound` if the job is gone and with
    /// `EmailJobConflict` if the stored job is already terminal.
    async fn update(&self, job: &EmailJob) -> Result<()>;

    /// Pending jobs whose scheduled time is unset or not after `now`, oldest first.
    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<EmailJob>>;

    /// Jobs ordered by creation time, newest first.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<EmailJob>>;

    /// Total number of stored jobs.
    async fn count(&self) -> Result<u64>;
}
