//! The delivery state machine.
//!
//! [`DeliveryOrchestrator::deliver`] is the only code path that moves a job
//! out of `Pending`. For a given id it runs one step at a time:
//!
//! ```text
//! Pending --(send ok)------> Sent     (sent_time = now, UTC)
//! Pending --(send failed)--> Failed   (delivery_error = reason)
//! Sent | Failed ----------> unchanged, no send
//! ```

use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::locks::JobLocks;
use crate::email::{EmailJob, EmailJobId};
use crate::error::Result;
use crate::store::EmailJobStore;
use crate::transport::{DeliveryFailure, MailTransport, OutboundMessage};

/// Result of one `deliver` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "job", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The relay accepted the message
    Sent(EmailJob),
    /// The attempt failed; the reason is on the job
    Failed(EmailJob),
    /// The job had already been attempted; nothing was sent
    AlreadyTerminal(EmailJob),
}

impl DeliveryOutcome {
    pub fn job(&self) -> &EmailJob {
        match self {
            Self::Sent(job) | Self::Failed(job) | Self::AlreadyTerminal(job) => job,
        }
    }

    pub fn into_job(self) -> EmailJob {
        match self {
            Self::Sent(job) | Self::Failed(job) | Self::AlreadyTerminal(job) => job,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent(_) => "sent",
            Self::Failed(_) => "failed",
            Self::AlreadyTerminal(_) => "already_terminal",
        }
    }
}

/// Drives a job through its single delivery attempt.
pub struct DeliveryOrchestrator {
    store: Arc<dyn EmailJobStore>,
    transport: Arc<dyn MailTransport>,
    send_timeout: Duration,
    locks: JobLocks,
}

impl DeliveryOrchestrator {
    pub fn new(
        store: Arc<dyn EmailJobStore>,
        transport: Arc<dyn MailTransport>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            send_timeout,
            locks: JobLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn EmailJobStore> {
        &self.store
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Attempt delivery of `id`.
    ///
    /// Transport failures end up on the job as `Failed`; only store errors
    /// (not found, conflict, database) are returned as `Err`. Calling this
    /// again for a job that is already `Sent` or `Failed` sends nothing.
    #[instrument(skip_all, fields(job_id = %id))]
    pub async fn deliver(&self, id: EmailJobId) -> Result<DeliveryOutcome> {
        let _guard = self.locks.acquire(id).await;

        let mut job = self.store.get_by_id(id).await?;

        if job.is_terminal() {
            debug!(status = %job.status, "Job already attempted, skipping");
            counter!("courier_deliveries_total", "outcome" => "already_terminal").increment(1);
            return Ok(DeliveryOutcome::AlreadyTerminal(job));
        }

        let message = OutboundMessage::from(&job);
        let started = Instant::now();
        let result = self.send_with_timeout(&message).await;
        histogram!("courier_delivery_duration_seconds").record(started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(()) => {
                job.mark_sent(Utc::now())?;
                self.store.update(&job).await?;
                info!(recipient = %job.recipient, "Email sent");
                DeliveryOutcome::Sent(job)
            }
            Err(failure) => {
                warn!(recipient = %job.recipient, reason = %failure.reason, "Email delivery failed");
                job.mark_failed(failure.reason)?;
                self.store.update(&job).await?;
                DeliveryOutcome::Failed(job)
            }
        };

        counter!("courier_deliveries_total", "outcome" => outcome.as_str()).increment(1);
        Ok(outcome)
    }

    async fn send_with_timeout(
        &self,
        message: &OutboundMessage,
    ) -> std::result::Result<(), DeliveryFailure> {
        match tokio::time::timeout(self.send_timeout, self.transport.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryFailure::timeout()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{EmailStatus, NewEmailJob};
    use crate::store::InMemoryEmailJobStore;
    use crate::transport::RecordingTransport;

    fn orchestrator(
        transport: RecordingTransport,
    ) -> (DeliveryOrchestrator, InMemoryEmailJobStore) {
        let store = InMemoryEmailJobStore::new();
        let orchestrator = DeliveryOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(transport),
            Duration::from_secs(5),
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_success_marks_sent() {
        let transport = RecordingTransport::new();
        let (orchestrator, store) = orchestrator(transport.clone());
        let job = store
            .create(NewEmailJob::new("a@example.com", "Hi", "Test"))
            .await
            .unwrap();

        let outcome = orchestrator.deliver(job.id).await.unwrap();
        assert_eq!(outcome.as_str(), "sent");

        let stored = store.get_by_id(job.id).await.unwrap();
        assert_eq!(stored.status, EmailStatus::Sent);
        assert!(stored.sent_time.is_some());
        assert!(stored.delivery_error.is_none());
        assert_eq!(transport.send_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_returned() {
        let (orchestrator, store) = orchestrator(RecordingTransport::failing("connection refused"));
        let job = store
            .create(NewEmailJob::new("a@example.com", "Hi", "Test"))
            .await
            .unwrap();

        let outcome = orchestrator.deliver(job.id).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Failed(_)));
        assert_eq!(
            outcome.job().delivery_error.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let job = EmailJob::create(NewEmailJob::new("a@example.com", "Hi", "Test")).unwrap();
        let value = serde_json::to_value(DeliveryOutcome::AlreadyTerminal(job)).unwrap();
        assert_eq!(value["outcome"], "already_terminal");
        assert_eq!(value["job"]["recipient"], "a@example.com");
    }
}
