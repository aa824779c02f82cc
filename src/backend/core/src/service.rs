//! Inbound operations on email jobs, shared by the HTTP API and the CLI.

use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::delivery::{DeliveryOrchestrator, DeliveryOutcome, WorkerHandle};
use crate::email::{EmailJob, EmailJobId, NewEmailJob};
use crate::error::{CourierError, Result};
use crate::store::EmailJobStore;

/// A page of jobs plus the total count.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EmailJobPage {
    pub items: Vec<EmailJob>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// Maximum page size for listings.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct EmailJobService {
    store: Arc<dyn EmailJobStore>,
    orchestrator: Arc<DeliveryOrchestrator>,
    worker: WorkerHandle,
}

impl EmailJobService {
    pub fn new(
        store: Arc<dyn EmailJobStore>,
        orchestrator: Arc<DeliveryOrchestrator>,
        worker: WorkerHandle,
    ) -> Self {
        Self {
            store,
            orchestrator,
            worker,
        }
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    /// Persist a new job and queue it if it is already due.
    ///
    /// A job that cannot be queued right now stays `Pending` and is picked up
    /// by the scheduler, so a full queue does not fail the request.
    pub async fn create_email_job(&self, input: NewEmailJob) -> Result<EmailJob> {
        let job = self.store.create(input).await?;
        counter!("courier_email_jobs_created_total").increment(1);
        info!(job_id = %job.id, scheduled = job.scheduled_time.is_some(), "Email job created");

        if job.is_due(Utc::now()) {
            if let Err(e) = self.worker.dispatch(job.id) {
                warn!(job_id = %job.id, error = %e, "Immediate dispatch refused, leaving for scheduler");
            }
        }
        Ok(job)
    }

    /// Queue a job for delivery and return its current state.
    pub async fn trigger_delivery(&self, id: EmailJobId) -> Result<EmailJob> {
        let job = self.store.get_by_id(id).await?;
        if !job.is_terminal() && !self.worker.dispatch(id)? {
            debug!(job_id = %id, "Delivery already queued or in progress");
        }
        Ok(job)
    }

    /// Deliver and wait for the outcome.
    ///
    /// The delivery runs on its own task, so a caller that gives up waiting
    /// does not cut a send short before its outcome is recorded.
    pub async fn deliver_now(&self, id: EmailJobId) -> Result<DeliveryOutcome> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.deliver(id).await })
            .await
            .map_err(|e| CourierError::internal(format!("delivery task failed: {}", e)))?
    }

    pub async fn get_email_job(&self, id: EmailJobId) -> Result<EmailJob> {
        self.store.get_by_id(id).await
    }

    pub async fn list_email_jobs(&self, limit: usize, offset: usize) -> Result<EmailJobPage> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let items = self.store.list(limit, offset).await?;
        let total = self.store.count().await?;
        Ok(EmailJobPage {
            items,
            total,
            limit,
            offset,
        })
    }
}
