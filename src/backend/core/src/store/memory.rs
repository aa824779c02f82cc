//! In-memory email job store for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::EmailJobStore;
use crate::email::{EmailJob, EmailJobId, NewEmailJob};
use crate::error::{CourierError, Result};

/// `DashMap`-backed store. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct InMemoryEmailJobStore {
    jobs: Arc<DashMap<EmailJobId, EmailJob>>,
}

impl InMemoryEmailJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job as-is, bypassing validation. Useful for seeding fixtures.
    pub fn insert(&self, job: EmailJob) {
        self.jobs.insert(job.id, job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl EmailJobStore for InMemoryEmailJobStore {
    async fn create(&self, input: NewEmailJob) -> Result<EmailJob> {
        let job = EmailJob::create(input)?;
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_by_id(&self, id: EmailJobId) -> Result<EmailJob> {
        self.jobs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CourierError::email_job_not_found(id))
    }

    async fn update(&self, job: &EmailJob) -> Result<()> {
        // The entry guard holds the shard lock for the check and the write.
        match self.jobs.entry(job.id) {
            Entry::Vacant(_) => Err(CourierError::email_job_not_found(job.id)),
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                if stored.is_terminal() {
                    return Err(CourierError::email_job_conflict(job.id, stored.status));
                }
                stored.status = job.status;
                stored.sent_time = job.sent_time;
                stored.delivery_error = job.delivery_error.clone();
                Ok(())
            }
        }
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<EmailJob>> {
        let mut due: Vec<EmailJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().is_due(now))
            .map(|entry| entry.value().clone())
            .collect();
        due.sort_by_key(|job| (job.scheduled_time.unwrap_or(job.created_at), job.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<EmailJob>> {
        let mut all: Vec<EmailJob> = self.jobs.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.jobs.len() as u64)
    }
}
