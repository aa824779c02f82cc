//! Per-job mutual exclusion.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::email::EmailJobId;

/// Keyed async locks, one per job id, created on demand.
///
/// Entries are dropped once the last holder or waiter releases them, so the
/// map only grows with the number of jobs currently being worked on.
#[derive(Default)]
pub struct JobLocks {
    locks: Arc<DashMap<EmailJobId, Arc<Mutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder has `id`, then hold it until the guard drops.
    ///
    /// The guard exists before the wait starts, so a waiter dropped while
    /// queued still removes an entry nobody else references.
    pub async fn acquire(&self, id: EmailJobId) -> JobLockGuard {
        let mut held = JobLockGuard {
            id,
            guard: None,
            locks: Arc::clone(&self.locks),
        };
        // Clone under the shard lock so the count seen by cleanup is exact.
        let mutex = self.locks.entry(id).or_default().value().clone();
        held.guard = Some(mutex.lock_owned().await);
        held
    }

    /// Number of ids with a holder or waiter.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Releases the job lock on drop.
pub struct JobLockGuard {
    id: EmailJobId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<EmailJobId, Arc<Mutex<()>>>>,
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
