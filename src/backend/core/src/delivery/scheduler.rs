//! Periodic dispatch of jobs whose scheduled time has arrived.

use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::WorkerHandle;
use crate::error::{ErrorCode, Result};
use crate::store::EmailJobStore;

/// Floor for the poll interval; `tokio::time::interval` panics on zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the due-job scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between scans
    pub poll_interval: Duration,
    /// Maximum jobs dispatched per scan
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
        }
    }
}

/// Scans the store for due `Pending` jobs and hands them to the worker.
pub struct DueJobScheduler {
    store: Arc<dyn EmailJobStore>,
    worker: WorkerHandle,
    config: SchedulerConfig,
}

impl DueJobScheduler {
    pub fn new(store: Arc<dyn EmailJobStore>, worker: WorkerHandle, config: SchedulerConfig) -> Self {
        Self {
            store,
            worker,
            config,
        }
    }

    /// Spawn the polling loop.
    pub fn start(
        store: Arc<dyn EmailJobStore>,
        worker: WorkerHandle,
        config: SchedulerConfig,
    ) -> SchedulerHandle {
        Self::new(store, worker, config).spawn()
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                poll_interval_ms = self.config.poll_interval.as_millis() as u64,
                batch_size = self.config.batch_size,
                "Due-job scheduler started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick().await {
                            warn!(error = %e, "Due-job scan failed");
                        }
                    }
                }
            }

            info!("Due-job scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Run one scan, returning how many ids were newly queued.
    ///
    /// Ids the worker already holds, queued or mid-send, are not counted.
    pub async fn tick(&self) -> Result<usize> {
        let due = self.store.due_jobs(Utc::now(), self.config.batch_size).await?;
        let mut dispatched = 0;

        for job in due {
            match self.worker.dispatch(job.id) {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(e) if e.code() == ErrorCode::WorkerUnavailable => {
                    debug!(error = %e, "Worker not accepting, ending scan early");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if dispatched > 0 {
            debug!(dispatched, "Dispatched due jobs");
            counter!("courier_scheduler_dispatched_total").increment(dispatched as u64);
        }
        Ok(dispatched)
    }
}

/// Stops a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Scheduler task panicked");
        }
    }
}
