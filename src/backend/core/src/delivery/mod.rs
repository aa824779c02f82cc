//! Delivery pipeline: the per-job state machine, the worker pool that runs
//! it off the request path, and the scheduler that feeds it due jobs.

mod locks;
mod orchestrator;
mod scheduler;
mod worker;

pub use locks::{JobLockGuard, JobLocks};
pub use orchestrator::{DeliveryOrchestrator, DeliveryOutcome};
pub use scheduler::{DueJobScheduler, SchedulerConfig, SchedulerHandle};
pub use worker::{DeliveryWorker, WorkerConfig, WorkerHandle, WorkerStats, WorkerStatsSnapshot};
