//! Background delivery worker.
//!
//! Job ids are queued on a bounded channel and drained by a dispatcher task
//! that runs each delivery on its own tokio task, at most `concurrency` at a
//! time. Request handlers only enqueue; the SMTP round trip never happens on
//! the request path.
//!
//! An id is held from `dispatch` until its delivery finishes. Dispatching a
//! held id again is a no-op, so a slow send never queues duplicates that
//! would sit on permits waiting for the job lock.

use dashmap::DashSet;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{DeliveryOrchestrator, DeliveryOutcome};
use crate::email::EmailJobId;
use crate::error::{CourierError, Result};

/// Configuration for the delivery worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent deliveries
    pub concurrency: usize,
    /// Ids that may wait in the queue before `dispatch` is refused
    pub queue_capacity: usize,
    /// How long `shutdown` waits for in-flight deliveries
    pub shutdown_timeout: Duration,
    /// Worker name, used in logs
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(30),
            name: "courier-delivery".to_string(),
        }
    }
}

/// Counters for the delivery worker. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    dispatched: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    errored: Arc<AtomicU64>,
    active: Arc<AtomicU64>,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WorkerStatsSnapshot {
    pub dispatched: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub active: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids accepted by `dispatch`
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Deliveries that found the job already terminal
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Deliveries that ended in a store error
    pub fn errored(&self) -> u64 {
        self.errored.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Deliveries that have finished, whatever their outcome.
    pub fn completed(&self) -> u64 {
        self.sent() + self.failed() + self.skipped() + self.errored()
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            dispatched: self.dispatched(),
            sent: self.sent(),
            failed: self.failed(),
            skipped: self.skipped(),
            errored: self.errored(),
            active: self.active(),
        }
    }

    fn record(&self, result: &Result<DeliveryOutcome>) {
        let counter = match result {
            Ok(DeliveryOutcome::Sent(_)) => &self.sent,
            Ok(DeliveryOutcome::Failed(_)) => &self.failed,
            Ok(DeliveryOutcome::AlreadyTerminal(_)) => &self.skipped,
            Err(_) => &self.errored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle for feeding and stopping a running worker. Cheap to clone.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<EmailJobId>,
    held: Arc<DashSet<EmailJobId>>,
    accepting: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
    stats: WorkerStats,
}

impl WorkerHandle {
    /// Queue `id` for delivery.
    ///
    /// Returns `false` without queueing when `id` is already queued or being
    /// delivered. Fails with `WorkerUnavailable` when the queue is full or
    /// the worker has been shut down; the job stays `Pending` in that case.
    pub fn dispatch(&self, id: EmailJobId) -> Result<bool> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(CourierError::worker_unavailable("worker is shutting down"));
        }
        if !self.held.insert(id) {
            return Ok(false);
        }

        self.sender.try_send(id).map_err(|e| {
            self.held.remove(&id);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    CourierError::worker_unavailable("delivery queue is full")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    CourierError::worker_unavailable("worker has stopped")
                }
            }
        })?;

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Whether `id` is queued or being delivered.
    pub fn is_held(&self, id: EmailJobId) -> bool {
        self.held.contains(&id)
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting ids and wait for in-flight deliveries.
    ///
    /// Ids still queued are abandoned and remain `Pending`. Waiting is
    /// bounded by the configured shutdown timeout.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);

        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                warn!(error = %e, "Delivery dispatcher task panicked");
            }
        }
    }
}

/// Runs deliveries off the request path.
pub struct DeliveryWorker;

impl DeliveryWorker {
    /// Spawn the dispatcher and return its handle.
    pub fn start(orchestrator: Arc<DeliveryOrchestrator>, config: WorkerConfig) -> WorkerHandle {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = WorkerStats::new();
        let held = Arc::new(DashSet::new());

        let dispatcher = tokio::spawn(run_dispatcher(
            orchestrator,
            config,
            receiver,
            shutdown_rx,
            stats.clone(),
            Arc::clone(&held),
        ));

        WorkerHandle {
            sender,
            held,
            accepting: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(shutdown_tx),
            dispatcher: Arc::new(Mutex::new(Some(dispatcher))),
            stats,
        }
    }
}

async fn run_dispatcher(
    orchestrator: Arc<DeliveryOrchestrator>,
    config: WorkerConfig,
    mut receiver: mpsc::Receiver<EmailJobId>,
    mut shutdown: watch::Receiver<bool>,
    stats: WorkerStats,
    held: Arc<DashSet<EmailJobId>>,
) {
    let concurrency = config.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    info!(worker = %config.name, concurrency, "Delivery worker started");

    loop {
        let id = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = receiver.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                held.remove(&id);
                break;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    held.remove(&id);
                    break;
                }
            },
        };

        let orchestrator = Arc::clone(&orchestrator);
        let stats = stats.clone();
        let held = Arc::clone(&held);
        stats.active.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let result = orchestrator.deliver(id).await;
            if let Err(e) = &result {
                warn!(job_id = %id, error = %e, "Delivery could not be completed");
            }
            // Released before the counters move so a caller that saw the
            // outcome can dispatch the id again.
            held.remove(&id);
            stats.record(&result);
            stats.active.fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        });
    }

    receiver.close();
    let mut abandoned = 0usize;
    while let Ok(id) = receiver.try_recv() {
        held.remove(&id);
        abandoned += 1;
    }

    info!(
        worker = %config.name,
        in_flight = stats.active(),
        abandoned,
        "Delivery worker draining"
    );

    // Every permit back means every spawned delivery has finished.
    let drained = tokio::time::timeout(
        config.shutdown_timeout,
        semaphore.acquire_many(concurrency as u32),
    )
    .await;

    match drained {
        Ok(_) => info!(worker = %config.name, "Delivery worker stopped"),
        Err(_) => warn!(
            worker = %config.name,
            in_flight = stats.active(),
            "Delivery worker stopped before in-flight deliveries finished"
        ),
    }
}
