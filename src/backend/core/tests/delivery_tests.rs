//! Delivery lifecycle tests.
//!
//! Tests cover:
//! - Job creation and validation
//! - Single delivery outcomes (sent, failed, not found)
//! - Idempotent re-delivery of terminal jobs
//! - Per-job serialization under concurrent delivery
//! - Send timeout
//! - Store conflict on stale writes

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_core::delivery::{DeliveryOrchestrator, DeliveryOutcome};
use courier_core::email::{EmailJob, EmailJobId, EmailStatus, NewEmailJob};
use courier_core::error::ErrorCode;
use courier_core::store::{EmailJobStore, InMemoryEmailJobStore};
use courier_core::transport::RecordingTransport;

fn setup(transport: RecordingTransport) -> (Arc<DeliveryOrchestrator>, InMemoryEmailJobStore) {
    setup_with_timeout(transport, Duration::from_secs(5))
}

fn setup_with_timeout(
    transport: RecordingTransport,
    send_timeout: Duration,
) -> (Arc<DeliveryOrchestrator>, InMemoryEmailJobStore) {
    let store = InMemoryEmailJobStore::new();
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(transport),
        send_timeout,
    ));
    (orchestrator, store)
}

async fn create(store: &InMemoryEmailJobStore, recipient: &str) -> EmailJob {
    store
        .create(NewEmailJob::new(recipient, "Hi", "Test"))
        .await
        .unwrap()
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_created_job_is_pending_without_outcome_fields() {
    let store = InMemoryEmailJobStore::new();
    let job = create(&store, "a@example.com").await;

    assert_eq!(job.status, EmailStatus::Pending);
    assert!(job.sent_time.is_none());
    assert!(job.delivery_error.is_none());
}

#[tokio::test]
async fn test_empty_fields_are_rejected_and_nothing_is_stored() {
    let store = InMemoryEmailJobStore::new();

    for input in [
        NewEmailJob::new("", "Hi", "Test"),
        NewEmailJob::new("a@example.com", "", "Test"),
        NewEmailJob::new("a@example.com", "Hi", ""),
    ] {
        let err = store.create(input).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingRequiredField);
    }
    assert_eq!(store.count().await.unwrap(), 0);
}

// ============================================================================
// Single Delivery
// ============================================================================

#[tokio::test]
async fn test_successful_send_marks_job_sent() {
    let transport = RecordingTransport::new();
    let (orchestrator, store) = setup(transport.clone());
    let job = create(&store, "a@example.com").await;

    let before = Utc::now();
    let outcome = orchestrator.deliver(job.id).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Sent(_)));

    let stored = store.get_by_id(job.id).await.unwrap();
    assert_eq!(stored.status, EmailStatus::Sent);
    assert!(stored.sent_time.unwrap() >= before);
    assert!(stored.delivery_error.is_none());

    let sent = transport.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "a@example.com");
    assert_eq!(sent[0].subject, "Hi");
    assert_eq!(sent[0].body, "Test");
}

#[tokio::test]
async fn test_relay_rejection_marks_job_failed_with_reason() {
    let transport = RecordingTransport::builder()
        .fail_recipient("bad@", "relay rejected recipient")
        .build();
    let (orchestrator, store) = setup(transport);
    let job = create(&store, "bad@").await;

    let outcome = orchestrator.deliver(job.id).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Failed(_)));

    let stored = store.get_by_id(job.id).await.unwrap();
    assert_eq!(stored.status, EmailStatus::Failed);
    assert_eq!(stored.delivery_error.as_deref(), Some("relay rejected recipient"));
    assert!(stored.sent_time.is_none());
}

#[tokio::test]
async fn test_unknown_job_is_not_found_without_side_effects() {
    let transport = RecordingTransport::new();
    let (orchestrator, store) = setup(transport.clone());
    create(&store, "a@example.com").await;

    let err = orchestrator.deliver(EmailJobId::new()).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(transport.send_count(), 0);

    let jobs = store.list(10, 0).await.unwrap();
    assert!(jobs.iter().all(|j| j.status == EmailStatus::Pending));
}

#[tokio::test]
async fn test_exactly_one_outcome_is_recorded() {
    let transport = RecordingTransport::builder()
        .fail_recipient("bad@", "relay rejected recipient")
        .build();
    let (orchestrator, store) = setup(transport);

    for recipient in ["a@example.com", "bad@"] {
        let job = create(&store, recipient).await;
        orchestrator.deliver(job.id).await.unwrap();

        let stored = store.get_by_id(job.id).await.unwrap();
        let sent = stored.status == EmailStatus::Sent && stored.sent_time.is_some();
        let failed = stored.status == EmailStatus::Failed && stored.delivery_error.is_some();
        assert!(sent ^ failed, "unexpected state: {:?}", stored);
    }
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_second_delivery_is_a_no_op() {
    let transport = RecordingTransport::new();
    let (orchestrator, store) = setup(transport.clone());
    let job = create(&store, "a@example.com").await;

    orchestrator.deliver(job.id).await.unwrap();
    let after_first = store.get_by_id(job.id).await.unwrap();

    let outcome = orchestrator.deliver(job.id).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::AlreadyTerminal(_)));
    assert_eq!(outcome.job(), &after_first);

    assert_eq!(store.get_by_id(job.id).await.unwrap(), after_first);
    assert_eq!(transport.send_count(), 1);
}

#[tokio::test]
async fn test_failed_job_is_not_retried() {
    let transport = RecordingTransport::failing("connection refused");
    let (orchestrator, store) = setup(transport.clone());
    let job = create(&store, "a@example.com").await;

    orchestrator.deliver(job.id).await.unwrap();
    let outcome = orchestrator.deliver(job.id).await.unwrap();

    assert_eq!(outcome.as_str(), "already_terminal");
    assert_eq!(outcome.job().delivery_error.as_deref(), Some("connection refused"));
    assert_eq!(transport.send_count(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_send_once() {
    let transport = RecordingTransport::builder()
        .delay(Duration::from_millis(50))
        .build();
    let (orchestrator, store) = setup(transport.clone());
    let job = create(&store, "a@example.com").await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let orchestrator = Arc::clone(&orchestrator);
        tasks.push(tokio::spawn(async move { orchestrator.deliver(job.id).await }));
    }

    let mut sent = 0;
    let mut skipped = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            DeliveryOutcome::Sent(_) => sent += 1,
            DeliveryOutcome::AlreadyTerminal(_) => skipped += 1,
            DeliveryOutcome::Failed(job) => panic!("unexpected failure: {:?}", job),
        }
    }

    assert_eq!(sent, 1);
    assert_eq!(skipped, 9);
    assert_eq!(transport.send_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_jobs_deliver_in_parallel() {
    let transport = RecordingTransport::builder()
        .delay(Duration::from_millis(200))
        .build();
    let (orchestrator, store) = setup(transport.clone());

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(create(&store, &format!("user{}@example.com", i)).await.id);
    }

    let started = std::time::Instant::now();
    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.deliver(id).await })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        assert!(matches!(result.unwrap().unwrap(), DeliveryOutcome::Sent(_)));
    }

    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(transport.send_count(), 5);
}

// ============================================================================
// Timeout
// ============================================================================

#[tokio::test]
async fn test_hung_transport_fails_with_timeout() {
    let transport = RecordingTransport::builder()
        .delay(Duration::from_secs(30))
        .build();
    let (orchestrator, store) = setup_with_timeout(transport, Duration::from_millis(50));
    let job = create(&store, "a@example.com").await;

    let outcome = orchestrator.deliver(job.id).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Failed(_)));

    let stored = store.get_by_id(job.id).await.unwrap();
    assert_eq!(stored.status, EmailStatus::Failed);
    assert_eq!(stored.delivery_error.as_deref(), Some("timeout"));
}

// ============================================================================
// Store Conflicts
// ============================================================================

#[tokio::test]
async fn test_stale_update_conflicts_and_keeps_first_outcome() {
    let store = InMemoryEmailJobStore::new();
    let job = create(&store, "a@example.com").await;

    let mut first = job.clone();
    first.mark_sent(Utc::now()).unwrap();
    let mut second = job.clone();
    second.mark_failed("late").unwrap();

    store.update(&first).await.unwrap();
    let err = store.update(&second).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::EmailJobConflict);

    let stored = store.get_by_id(job.id).await.unwrap();
    assert_eq!(stored.status, EmailStatus::Sent);
    assert!(stored.delivery_error.is_none());
}

#[tokio::test]
async fn test_job_finished_by_another_writer_is_skipped() {
    let transport = RecordingTransport::new();
    let (orchestrator, store) = setup(transport);
    let job = create(&store, "a@example.com").await;

    let mut done = job.clone();
    done.mark_failed("delivered elsewhere").unwrap();
    store.insert(done);

    let outcome = orchestrator.deliver(job.id).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::AlreadyTerminal(_)));
    assert_eq!(outcome.job().delivery_error.as_deref(), Some("delivered elsewhere"));
}

/// Lets another writer finish the job right after it is read, as a second
/// process sharing the database would.
struct RacingStore {
    inner: InMemoryEmailJobStore,
}

#[async_trait::async_trait]
impl EmailJobStore for RacingStore {
    async fn create(&self, input: NewEmailJob) -> courier_core::Result<EmailJob> {
        self.inner.create(input).await
    }

    async fn get_by_id(&self, id: EmailJobId) -> courier_core::Result<EmailJob> {
        let job = self.inner.get_by_id(id).await?;
        let mut other = job.clone();
        if other.mark_sent(Utc::now()).is_ok() {
            self.inner.insert(other);
        }
        Ok(job)
    }

    async fn update(&self, job: &EmailJob) -> courier_core::Result<()> {
        self.inner.update(job).await
    }

    async fn due_jobs(
        &self,
        now: chrono::DateTime<Utc>,
        limit: usize,
    ) -> courier_core::Result<Vec<EmailJob>> {
        self.inner.due_jobs(now, limit).await
    }

    async fn list(&self, limit: usize, offset: usize) -> courier_core::Result<Vec<EmailJob>> {
        self.inner.list(limit, offset).await
    }

    async fn count(&self) -> courier_core::Result<u64> {
        self.inner.count().await
    }
}

#[tokio::test]
async fn test_cross_writer_race_is_a_conflict() {
    let inner = InMemoryEmailJobStore::new();
    let job = create(&inner, "a@example.com").await;
    let orchestrator = DeliveryOrchestrator::new(
        Arc::new(RacingStore {
            inner: inner.clone(),
        }),
        Arc::new(RecordingTransport::failing("relay rejected recipient")),
        Duration::from_secs(5),
    );

    let err = orchestrator.deliver(job.id).await.unwrap_err();
    assert!(err.is_conflict());

    let stored = inner.get_by_id(job.id).await.unwrap();
    assert_eq!(stored.status, EmailStatus::Sent);
    assert!(stored.delivery_error.is_none());
}
