//! Reference worker runner and retention sweeper

mod common;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{enqueue, sqlite_queue};
use m3u_job_queue::{
    config::{RetentionConfig, WorkerConfig},
    job_scheduling::{HandlerRegistry, JobHandler, JobQueue, JobQueueRunner, RetentionSweeper},
    models::{CreateJobRequest, Job, JobOutcome, JobStatus, JobType},
    utils::now_utc,
};

struct Succeeds {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl JobHandler for Succeeds {
    async fn execute(&self, job: &Job) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("ingested {}", job.target_id)))
    }
}

struct Fails;

#[async_trait]
impl JobHandler for Fails {
    async fn execute(&self, _job: &Job) -> Result<Option<String>> {
        bail!("source unreachable")
    }
}

struct Panics;

#[async_trait]
impl JobHandler for Panics {
    async fn execute(&self, _job: &Job) -> Result<Option<String>> {
        panic!("handler bug")
    }
}

fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(10),
        max_poll_interval: Duration::from_millis(50),
        jitter_percent: 0,
        concurrency: 3,
        worker_id_prefix: "test-worker".to_string(),
        ..WorkerConfig::default()
    }
}

fn runner_with(queue: &JobQueue, registry: HandlerRegistry) -> JobQueueRunner {
    JobQueueRunner::new(queue.clone(), registry, fast_worker_config())
}

#[tokio::test]
async fn test_worker_ids_use_prefix() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let runner = runner_with(&fixture.queue, HandlerRegistry::new());
    assert_eq!(
        runner.worker_ids(),
        vec!["test-worker-1", "test-worker-2", "test-worker-3"]
    );
    Ok(())
}

#[tokio::test]
async fn test_process_next_on_empty_queue() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let runner = runner_with(&fixture.queue, HandlerRegistry::new());
    assert!(!runner.process_next("test-worker-1").await?);
    Ok(())
}

#[tokio::test]
async fn test_successful_handler_completes_job() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(
        JobType::StreamIngestion,
        Succeeds {
            calls: calls.clone(),
        },
    );
    let runner = runner_with(&fixture.queue, registry);

    let job = enqueue(&fixture.queue, JobType::StreamIngestion, "S1", 0).await;
    assert!(runner.process_next("test-worker-1").await?);

    let stored = fixture.queue.get_by_id(&job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result.as_deref(), Some("ingested S1"));
    assert!(stored.locked_by.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let history = fixture.queue.get_history_for_job(&job.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].worker_id.as_deref(), Some("test-worker-1"));
    Ok(())
}

#[tokio::test]
async fn test_failing_handler_retries_then_fails() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::EpgIngestion, Fails);
    let runner = runner_with(&fixture.queue, registry);

    let job = fixture
        .queue
        .create(CreateJobRequest::new(JobType::EpgIngestion, "E1").with_max_attempts(2))
        .await?;

    assert!(runner.process_next("test-worker-1").await?);
    let after_first = fixture.queue.get_by_id(&job.id).await?.unwrap();
    assert_eq!(after_first.status, JobStatus::Scheduled);
    assert!(after_first.next_run_at.unwrap() > now_utc());
    assert_eq!(after_first.error_message.as_deref(), Some("source unreachable"));

    // Make the retry due now instead of waiting out the backoff
    fixture.queue.reschedule_job(&job.id, now_utc()).await?.unwrap();

    assert!(runner.process_next("test-worker-1").await?);
    let after_second = fixture.queue.get_by_id(&job.id).await?.unwrap();
    assert_eq!(after_second.status, JobStatus::Failed);
    assert_eq!(after_second.attempt_count, 2);
    assert!(after_second.completed_at.is_some());

    let history = fixture.queue.get_history_for_job(&job.id).await?;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|entry| entry.status == JobStatus::Failed));
    assert_eq!(history[0].attempt_number, 1);
    assert_eq!(history[1].attempt_number, 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_handler_fails_job() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let runner = runner_with(&fixture.queue, HandlerRegistry::new());
    let job = enqueue(&fixture.queue, JobType::Encoding, "R1", 0).await;

    assert!(runner.process_next("test-worker-1").await?);
    let stored = fixture.queue.get_by_id(&job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(
        stored
            .error_message
            .unwrap()
            .contains("no handler registered for job type encoding")
    );
    Ok(())
}

#[tokio::test]
async fn test_panicking_handler_fails_attempt_without_killing_worker() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::Maintenance, Panics);
    let runner = runner_with(&fixture.queue, registry);

    let job = fixture
        .queue
        .create(CreateJobRequest::new(JobType::Maintenance, "vacuum").with_max_attempts(1))
        .await?;

    assert!(runner.process_next("test-worker-1").await?);
    let stored = fixture.queue.get_by_id(&job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_message.unwrap().contains("panicked"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_drains_queue_and_stops_on_cancel() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(
        JobType::ProxyRegeneration,
        Succeeds {
            calls: calls.clone(),
        },
    );
    let runner = runner_with(&fixture.queue, registry);

    for n in 0..10 {
        enqueue(&fixture.queue, JobType::ProxyRegeneration, &format!("P{n}"), 0).await;
    }

    let token = CancellationToken::new();
    let handle = tokio::spawn({
        let runner = runner.clone();
        let token = token.clone();
        async move { runner.run(token).await }
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let completed = fixture.queue.get_by_status(JobStatus::Completed).await?;
        if completed.len() == 10 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "runner did not drain the queue in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await???;

    // Every job ran exactly once
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(fixture.queue.get_history(None, 0, 100).await?.total, 10);
    Ok(())
}

#[tokio::test]
async fn test_retention_sweeper_run_once() -> Result<()> {
    let fixture = sqlite_queue().await?;
    let queue = &fixture.queue;

    let job = enqueue(queue, JobType::StreamIngestion, "S1", 0).await;
    queue.acquire_job("worker-1").await?.unwrap();
    queue
        .complete_job(&job.id, "worker-1", JobOutcome::Completed { result: None })
        .await?
        .unwrap();
    let outstanding = enqueue(queue, JobType::StreamIngestion, "S2", 0).await;

    let sweeper = RetentionSweeper::from_config(
        queue.clone(),
        &RetentionConfig {
            completed_job_retention: Duration::from_secs(3600),
            history_retention: Duration::from_secs(2 * 3600),
            sweep_interval: Duration::from_secs(60),
        },
    );

    // Nothing is old enough yet
    let report = sweeper.run_once().await?;
    assert_eq!(report.jobs_deleted, 0);
    assert_eq!(report.history_deleted, 0);

    // Ninety minutes later the job is past retention, its history is not
    let report = sweeper
        .sweep_at(now_utc() + ChronoDuration::minutes(90))
        .await?;
    assert_eq!(report.jobs_deleted, 1);
    assert_eq!(report.history_deleted, 0);

    let report = sweeper.sweep_at(now_utc() + ChronoDuration::hours(3)).await?;
    assert_eq!(report.history_deleted, 1);

    assert!(queue.get_by_id(&outstanding.id).await?.is_some());
    Ok(())
}
