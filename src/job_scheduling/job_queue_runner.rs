//! Job queue runner service for executing claimed jobs
//!
//! Each runner spawns `concurrency` polling tasks. A task claims a job,
//! runs the registered handler outside any transaction, and records the
//! outcome through the fenced `complete_job`. Empty polls and storage errors
//! back off exponentially; a successful claim resets the delay.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handlers::HandlerRegistry;
use super::job_queue::JobQueue;
use crate::config::WorkerConfig;
use crate::config::defaults::MAX_RETRY_DELAY;
use crate::errors::JobQueueResult;
use crate::models::{Job, JobOutcome};
use crate::utils::backoff::retry_delay;
use crate::utils::datetime::to_chrono;
use crate::utils::{PollBackoff, now_utc};

/// Service responsible for polling the queue and executing jobs
#[derive(Clone)]
pub struct JobQueueRunner {
    job_queue: JobQueue,
    handlers: Arc<HandlerRegistry>,
    config: WorkerConfig,
}

impl JobQueueRunner {
    /// Create a new job queue runner with configuration
    pub fn new(job_queue: JobQueue, handlers: HandlerRegistry, config: WorkerConfig) -> Self {
        Self {
            job_queue,
            handlers: Arc::new(handlers),
            config,
        }
    }

    /// Worker tokens this runner claims under: `<prefix>-1` .. `<prefix>-<n>`
    pub fn worker_ids(&self) -> Vec<String> {
        (1..=self.config.concurrency.max(1))
            .map(|n| format!("{}-{}", self.config.worker_id_prefix, n))
            .collect()
    }

    /// Run the polling tasks until `cancellation_token` fires.
    ///
    /// Jobs already executing are allowed to finish before this returns.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let worker_ids = self.worker_ids();
        info!(
            "Starting job queue runner with {} workers ({} claim strategy)",
            worker_ids.len(),
            self.job_queue.strategy_name()
        );
        if self.handlers.is_empty() {
            warn!("No job handlers registered; every claimed job will fail");
        }

        let handles: Vec<_> = worker_ids
            .into_iter()
            .map(|worker_id| {
                let runner = self.clone();
                let token = cancellation_token.clone();
                tokio::spawn(async move { runner.worker_loop(worker_id, token).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task terminated abnormally: {}", e);
            }
        }

        info!("Job queue runner stopped");
        Ok(())
    }

    async fn worker_loop(&self, worker_id: String, cancellation_token: CancellationToken) {
        let mut backoff = PollBackoff::from_config(&self.config);
        debug!("Worker {} started", worker_id);

        while !cancellation_token.is_cancelled() {
            let delay = match self.process_next(&worker_id).await {
                Ok(true) => {
                    backoff.reset();
                    continue;
                }
                Ok(false) => backoff.next_delay(),
                Err(e) => {
                    error!("Worker {} poll failed: {}", worker_id, e);
                    backoff.next_delay()
                }
            };

            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Worker {} stopped", worker_id);
    }

    /// Claim and execute at most one job as `worker_id`.
    ///
    /// Returns `Ok(false)` when there was nothing to claim.
    pub async fn process_next(&self, worker_id: &str) -> JobQueueResult<bool> {
        let Some(job) = self.job_queue.acquire_job(worker_id).await? else {
            return Ok(false);
        };

        let start_time = Instant::now();
        let outcome = self.execute(&job).await;
        let duration = start_time.elapsed();

        match &outcome {
            JobOutcome::Completed { .. } => {
                info!("Job {} completed in {:?}", job.id, duration)
            }
            JobOutcome::Retry { error, run_at } => warn!(
                "Job {} attempt {} failed after {:?}, retrying at {}: {}",
                job.id, job.attempt_count, duration, run_at, error
            ),
            JobOutcome::Failed { error } => error!(
                "Job {} failed after {:?} (attempt {} of {}): {}",
                job.id, duration, job.attempt_count, job.max_attempts, error
            ),
        }

        self.job_queue
            .complete_job(&job.id, worker_id, outcome)
            .await?;
        Ok(true)
    }

    async fn execute(&self, job: &Job) -> JobOutcome {
        let Some(handler) = self.handlers.get(job.job_type) else {
            return JobOutcome::Failed {
                error: format!("no handler registered for job type {}", job.job_type),
            };
        };

        // Separate task: a handler panic fails the attempt, not the worker
        let owned_job = job.clone();
        let result = tokio::spawn(async move { handler.execute(&owned_job).await }).await;

        let error = match result {
            Ok(Ok(output)) => return JobOutcome::Completed { result: output },
            Ok(Err(e)) => format!("{e:#}"),
            Err(join_error) => format!("handler panicked: {join_error}"),
        };

        if job.has_attempts_remaining() {
            let attempt = u32::try_from(job.attempt_count).unwrap_or(1);
            let delay = retry_delay(self.config.retry_base_delay, attempt, MAX_RETRY_DELAY);
            JobOutcome::Retry {
                error,
                run_at: now_utc() + to_chrono(delay),
            }
        } else {
            JobOutcome::Failed { error }
        }
    }
}
