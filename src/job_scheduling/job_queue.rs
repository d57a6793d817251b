//! Durable job queue backed by the shared relational store
//!
//! `JobQueue` is the single entry point producers, workers, supervisors and
//! the retention sweeper use. It holds no in-memory queue state: every
//! operation goes to the database, which is the only synchronization point
//! between processes.

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::claim::{ClaimStrategy, strategy_for};
use crate::database::Database;
use crate::database::repositories::{JobHistorySeaOrmRepository, JobSeaOrmRepository};
use crate::errors::{JobQueueError, JobQueueResult};
use crate::models::{
    CreateJobHistoryRequest, CreateJobRequest, CreateOutcome, HistoryPage, Job,
    JobHistoryEntry, JobOutcome, JobStatus, JobType,
};
use crate::utils::now_utc;

/// Database-backed job queue with a backend-appropriate claim strategy
#[derive(Clone)]
pub struct JobQueue {
    connection: Arc<DatabaseConnection>,
    jobs: JobSeaOrmRepository,
    history: JobHistorySeaOrmRepository,
    strategy: Arc<dyn ClaimStrategy>,
}

impl JobQueue {
    /// Create a queue, picking the claim strategy from the backend's capabilities
    pub fn new(database: &Database) -> Self {
        Self::with_strategy(database, strategy_for(database))
    }

    /// Create a queue with an explicit claim strategy
    pub fn with_strategy(database: &Database, strategy: Arc<dyn ClaimStrategy>) -> Self {
        let connection = database.connection();
        info!(
            "Job queue using {} claim strategy on {}",
            strategy.name(),
            database.database_type()
        );
        Self {
            jobs: JobSeaOrmRepository::new(connection.clone()),
            history: JobHistorySeaOrmRepository::new(connection.clone()),
            connection,
            strategy,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    // ----- Job store -------------------------------------------------------

    /// Enqueue a job as given (pending, or scheduled with `next_run_at`)
    pub async fn create(&self, request: CreateJobRequest) -> JobQueueResult<Job> {
        let job = self.jobs.create(request).await?;
        info!(
            "Enqueued {} job {} for target {} (status: {}, priority: {})",
            job.job_type, job.id, job.target_id, job.status, job.priority
        );
        Ok(job)
    }

    pub async fn get_by_id(&self, id: &str) -> JobQueueResult<Option<Job>> {
        self.jobs.find_by_id(id).await
    }

    pub async fn get_all(&self) -> JobQueueResult<Vec<Job>> {
        self.jobs.find_all().await
    }

    pub async fn get_by_status(&self, status: JobStatus) -> JobQueueResult<Vec<Job>> {
        self.jobs.find_by_status(status).await
    }

    pub async fn get_by_type(&self, job_type: JobType) -> JobQueueResult<Vec<Job>> {
        self.jobs.find_by_type(job_type).await
    }

    pub async fn get_by_target_id(&self, target_id: &str) -> JobQueueResult<Vec<Job>> {
        self.jobs.find_by_target_id(target_id).await
    }

    pub async fn get_running(&self) -> JobQueueResult<Vec<Job>> {
        self.jobs.find_running().await
    }

    /// Jobs a worker could claim right now, in claim order.
    ///
    /// A snapshot for operators; workers must go through [`Self::acquire_job`].
    pub async fn get_pending(&self) -> JobQueueResult<Vec<Job>> {
        self.jobs.find_pending(now_utc()).await
    }

    /// Save a job's business fields; `Ok(None)` if the job no longer exists.
    ///
    /// Claiming, releasing and rescheduling go through their own calls; an
    /// update that would enter or leave `running` that way is a validation error.
    pub async fn update(&self, job: &Job) -> JobQueueResult<Option<Job>> {
        self.jobs.update(job).await
    }

    pub async fn delete(&self, id: &str) -> JobQueueResult<bool> {
        self.jobs.delete(id).await
    }

    /// Purge terminal jobs completed before `before`; returns the number removed
    pub async fn delete_completed(&self, before: DateTime<Utc>) -> JobQueueResult<u64> {
        let deleted = self.jobs.delete_completed(before).await?;
        if deleted > 0 {
            info!("Purged {} finished jobs completed before {}", deleted, before);
        }
        Ok(deleted)
    }

    pub async fn count_by_status(&self) -> JobQueueResult<Vec<(JobStatus, u64)>> {
        self.jobs.count_by_status().await
    }

    // ----- Claim protocol --------------------------------------------------

    /// Claim the next ready job for `worker_id`.
    ///
    /// Returns `Ok(None)` when nothing is ready or a concurrent worker won the
    /// race; the caller should poll again later.
    pub async fn acquire_job(&self, worker_id: &str) -> JobQueueResult<Option<Job>> {
        if worker_id.trim().is_empty() {
            return Err(JobQueueError::validation("worker_id must not be empty"));
        }

        let claimed = self
            .strategy
            .acquire(&self.connection, worker_id, now_utc())
            .await?;

        match &claimed {
            Some(job) => info!(
                "Worker {} claimed {} job {} for target {} (attempt {})",
                worker_id, job.job_type, job.id, job.target_id, job.attempt_count
            ),
            None => debug!("No job available for worker {}", worker_id),
        }
        Ok(claimed)
    }

    /// Return a running job to `pending` after its worker died.
    ///
    /// Returns `false` if the job does not exist or is not running.
    pub async fn release_job(&self, id: &str) -> JobQueueResult<bool> {
        let released = self.jobs.release(id).await?;
        if released {
            info!("Released job {} back to the queue", id);
        } else {
            warn!("Release of job {} had no effect: missing or not running", id);
        }
        Ok(released)
    }

    /// Record the outcome of an attempt, only if `worker_id` still owns the job.
    ///
    /// `Ok(None)` means the write was fenced off: the job was released,
    /// cancelled or claimed by another worker since this attempt started.
    pub async fn complete_job(
        &self,
        id: &str,
        worker_id: &str,
        outcome: JobOutcome,
    ) -> JobQueueResult<Option<Job>> {
        let completed = self.jobs.complete(id, worker_id, outcome).await?;
        match &completed {
            Some(job) => info!(
                "Worker {} finished job {} with status {}",
                worker_id, job.id, job.status
            ),
            None => warn!(
                "Worker {} no longer owns job {}; outcome discarded",
                worker_id, id
            ),
        }
        Ok(completed)
    }

    /// Cancel a job that has not finished yet
    pub async fn cancel_job(&self, id: &str) -> JobQueueResult<Option<Job>> {
        let cancelled = self.jobs.cancel(id).await?;
        if cancelled.is_some() {
            info!("Cancelled job {}", id);
        }
        Ok(cancelled)
    }

    /// Schedule a job that is not running to run again at `run_at`
    pub async fn reschedule_job(
        &self,
        id: &str,
        run_at: DateTime<Utc>,
    ) -> JobQueueResult<Option<Job>> {
        let rescheduled = self.jobs.reschedule(id, run_at).await?;
        if rescheduled.is_some() {
            info!("Rescheduled job {} for {}", id, run_at);
        }
        Ok(rescheduled)
    }

    // ----- Deduplication ---------------------------------------------------

    /// Outstanding job for the same type and target, if any
    pub async fn find_duplicate_pending(
        &self,
        job_type: JobType,
        target_id: &str,
    ) -> JobQueueResult<Option<Job>> {
        self.jobs.find_duplicate_pending(job_type, target_id).await
    }

    /// Enqueue unless an outstanding job for the same type and target exists.
    ///
    /// The check and the insert are separate statements, so two producers
    /// racing on the same target can still both enqueue.
    pub async fn create_unless_duplicate(
        &self,
        request: CreateJobRequest,
    ) -> JobQueueResult<CreateOutcome> {
        request.validate()?;
        if let Some(existing) = self
            .find_duplicate_pending(request.job_type, &request.target_id)
            .await?
        {
            debug!(
                "Skipping duplicate {} job for target {} (existing job {})",
                request.job_type, request.target_id, existing.id
            );
            return Ok(CreateOutcome::Duplicate(existing));
        }
        self.create(request).await.map(CreateOutcome::Created)
    }

    // ----- History archive -------------------------------------------------

    pub async fn create_history(
        &self,
        request: CreateJobHistoryRequest,
    ) -> JobQueueResult<JobHistoryEntry> {
        self.history.create(request).await
    }

    /// Page of history ordered by completion time, newest first, with the total
    pub async fn get_history(
        &self,
        job_type: Option<JobType>,
        offset: u64,
        limit: u64,
    ) -> JobQueueResult<HistoryPage> {
        self.history.find_page(job_type, offset, limit).await
    }

    pub async fn get_history_for_job(&self, job_id: &str) -> JobQueueResult<Vec<JobHistoryEntry>> {
        self.history.find_by_job_id(job_id).await
    }

    /// Purge history entries completed before `before`
    pub async fn delete_history(&self, before: DateTime<Utc>) -> JobQueueResult<u64> {
        let deleted = self.history.delete_older_than(before).await?;
        if deleted > 0 {
            info!("Purged {} history entries completed before {}", deleted, before);
        }
        Ok(deleted)
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("strategy", &self.strategy.name())
            .finish_non_exhaustive()
    }
}
