//! SeaORM Job repository implementation
//!
//! Plain CRUD, listing and lifecycle mutations for the `jobs` table. The claim
//! itself lives in `job_scheduling::claim`, which reuses the candidate
//! predicate and ordering defined here so every backend agrees on which job
//! is "next".

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, NullOrdering, Order};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::debug;

use super::job_history::insert_history;
use crate::entities::{jobs, prelude::*};
use crate::errors::{JobQueueError, JobQueueResult, StorageResultExt};
use crate::models::{
    CreateJobHistoryRequest, CreateJobRequest, Job, JobOutcome, JobStatus, JobType,
};
use crate::utils::{new_job_id, now_utc};

/// SeaORM-based Job repository
#[derive(Clone)]
pub struct JobSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl JobSeaOrmRepository {
    /// Create a new JobSeaOrmRepository
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Insert a new pending or scheduled job
    pub async fn create(&self, request: CreateJobRequest) -> JobQueueResult<Job> {
        request.validate()?;

        let now = now_utc();
        let active_model = jobs::ActiveModel {
            id: Set(new_job_id()),
            job_type: Set(request.job_type.to_string()),
            target_id: Set(request.target_id),
            target_name: Set(request.target_name),
            status: Set(request.status.to_string()),
            priority: Set(request.priority),
            payload: Set(request.payload),
            next_run_at: Set(request.next_run_at),
            locked_by: Set(None),
            locked_at: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            attempt_count: Set(0),
            max_attempts: Set(request.max_attempts),
            result: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model
            .insert(&*self.connection)
            .await
            .during("create_job")?;
        debug!(
            "Created {} job {} for target {}",
            model.job_type, model.id, model.target_id
        );
        job_from_model(model)
    }

    /// Find job by ID
    pub async fn find_by_id(&self, id: &str) -> JobQueueResult<Option<Job>> {
        let model = Jobs::find_by_id(id.to_string())
            .one(&*self.connection)
            .await
            .during("get_job_by_id")?;
        model.map(job_from_model).transpose()
    }

    /// All jobs, oldest first
    pub async fn find_all(&self) -> JobQueueResult<Vec<Job>> {
        let models = Jobs::find()
            .order_by_asc(jobs::Column::CreatedAt)
            .order_by_asc(jobs::Column::Id)
            .all(&*self.connection)
            .await
            .during("get_all_jobs")?;
        jobs_from_models(models)
    }

    pub async fn find_by_status(&self, status: JobStatus) -> JobQueueResult<Vec<Job>> {
        let models = Jobs::find()
            .filter(jobs::Column::Status.eq(status.as_str()))
            .order_by_asc(jobs::Column::CreatedAt)
            .order_by_asc(jobs::Column::Id)
            .all(&*self.connection)
            .await
            .during("get_jobs_by_status")?;
        jobs_from_models(models)
    }

    pub async fn find_by_type(&self, job_type: JobType) -> JobQueueResult<Vec<Job>> {
        let models = Jobs::find()
            .filter(jobs::Column::JobType.eq(job_type.as_str()))
            .order_by_asc(jobs::Column::CreatedAt)
            .order_by_asc(jobs::Column::Id)
            .all(&*self.connection)
            .await
            .during("get_jobs_by_type")?;
        jobs_from_models(models)
    }

    /// Every job, in any state, that acts on `target_id`
    pub async fn find_by_target_id(&self, target_id: &str) -> JobQueueResult<Vec<Job>> {
        let models = Jobs::find()
            .filter(jobs::Column::TargetId.eq(target_id))
            .order_by_asc(jobs::Column::CreatedAt)
            .order_by_asc(jobs::Column::Id)
            .all(&*self.connection)
            .await
            .during("get_jobs_by_target_id")?;
        jobs_from_models(models)
    }

    /// Jobs currently held by a worker, longest-held first
    pub async fn find_running(&self) -> JobQueueResult<Vec<Job>> {
        let models = Jobs::find()
            .filter(jobs::Column::Status.eq(JobStatus::Running.as_str()))
            .order_by_asc(jobs::Column::LockedAt)
            .order_by_asc(jobs::Column::Id)
            .all(&*self.connection)
            .await
            .during("get_running_jobs")?;
        jobs_from_models(models)
    }

    /// Claim candidates at `now`, in claim order. Advisory only.
    pub async fn find_pending(&self, now: DateTime<Utc>) -> JobQueueResult<Vec<Job>> {
        let models = apply_claim_order(Jobs::find().filter(claimable_condition(now)))
            .all(&*self.connection)
            .await
            .during("get_pending_jobs")?;
        jobs_from_models(models)
    }

    /// Save the business fields of `job`.
    ///
    /// Ownership (`locked_by`, `locked_at`, `started_at`, `attempt_count`) is
    /// left alone, except that moving to a terminal status drops the lock.
    /// Status changes that would take or give up ownership are rejected; see
    /// [`JobStatus::check_update_transition`].
    pub async fn update(&self, job: &Job) -> JobQueueResult<Option<Job>> {
        job.validate()?;

        let Some(model) = Jobs::find_by_id(job.id.clone())
            .one(&*self.connection)
            .await
            .during("update_job")?
        else {
            return Ok(None);
        };

        let current = JobStatus::from_str(&model.status).map_err(|_| {
            JobQueueError::corrupt_row(
                "jobs",
                model.id.clone(),
                format!("unknown status '{}'", model.status),
            )
        })?;
        JobStatus::check_update_transition(current, job.status)?;

        let now = now_utc();
        let mut active_model: jobs::ActiveModel = model.into();
        active_model.job_type = Set(job.job_type.to_string());
        active_model.target_id = Set(job.target_id.clone());
        active_model.target_name = Set(job.target_name.clone());
        active_model.status = Set(job.status.to_string());
        active_model.priority = Set(job.priority);
        active_model.payload = Set(job.payload.clone());
        active_model.next_run_at = Set(job.next_run_at);
        active_model.max_attempts = Set(job.max_attempts);
        active_model.result = Set(job.result.clone());
        active_model.error_message = Set(job.error_message.clone());
        active_model.updated_at = Set(now);

        if job.status.is_terminal() {
            active_model.completed_at = Set(Some(job.completed_at.unwrap_or(now)));
            active_model.locked_by = Set(None);
            active_model.locked_at = Set(None);
        } else {
            active_model.completed_at = Set(job.completed_at);
        }

        let updated = active_model
            .update(&*self.connection)
            .await
            .during("update_job")?;
        job_from_model(updated).map(Some)
    }

    /// Remove a job row. History entries are kept.
    pub async fn delete(&self, id: &str) -> JobQueueResult<bool> {
        let result = Jobs::delete_by_id(id.to_string())
            .exec(&*self.connection)
            .await
            .during("delete_job")?;
        Ok(result.rows_affected > 0)
    }

    /// Purge terminal jobs that completed before `before`
    pub async fn delete_completed(&self, before: DateTime<Utc>) -> JobQueueResult<u64> {
        let result = Jobs::delete_many()
            .filter(jobs::Column::Status.is_in(JobStatus::TERMINAL.map(|s| s.as_str())))
            .filter(jobs::Column::CompletedAt.lt(before))
            .exec(&*self.connection)
            .await
            .during("delete_completed_jobs")?;
        Ok(result.rows_affected)
    }

    /// Row count per status, every status listed even when zero
    pub async fn count_by_status(&self) -> JobQueueResult<Vec<(JobStatus, u64)>> {
        let rows: Vec<(String, i64)> = Jobs::find()
            .select_only()
            .column(jobs::Column::Status)
            .column_as(Expr::col(jobs::Column::Id).count(), "count")
            .group_by(jobs::Column::Status)
            .into_tuple()
            .all(&*self.connection)
            .await
            .during("count_jobs_by_status")?;

        let mut counts: Vec<(JobStatus, u64)> = JobStatus::iter().map(|s| (s, 0)).collect();
        for (status, count) in rows {
            let status = JobStatus::from_str(&status).map_err(|_| {
                JobQueueError::corrupt_row("jobs", "*", format!("unknown status '{status}'"))
            })?;
            if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == status) {
                entry.1 = u64::try_from(count).unwrap_or_default();
            }
        }
        Ok(counts)
    }

    /// Hand a running job back to the queue after its worker died.
    ///
    /// Clears the lock and resets the status to pending; `attempt_count` and
    /// `completed_at` are untouched. Jobs that are not running (waiting,
    /// scheduled for later, or finished) are left as they are.
    pub async fn release(&self, id: &str) -> JobQueueResult<bool> {
        let result = Jobs::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Pending.as_str()))
            .col_expr(jobs::Column::LockedBy, Expr::value(Option::<String>::None))
            .col_expr(
                jobs::Column::LockedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(jobs::Column::UpdatedAt, Expr::value(now_utc()))
            .filter(jobs::Column::Id.eq(id))
            .filter(jobs::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(&*self.connection)
            .await
            .during("release_job")?;
        Ok(result.rows_affected > 0)
    }

    /// Operator cancellation of a job that has not finished yet
    pub async fn cancel(&self, id: &str) -> JobQueueResult<Option<Job>> {
        let now = now_utc();
        let result = Jobs::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Cancelled.as_str()))
            .col_expr(jobs::Column::CompletedAt, Expr::value(now))
            .col_expr(jobs::Column::LockedBy, Expr::value(Option::<String>::None))
            .col_expr(
                jobs::Column::LockedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(jobs::Column::UpdatedAt, Expr::value(now))
            .filter(jobs::Column::Id.eq(id))
            .filter(jobs::Column::Status.is_in(JobStatus::ACTIVE.map(|s| s.as_str())))
            .exec(&*self.connection)
            .await
            .during("cancel_job")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    /// Put a job that is not running back on the queue as scheduled at `run_at`
    pub async fn reschedule(&self, id: &str, run_at: DateTime<Utc>) -> JobQueueResult<Option<Job>> {
        let result = Jobs::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Scheduled.as_str()))
            .col_expr(jobs::Column::NextRunAt, Expr::value(run_at))
            .col_expr(
                jobs::Column::CompletedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(jobs::Column::LockedBy, Expr::value(Option::<String>::None))
            .col_expr(
                jobs::Column::LockedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(jobs::Column::UpdatedAt, Expr::value(now_utc()))
            .filter(jobs::Column::Id.eq(id))
            .filter(jobs::Column::Status.ne(JobStatus::Running.as_str()))
            .exec(&*self.connection)
            .await
            .during("reschedule_job")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    /// Outstanding (pending, scheduled or running) job for the same type and target
    pub async fn find_duplicate_pending(
        &self,
        job_type: JobType,
        target_id: &str,
    ) -> JobQueueResult<Option<Job>> {
        let model = Jobs::find()
            .filter(jobs::Column::JobType.eq(job_type.as_str()))
            .filter(jobs::Column::TargetId.eq(target_id))
            .filter(jobs::Column::Status.is_in(JobStatus::ACTIVE.map(|s| s.as_str())))
            .order_by_asc(jobs::Column::CreatedAt)
            .order_by_asc(jobs::Column::Id)
            .one(&*self.connection)
            .await
            .during("find_duplicate_pending")?;
        model.map(job_from_model).transpose()
    }

    /// Record the outcome of an attempt owned by `worker_id`.
    ///
    /// The row only changes while it is still running under `worker_id`; a
    /// job that was released, cancelled or reclaimed in the meantime yields
    /// `Ok(None)` and nothing is written. The status change, the lock release
    /// and the history entry commit together.
    pub async fn complete(
        &self,
        id: &str,
        worker_id: &str,
        outcome: JobOutcome,
    ) -> JobQueueResult<Option<Job>> {
        let now = now_utc();
        let txn = self.connection.begin().await.during("complete_job")?;

        let mut update = Jobs::update_many()
            .col_expr(jobs::Column::Status, Expr::value(outcome.job_status().as_str()))
            .col_expr(jobs::Column::LockedBy, Expr::value(Option::<String>::None))
            .col_expr(
                jobs::Column::LockedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(jobs::Column::UpdatedAt, Expr::value(now));

        update = match &outcome {
            JobOutcome::Completed { result } => update
                .col_expr(jobs::Column::CompletedAt, Expr::value(now))
                .col_expr(jobs::Column::Result, Expr::value(result.clone()))
                .col_expr(
                    jobs::Column::ErrorMessage,
                    Expr::value(Option::<String>::None),
                ),
            JobOutcome::Failed { error } => update
                .col_expr(jobs::Column::CompletedAt, Expr::value(now))
                .col_expr(jobs::Column::ErrorMessage, Expr::value(error.clone())),
            JobOutcome::Retry { error, run_at } => update
                .col_expr(jobs::Column::NextRunAt, Expr::value(*run_at))
                .col_expr(jobs::Column::ErrorMessage, Expr::value(error.clone())),
        };

        let result = update
            .filter(jobs::Column::Id.eq(id))
            .filter(jobs::Column::LockedBy.eq(worker_id))
            .filter(jobs::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(&txn)
            .await
            .during("complete_job")?;

        if result.rows_affected == 0 {
            txn.rollback().await.during("complete_job")?;
            debug!(
                "Completion of job {} by {} rejected: no longer owned",
                id, worker_id
            );
            return Ok(None);
        }

        let model = Jobs::find_by_id(id.to_string())
            .one(&txn)
            .await
            .during("complete_job")?
            .ok_or_else(|| {
                JobQueueError::corrupt_row("jobs", id, "row vanished inside completion transaction")
            })?;
        let job = job_from_model(model)?;

        let mut history = CreateJobHistoryRequest::from_job(&job, outcome.history_status(), now);
        history.worker_id = Some(worker_id.to_string());
        insert_history(&txn, history).await?;

        txn.commit().await.during("complete_job")?;
        Ok(Some(job))
    }
}

/// Candidate predicate shared by every claim strategy and `find_pending`:
/// pending, or scheduled and due, and not held by anyone.
pub(crate) fn claimable_condition(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(
            Condition::any()
                .add(jobs::Column::Status.eq(JobStatus::Pending.as_str()))
                .add(
                    Condition::all()
                        .add(jobs::Column::Status.eq(JobStatus::Scheduled.as_str()))
                        .add(jobs::Column::NextRunAt.lte(now)),
                ),
        )
        .add(
            Condition::any()
                .add(jobs::Column::LockedBy.is_null())
                .add(jobs::Column::LockedBy.eq("")),
        )
}

/// Canonical claim order: priority DESC, next_run_at ASC (NULLs first),
/// created_at ASC, id ASC.
pub(crate) fn apply_claim_order<Q: QueryOrder>(query: Q) -> Q {
    query
        .order_by_desc(jobs::Column::Priority)
        .order_by_with_nulls(jobs::Column::NextRunAt, Order::Asc, NullOrdering::First)
        .order_by_asc(jobs::Column::CreatedAt)
        .order_by_asc(jobs::Column::Id)
}

/// Convert a stored row into the domain model
pub(crate) fn job_from_model(model: jobs::Model) -> JobQueueResult<Job> {
    let job_type = JobType::from_str(&model.job_type).map_err(|_| {
        JobQueueError::corrupt_row(
            "jobs",
            model.id.clone(),
            format!("unknown job_type '{}'", model.job_type),
        )
    })?;
    let status = JobStatus::from_str(&model.status).map_err(|_| {
        JobQueueError::corrupt_row(
            "jobs",
            model.id.clone(),
            format!("unknown status '{}'", model.status),
        )
    })?;

    Ok(Job {
        id: model.id,
        job_type,
        target_id: model.target_id,
        target_name: model.target_name,
        status,
        priority: model.priority,
        payload: model.payload,
        next_run_at: model.next_run_at,
        locked_by: model.locked_by,
        locked_at: model.locked_at,
        started_at: model.started_at,
        completed_at: model.completed_at,
        attempt_count: model.attempt_count,
        max_attempts: model.max_attempts,
        result: model.result,
        error_message: model.error_message,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn jobs_from_models(models: Vec<jobs::Model>) -> JobQueueResult<Vec<Job>> {
    models.into_iter().map(job_from_model).collect()
}
