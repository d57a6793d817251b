//! Claim strategies
//!
//! A claim moves exactly one candidate job to `running` and stamps it with the
//! caller's worker id, `started_at`/`locked_at` and an incremented
//! `attempt_count`. How the backend guarantees that only one caller wins
//! differs:
//!
//! - [`RowLockingClaim`] (PostgreSQL, MySQL 8): `SELECT ... FOR UPDATE SKIP
//!   LOCKED` of the best candidate, then an update of that row, in one
//!   transaction. Concurrent claimers skip the locked row and move on.
//! - [`AtomicUpdateClaim`] (SQLite): a single `UPDATE ... WHERE id IN (SELECT
//!   ... LIMIT 1)` that re-checks the candidate guard. SQLite serializes
//!   writers, so a loser sees zero rows affected.
//!
//! The strategy is picked once from the backend capability; call sites never
//! branch on the database type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Select, Set, TransactionTrait,
};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

use crate::database::repositories::job::{apply_claim_order, claimable_condition, job_from_model};
use crate::database::{Database, DatabaseFeature};
use crate::entities::{jobs, prelude::*};
use crate::errors::{JobQueueResult, StorageResultExt};
use crate::models::{Job, JobStatus};

/// One way of atomically claiming the next job
#[async_trait]
pub trait ClaimStrategy: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Claim the best candidate at `now` for `worker_id`.
    ///
    /// `Ok(None)` covers both an empty queue and a lost race. A worker token
    /// that holds several jobs at once should claim each with a distinct
    /// `now`; `JobQueue::acquire_job` always passes the current time.
    async fn acquire(
        &self,
        connection: &DatabaseConnection,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobQueueResult<Option<Job>>;
}

/// Choose the claim strategy for a backend
pub fn strategy_for(database: &Database) -> Arc<dyn ClaimStrategy> {
    if database.supports_feature(DatabaseFeature::SkipLocked) {
        Arc::new(RowLockingClaim)
    } else {
        Arc::new(AtomicUpdateClaim)
    }
}

/// Locking read with `SKIP LOCKED`, then update, in one transaction
#[derive(Debug, Default, Clone, Copy)]
pub struct RowLockingClaim;

#[async_trait]
impl ClaimStrategy for RowLockingClaim {
    fn name(&self) -> &'static str {
        "row-locking"
    }

    async fn acquire(
        &self,
        connection: &DatabaseConnection,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobQueueResult<Option<Job>> {
        let txn = connection.begin().await.during("acquire_job")?;

        let candidate = apply_claim_order(Jobs::find().filter(claimable_condition(now)))
            .limit(1)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await
            .during("acquire_job")?;

        let Some(model) = candidate else {
            txn.commit().await.during("acquire_job")?;
            return Ok(None);
        };

        let attempt_count = model.attempt_count + 1;
        let mut active_model: jobs::ActiveModel = model.into();
        active_model.status = Set(JobStatus::Running.to_string());
        active_model.started_at = Set(Some(now));
        active_model.locked_by = Set(Some(worker_id.to_string()));
        active_model.locked_at = Set(Some(now));
        active_model.attempt_count = Set(attempt_count);
        active_model.updated_at = Set(now);

        let claimed = active_model.update(&txn).await.during("acquire_job")?;
        txn.commit().await.during("acquire_job")?;

        job_from_model(claimed).map(Some)
    }
}

/// Single guarded `UPDATE` whose target is chosen by a subquery
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicUpdateClaim;

#[async_trait]
impl ClaimStrategy for AtomicUpdateClaim {
    fn name(&self) -> &'static str {
        "atomic-update"
    }

    async fn acquire(
        &self,
        connection: &DatabaseConnection,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobQueueResult<Option<Job>> {
        let next_candidate = apply_claim_order(
            Jobs::find()
                .select_only()
                .column(jobs::Column::Id)
                .filter(claimable_condition(now)),
        )
        .limit(1)
        .into_query();

        // The write is the first statement, so the transaction takes the
        // write lock up front and the follow-up read sees our own row.
        let txn = connection.begin().await.during("acquire_job")?;

        let result = Jobs::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Running.as_str()))
            .col_expr(jobs::Column::StartedAt, Expr::value(now))
            .col_expr(jobs::Column::LockedBy, Expr::value(worker_id))
            .col_expr(jobs::Column::LockedAt, Expr::value(now))
            .col_expr(
                jobs::Column::AttemptCount,
                Expr::col(jobs::Column::AttemptCount).add(1),
            )
            .col_expr(jobs::Column::UpdatedAt, Expr::value(now))
            .filter(jobs::Column::Id.in_subquery(next_candidate))
            .filter(claimable_condition(now))
            .exec(&txn)
            .await
            .during("acquire_job")?;

        if result.rows_affected == 0 {
            txn.commit().await.during("acquire_job")?;
            return Ok(None);
        }

        let claimed = latest_claim_by(worker_id)
            .one(&txn)
            .await
            .during("acquire_job")?;
        txn.commit().await.during("acquire_job")?;

        if claimed.is_none() {
            debug!("Claim by {} updated a row that could not be read back", worker_id);
        }
        claimed.map(job_from_model).transpose()
    }
}

/// Running jobs held by `worker_id`, most recent claim first.
///
/// Claims stamped with the same `now` fall back to the highest id.
fn latest_claim_by(worker_id: &str) -> Select<Jobs> {
    Jobs::find()
        .filter(jobs::Column::LockedBy.eq(worker_id))
        .filter(jobs::Column::Status.eq(JobStatus::Running.as_str()))
        .order_by_desc(jobs::Column::LockedAt)
        .order_by_desc(jobs::Column::UpdatedAt)
        .order_by_desc(jobs::Column::Id)
}
