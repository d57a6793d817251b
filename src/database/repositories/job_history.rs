//! SeaORM JobHistory repository implementation

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::defaults::DEFAULT_HISTORY_PAGE_SIZE;
use crate::entities::{job_history, prelude::*};
use crate::errors::{JobQueueError, JobQueueResult, StorageResultExt};
use crate::models::{CreateJobHistoryRequest, HistoryPage, JobHistoryEntry, JobStatus, JobType};
use crate::utils::new_job_id;

/// SeaORM-based JobHistory repository
#[derive(Clone)]
pub struct JobHistorySeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl JobHistorySeaOrmRepository {
    /// Create a new JobHistorySeaOrmRepository
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Append one terminal attempt
    pub async fn create(&self, request: CreateJobHistoryRequest) -> JobQueueResult<JobHistoryEntry> {
        insert_history(&*self.connection, request).await
    }

    /// Newest-first page of history, optionally restricted to one job type.
    ///
    /// A `limit` of zero falls back to the default page size.
    pub async fn find_page(
        &self,
        job_type: Option<JobType>,
        offset: u64,
        limit: u64,
    ) -> JobQueueResult<HistoryPage> {
        let limit = if limit == 0 {
            DEFAULT_HISTORY_PAGE_SIZE
        } else {
            limit
        };

        let mut query = JobHistory::find();
        if let Some(job_type) = job_type {
            query = query.filter(job_history::Column::JobType.eq(job_type.as_str()));
        }

        let total = query
            .clone()
            .count(&*self.connection)
            .await
            .during("count_job_history")?;

        let models = query
            .order_by_desc(job_history::Column::CompletedAt)
            .order_by_desc(job_history::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&*self.connection)
            .await
            .during("get_job_history")?;

        let entries = models
            .into_iter()
            .map(entry_from_model)
            .collect::<JobQueueResult<Vec<_>>>()?;

        Ok(HistoryPage {
            entries,
            total,
            offset,
            limit,
        })
    }

    /// Every recorded attempt of one job, oldest first
    pub async fn find_by_job_id(&self, job_id: &str) -> JobQueueResult<Vec<JobHistoryEntry>> {
        let models = JobHistory::find()
            .filter(job_history::Column::JobId.eq(job_id))
            .order_by_asc(job_history::Column::AttemptNumber)
            .order_by_asc(job_history::Column::CompletedAt)
            .all(&*self.connection)
            .await
            .during("get_job_history_by_job_id")?;
        models.into_iter().map(entry_from_model).collect()
    }

    /// Purge entries that completed before `before`
    pub async fn delete_older_than(&self, before: DateTime<Utc>) -> JobQueueResult<u64> {
        let result = JobHistory::delete_many()
            .filter(job_history::Column::CompletedAt.lt(before))
            .exec(&*self.connection)
            .await
            .during("delete_job_history")?;
        Ok(result.rows_affected)
    }
}

/// Insert a history row on any connection, including an open transaction
pub(crate) async fn insert_history<C>(
    connection: &C,
    request: CreateJobHistoryRequest,
) -> JobQueueResult<JobHistoryEntry>
where
    C: ConnectionTrait,
{
    request.validate()?;

    let duration_ms = request.duration_ms();
    let active_model = job_history::ActiveModel {
        id: Set(new_job_id()),
        job_id: Set(request.job_id),
        job_type: Set(request.job_type.to_string()),
        target_id: Set(request.target_id),
        target_name: Set(request.target_name),
        status: Set(request.status.to_string()),
        worker_id: Set(request.worker_id),
        attempt_number: Set(request.attempt_number),
        started_at: Set(request.started_at),
        completed_at: Set(request.completed_at),
        duration_ms: Set(duration_ms),
        result: Set(request.result),
        error_message: Set(request.error_message),
    };

    let model = active_model
        .insert(connection)
        .await
        .during("create_job_history")?;
    entry_from_model(model)
}

fn entry_from_model(model: job_history::Model) -> JobQueueResult<JobHistoryEntry> {
    let job_type = JobType::from_str(&model.job_type).map_err(|_| {
        JobQueueError::corrupt_row(
            "job_history",
            model.id.clone(),
            format!("unknown job_type '{}'", model.job_type),
        )
    })?;
    let status = JobStatus::from_str(&model.status).map_err(|_| {
        JobQueueError::corrupt_row(
            "job_history",
            model.id.clone(),
            format!("unknown status '{}'", model.status),
        )
    })?;

    Ok(JobHistoryEntry {
        id: model.id,
        job_id: model.job_id,
        job_type,
        target_id: model.target_id,
        target_name: model.target_name,
        status,
        worker_id: model.worker_id,
        attempt_number: model.attempt_number,
        started_at: model.started_at,
        completed_at: model.completed_at,
        duration_ms: model.duration_ms,
        result: model.result,
        error_message: model.error_message,
    })
}
