//! Shared fixtures for the integration tests

#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use m3u_job_queue::{
    config::DatabaseConfig,
    database::Database,
    job_scheduling::JobQueue,
    models::{CreateJobRequest, Job, JobType},
};

/// A migrated SQLite database in a temporary file.
///
/// A file (rather than `sqlite::memory:`) lets the pool hand out several
/// connections, so concurrent claims really race against each other.
pub struct TestQueue {
    pub database: Database,
    pub queue: JobQueue,
    _dir: TempDir,
}

pub async fn sqlite_queue() -> Result<TestQueue> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("jobs.db");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", path.display()),
        max_connections: Some(8),
        ..DatabaseConfig::default()
    };

    let database = Database::new(&config).await?;
    database.migrate().await?;
    let queue = JobQueue::new(&database);

    Ok(TestQueue {
        database,
        queue,
        _dir: dir,
    })
}

pub async fn enqueue(queue: &JobQueue, job_type: JobType, target_id: &str, priority: i32) -> Job {
    queue
        .create(CreateJobRequest::new(job_type, target_id).with_priority(priority))
        .await
        .expect("create job")
}

pub async fn enqueue_at(
    queue: &JobQueue,
    job_type: JobType,
    target_id: &str,
    run_at: DateTime<Utc>,
) -> Job {
    queue
        .create(CreateJobRequest::new(job_type, target_id).scheduled_at(run_at))
        .await
        .expect("create scheduled job")
}
