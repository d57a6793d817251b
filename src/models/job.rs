//! Job queue domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::config::defaults::{DEFAULT_JOB_PRIORITY, DEFAULT_MAX_ATTEMPTS};
use crate::errors::{JobQueueError, JobQueueResult};

/// Kind of work a job represents; selects the handler that runs it
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    /// Stream source (M3U / Xtream) ingestion
    StreamIngestion,
    /// EPG source (XMLTV / Xtream) ingestion
    EpgIngestion,
    /// Regenerate a proxy's playlist and guide
    ProxyRegeneration,
    /// Relay encoding work
    Encoding,
    /// Housekeeping operations
    Maintenance,
}

/// Lifecycle state of a job row
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobType {
    /// Name stored in the `job_type` column
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl JobStatus {
    /// Name stored in the `status` column
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// States a job never leaves on its own
    pub const TERMINAL: [JobStatus; 3] =
        [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];

    /// States that count as "work outstanding" for deduplication
    pub const ACTIVE: [JobStatus; 3] =
        [JobStatus::Pending, JobStatus::Scheduled, JobStatus::Running];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Check a status change requested through a plain update.
    ///
    /// Entering `Running` is reserved to the claim; leaving it for `Pending`
    /// or `Scheduled` is reserved to release and reschedule.
    pub fn check_update_transition(from: JobStatus, to: JobStatus) -> JobQueueResult<()> {
        match (from, to) {
            (JobStatus::Running, JobStatus::Running) => Ok(()),
            (_, JobStatus::Running) => Err(JobQueueError::validation(format!(
                "a {from} job only becomes running by being claimed"
            ))),
            (JobStatus::Running, JobStatus::Pending | JobStatus::Scheduled) => {
                Err(JobQueueError::validation(format!(
                    "a running job moves to {to} through release or reschedule"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A job as seen by producers, workers and operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub target_id: String,
    pub target_name: Option<String>,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// True while some worker holds the job
    pub fn is_locked(&self) -> bool {
        self.locked_by.as_deref().is_some_and(|worker| !worker.is_empty())
    }

    /// True if the job would be a claim candidate at `now`
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        if self.is_locked() {
            return false;
        }
        match self.status {
            JobStatus::Pending => true,
            JobStatus::Scheduled => self.next_run_at.is_some_and(|run_at| run_at <= now),
            _ => false,
        }
    }

    /// Whether another attempt fits in the retry budget
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Validate fields a full-row update is about to persist
    pub fn validate(&self) -> JobQueueResult<()> {
        validate_target_id(&self.target_id)?;
        if self.max_attempts < 1 {
            return Err(JobQueueError::validation("max_attempts must be at least 1"));
        }
        if self.status == JobStatus::Scheduled && self.next_run_at.is_none() {
            return Err(JobQueueError::validation(
                "scheduled jobs require next_run_at",
            ));
        }
        Ok(())
    }
}

/// Request to enqueue a new job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: JobType,
    pub target_id: String,
    pub target_name: Option<String>,
    /// Either `Pending` or `Scheduled`
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub max_attempts: i32,
}

impl CreateJobRequest {
    /// A pending job with default priority and retry budget
    pub fn new<S: Into<String>>(job_type: JobType, target_id: S) -> Self {
        Self {
            job_type,
            target_id: target_id.into(),
            target_name: None,
            status: JobStatus::Pending,
            priority: DEFAULT_JOB_PRIORITY,
            payload: None,
            next_run_at: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_target_name<S: Into<String>>(mut self, target_name: S) -> Self {
        self.target_name = Some(target_name.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload<S: Into<String>>(mut self, payload: S) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Make the job `Scheduled`, eligible from `run_at` onwards
    pub fn scheduled_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.status = JobStatus::Scheduled;
        self.next_run_at = Some(run_at);
        self
    }

    pub fn validate(&self) -> JobQueueResult<()> {
        validate_target_id(&self.target_id)?;
        match self.status {
            JobStatus::Pending => {}
            JobStatus::Scheduled => {
                if self.next_run_at.is_none() {
                    return Err(JobQueueError::validation(
                        "scheduled jobs require next_run_at",
                    ));
                }
            }
            other => {
                return Err(JobQueueError::validation(format!(
                    "jobs must be created pending or scheduled, not {other}"
                )));
            }
        }
        if self.max_attempts < 1 {
            return Err(JobQueueError::validation("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn validate_target_id(target_id: &str) -> JobQueueResult<()> {
    if target_id.trim().is_empty() {
        return Err(JobQueueError::validation("target_id is required"));
    }
    Ok(())
}

/// Result of a producer's dedup-aware create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// No outstanding job existed; this one was inserted
    Created(Job),
    /// An outstanding job for the same (type, target) already exists
    Duplicate(Job),
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn job(&self) -> &Job {
        match self {
            CreateOutcome::Created(job) | CreateOutcome::Duplicate(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            CreateOutcome::Created(job) | CreateOutcome::Duplicate(job) => job,
        }
    }
}

/// How a worker finished an attempt it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { result: Option<String> },
    Failed { error: String },
    /// The attempt failed but the job goes back to `Scheduled` at `run_at`
    Retry { error: String, run_at: DateTime<Utc> },
}

impl JobOutcome {
    /// Status recorded in the history entry for this attempt
    pub fn history_status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } | JobOutcome::Retry { .. } => JobStatus::Failed,
        }
    }

    /// Status the job row moves to
    pub fn job_status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Retry { .. } => JobStatus::Scheduled,
        }
    }
}

/// One archived terminal attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHistoryEntry {
    pub id: String,
    pub job_id: String,
    pub job_type: JobType,
    pub target_id: String,
    pub target_name: Option<String>,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub attempt_number: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

/// Request to append a history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobHistoryRequest {
    pub job_id: String,
    pub job_type: JobType,
    pub target_id: String,
    pub target_name: Option<String>,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub attempt_number: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl CreateJobHistoryRequest {
    /// Snapshot an attempt of `job` that ended with `status` at `completed_at`
    pub fn from_job(job: &Job, status: JobStatus, completed_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id.clone(),
            job_type: job.job_type,
            target_id: job.target_id.clone(),
            target_name: job.target_name.clone(),
            status,
            worker_id: job.locked_by.clone(),
            attempt_number: job.attempt_count.max(1),
            started_at: job.started_at,
            completed_at,
            result: job.result.clone(),
            error_message: job.error_message.clone(),
        }
    }

    pub fn validate(&self) -> JobQueueResult<()> {
        if self.job_id.trim().is_empty() {
            return Err(JobQueueError::validation("job_id is required"));
        }
        validate_target_id(&self.target_id)?;
        if !self.status.is_terminal() {
            return Err(JobQueueError::validation(format!(
                "history entries record terminal attempts, not {}",
                self.status
            )));
        }
        if self.attempt_number < 1 {
            return Err(JobQueueError::validation("attempt_number must be at least 1"));
        }
        Ok(())
    }

    /// Wall-clock duration of the attempt, if it has a start time
    pub fn duration_ms(&self) -> Option<i64> {
        self.started_at
            .map(|started| (self.completed_at - started).num_milliseconds().max(0))
    }
}

/// One page of history plus the total number of matching entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<JobHistoryEntry>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(JobType::StreamIngestion, "stream_ingestion")]
    #[case(JobType::EpgIngestion, "epg_ingestion")]
    #[case(JobType::ProxyRegeneration, "proxy_regeneration")]
    #[case(JobType::Encoding, "encoding")]
    #[case(JobType::Maintenance, "maintenance")]
    fn test_job_type_storage_names(#[case] job_type: JobType, #[case] stored: &str) {
        assert_eq!(job_type.to_string(), stored);
        assert_eq!(JobType::from_str(stored).unwrap(), job_type);
    }

    #[test]
    fn test_status_classification() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());

        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Scheduled.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(!JobStatus::Failed.is_active());

        assert!(JobStatus::from_str("paused").is_err());
    }

    #[rstest]
    #[case(JobStatus::Pending, JobStatus::Running, false)]
    #[case(JobStatus::Scheduled, JobStatus::Running, false)]
    #[case(JobStatus::Failed, JobStatus::Running, false)]
    #[case(JobStatus::Running, JobStatus::Pending, false)]
    #[case(JobStatus::Running, JobStatus::Scheduled, false)]
    #[case(JobStatus::Running, JobStatus::Running, true)]
    #[case(JobStatus::Running, JobStatus::Completed, true)]
    #[case(JobStatus::Pending, JobStatus::Scheduled, true)]
    #[case(JobStatus::Pending, JobStatus::Cancelled, true)]
    fn test_update_transitions(
        #[case] from: JobStatus,
        #[case] to: JobStatus,
        #[case] allowed: bool,
    ) {
        let result = JobStatus::check_update_transition(from, to);
        assert_eq!(result.is_ok(), allowed);
        if let Err(err) = result {
            assert!(err.is_validation());
        }
    }

    #[test]
    fn test_create_request_validation() {
        assert!(CreateJobRequest::new(JobType::StreamIngestion, "S1").validate().is_ok());

        let blank = CreateJobRequest::new(JobType::StreamIngestion, "   ");
        assert!(blank.validate().unwrap_err().is_validation());

        let mut running = CreateJobRequest::new(JobType::EpgIngestion, "E1");
        running.status = JobStatus::Running;
        assert!(running.validate().is_err());

        let mut scheduled_without_time = CreateJobRequest::new(JobType::EpgIngestion, "E1");
        scheduled_without_time.status = JobStatus::Scheduled;
        assert!(scheduled_without_time.validate().is_err());

        let scheduled = CreateJobRequest::new(JobType::EpgIngestion, "E1")
            .scheduled_at(Utc::now() + Duration::minutes(5));
        assert_eq!(scheduled.status, JobStatus::Scheduled);
        assert!(scheduled.validate().is_ok());

        let no_attempts = CreateJobRequest::new(JobType::Encoding, "R1").with_max_attempts(0);
        assert!(no_attempts.validate().is_err());
    }

    #[test]
    fn test_outcome_status_mapping() {
        let retry = JobOutcome::Retry {
            error: "timeout".to_string(),
            run_at: Utc::now(),
        };
        assert_eq!(retry.history_status(), JobStatus::Failed);
        assert_eq!(retry.job_status(), JobStatus::Scheduled);

        let done = JobOutcome::Completed { result: None };
        assert_eq!(done.history_status(), JobStatus::Completed);
        assert_eq!(done.job_status(), JobStatus::Completed);
    }

    #[test]
    fn test_history_request_rejects_non_terminal_status() {
        let now = Utc::now();
        let request = CreateJobHistoryRequest {
            job_id: "01J0000000000000000000000".to_string(),
            job_type: JobType::ProxyRegeneration,
            target_id: "P1".to_string(),
            target_name: None,
            status: JobStatus::Running,
            worker_id: None,
            attempt_number: 1,
            started_at: Some(now - Duration::seconds(3)),
            completed_at: now,
            result: None,
            error_message: None,
        };
        assert!(request.validate().is_err());
        assert_eq!(request.duration_ms(), Some(3000));
    }
}
