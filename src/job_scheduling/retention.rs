//! Retention sweeper for finished jobs and job history

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use super::job_queue::JobQueue;
use crate::config::RetentionConfig;
use crate::errors::JobQueueResult;
use crate::utils::datetime::to_chrono;
use crate::utils::now_utc;

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub jobs_deleted: u64,
    pub history_deleted: u64,
}

/// Periodically purges terminal jobs and old history entries
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    job_queue: JobQueue,
    completed_job_retention: Duration,
    history_retention: Duration,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn from_config(job_queue: JobQueue, config: &RetentionConfig) -> Self {
        Self {
            job_queue,
            completed_job_retention: config.completed_job_retention,
            history_retention: config.history_retention,
            sweep_interval: config.sweep_interval,
        }
    }

    /// Sweep every `sweep_interval` until cancelled
    pub async fn run(&self, cancellation_token: CancellationToken) {
        let mut ticker = interval(self.sweep_interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Starting retention sweeper with interval: {:?}",
            self.sweep_interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("Retention sweep error: {}", e);
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Retention sweeper received cancellation signal");
                    break;
                }
            }
        }
    }

    /// Run a single sweep against the current time
    pub async fn run_once(&self) -> JobQueueResult<SweepReport> {
        self.sweep_at(now_utc()).await
    }

    /// Run a single sweep as if the current time were `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> JobQueueResult<SweepReport> {
        let job_cutoff = cutoff(now, self.completed_job_retention);
        let history_cutoff = cutoff(now, self.history_retention);

        let report = SweepReport {
            jobs_deleted: self.job_queue.delete_completed(job_cutoff).await?,
            history_deleted: self.job_queue.delete_history(history_cutoff).await?,
        };

        if report.jobs_deleted > 0 || report.history_deleted > 0 {
            info!(
                "Retention sweep removed {} jobs and {} history entries",
                report.jobs_deleted, report.history_deleted
            );
        } else {
            trace!("Retention sweep completed: nothing to remove");
        }
        Ok(report)
    }
}

fn cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(to_chrono(retention))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_saturates_for_huge_retention() {
        let now = now_utc();
        assert_eq!(
            cutoff(now, Duration::from_secs(3600)),
            now - chrono::Duration::hours(1)
        );
        assert_eq!(cutoff(now, Duration::MAX), DateTime::<Utc>::UNIX_EPOCH);
    }
}
