//! Configuration default values
//!
//! This module contains all the default values for configuration options,
//! making them easily changeable in one central location.
use std::time::Duration;

const DAY: u64 = 24 * 60 * 60;

// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./m3u-proxy.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

// Worker polling defaults
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_PERCENT: u8 = 20;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 2;
pub const DEFAULT_WORKER_ID_PREFIX: &str = "m3u-worker";
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(30);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(6 * 3600);

// Retention defaults
pub const DEFAULT_COMPLETED_JOB_RETENTION: Duration = Duration::from_secs(7 * DAY);
pub const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(30 * DAY);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

// Job defaults
pub const DEFAULT_JOB_PRIORITY: i32 = 0;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_HISTORY_PAGE_SIZE: u64 = 50;
