use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

/// Prefix for environment overrides, e.g. `M3U_JOBS_DATABASE__URL`
pub const ENV_PREFIX: &str = "M3U_JOBS_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    #[serde(default = "default_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
    #[serde(default = "default_acquire_timeout", with = "duration")]
    pub acquire_timeout: Duration,
}

/// Polling policy applied by the worker runner around `acquire_job`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Delay after an empty poll; also the floor the backoff resets to
    #[serde(default = "default_poll_interval", with = "duration")]
    pub poll_interval: Duration,
    /// Ceiling for the exponential poll backoff
    #[serde(default = "default_max_poll_interval", with = "duration")]
    pub max_poll_interval: Duration,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Random jitter added to each delay, as a percentage of the delay
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: u8,
    /// Number of concurrent polling tasks per process
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Worker tokens are `<prefix>-<n>`
    #[serde(default = "default_worker_id_prefix")]
    pub worker_id_prefix: String,
    /// Base delay before a failed job is retried; doubles per attempt
    #[serde(default = "default_retry_base_delay", with = "duration")]
    pub retry_base_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Terminal jobs older than this are purged
    #[serde(default = "default_completed_job_retention", with = "duration")]
    pub completed_job_retention: Duration,
    /// History entries older than this are purged
    #[serde(default = "default_history_retention", with = "duration")]
    pub history_retention: Duration,
    #[serde(default = "default_sweep_interval", with = "duration")]
    pub sweep_interval: Duration,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_acquire_timeout() -> Duration {
    DEFAULT_ACQUIRE_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_max_poll_interval() -> Duration {
    DEFAULT_MAX_POLL_INTERVAL
}

fn default_backoff_multiplier() -> f64 {
    DEFAULT_BACKOFF_MULTIPLIER
}

fn default_jitter_percent() -> u8 {
    DEFAULT_JITTER_PERCENT
}

fn default_concurrency() -> usize {
    DEFAULT_WORKER_CONCURRENCY
}

fn default_worker_id_prefix() -> String {
    DEFAULT_WORKER_ID_PREFIX.to_string()
}

fn default_retry_base_delay() -> Duration {
    DEFAULT_RETRY_BASE_DELAY
}

fn default_completed_job_retention() -> Duration {
    DEFAULT_COMPLETED_JOB_RETENTION
}

fn default_history_retention() -> Duration {
    DEFAULT_HISTORY_RETENTION
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
            connect_timeout: default_connect_timeout(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_poll_interval: default_max_poll_interval(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_percent: default_jitter_percent(),
            concurrency: default_concurrency(),
            worker_id_prefix: default_worker_id_prefix(),
            retry_base_delay: default_retry_base_delay(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_job_retention: default_completed_job_retention(),
            history_retention: default_history_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl WorkerConfig {
    /// Reject settings that would make the poll loop spin or never run
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("worker.concurrency must be at least 1".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("worker.poll_interval must be greater than zero".to_string());
        }
        if self.max_poll_interval < self.poll_interval {
            return Err(format!(
                "worker.max_poll_interval ({:?}) must not be shorter than worker.poll_interval ({:?})",
                self.max_poll_interval, self.poll_interval
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err("worker.backoff_multiplier must be >= 1.0".to_string());
        }
        if self.jitter_percent > 100 {
            return Err("worker.jitter_percent must be between 0 and 100".to_string());
        }
        if self.worker_id_prefix.trim().is_empty() {
            return Err("worker.worker_id_prefix must not be empty".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    /// Load the TOML file (writing defaults if it does not exist yet), then
    /// apply `M3U_JOBS_`-prefixed environment overrides on top.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if !Path::new(config_file).exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(config_file, contents)
                .with_context(|| format!("Failed to write default config to {config_file}"))?;
            info!("Created default config file: {}", config_file);
        }

        let config: Config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {config_file}"))?;

        config
            .worker
            .validate()
            .map_err(|message| anyhow::anyhow!("Invalid configuration: {message}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.worker.validate().is_ok());
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
        assert_eq!(config.retention.completed_job_retention, Duration::from_secs(7 * 86400));
    }

    #[test]
    fn test_worker_validation_rejects_inverted_intervals() {
        let worker = WorkerConfig {
            poll_interval: Duration::from_secs(10),
            max_poll_interval: Duration::from_secs(1),
            ..WorkerConfig::default()
        };
        assert!(worker.validate().is_err());

        let worker = WorkerConfig {
            concurrency: 0,
            ..WorkerConfig::default()
        };
        assert!(worker.validate().is_err());
    }

    #[test]
    fn test_load_from_file_merges_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");
        std::fs::write(
            &path,
            r#"
[database]
url = "sqlite::memory:"

[worker]
poll_interval = "250ms"
concurrency = 4

[retention]
history_retention = "90d"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.worker.poll_interval, Duration::from_millis(250));
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.max_poll_interval, DEFAULT_MAX_POLL_INTERVAL);
        assert_eq!(config.retention.history_retention, Duration::from_secs(90 * 86400));
        assert_eq!(config.retention.sweep_interval, DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn test_load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated.toml");

        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
        assert_eq!(config.worker.concurrency, DEFAULT_WORKER_CONCURRENCY);

        // The generated file must round-trip through the loader
        let reloaded = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(reloaded.worker.poll_interval, config.worker.poll_interval);
    }
}
