use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_job_queue::{
    config::Config,
    database::Database,
    job_scheduling::{JobQueue, RetentionSweeper},
    models::{CreateJobRequest, JobStatus, JobType},
    utils::{datetime::to_chrono, now_utc},
};

#[derive(Parser)]
#[command(name = "m3u-job-queue")]
#[command(version)]
#[command(about = "Operate the m3u-proxy durable job queue")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the job tables
    Migrate,
    /// Enqueue a job, skipping it if one is already outstanding for the target
    Enqueue {
        /// stream_ingestion, epg_ingestion, proxy_regeneration, encoding or maintenance
        job_type: JobType,
        target_id: String,
        #[arg(long)]
        target_name: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Schedule the job this far in the future, e.g. "15m"
        #[arg(long, value_parser = humantime::parse_duration)]
        delay: Option<Duration>,
        /// Enqueue even if an outstanding job exists
        #[arg(long)]
        allow_duplicate: bool,
    },
    /// Purge finished jobs and history past their retention
    Sweep {
        /// Keep sweeping on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Return a running job whose worker died to the queue
    Release { id: String },
    /// Cancel a job that has not finished
    Cancel { id: String },
    /// Schedule a job that is not running to run again
    Reschedule {
        id: String,
        #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
        delay: Duration,
    },
    /// List jobs, optionally by status
    List {
        #[arg(long)]
        status: Option<JobStatus>,
    },
    /// Show job history, newest first
    History {
        #[arg(long)]
        job_type: Option<JobType>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Job counts per status
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output
    let log_filter = format!("m3u_job_queue={}", cli.log_level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    let job_queue = JobQueue::new(&database);

    match cli.command {
        Command::Migrate => {
            info!("Database is up to date");
        }
        Command::Enqueue {
            job_type,
            target_id,
            target_name,
            priority,
            delay,
            allow_duplicate,
        } => {
            let mut request = CreateJobRequest::new(job_type, target_id).with_priority(priority);
            if let Some(target_name) = target_name {
                request = request.with_target_name(target_name);
            }
            if let Some(delay) = delay {
                request = request.scheduled_at(now_utc() + to_chrono(delay));
            }

            if allow_duplicate {
                print_json(&job_queue.create(request).await?)?;
            } else {
                let outcome = job_queue.create_unless_duplicate(request).await?;
                if !outcome.is_created() {
                    info!("An outstanding job already exists for this target");
                }
                print_json(outcome.job())?;
            }
        }
        Command::Sweep { watch } => {
            let sweeper = RetentionSweeper::from_config(job_queue, &config.retention);
            if watch {
                let token = CancellationToken::new();
                let shutdown = token.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        shutdown.cancel();
                    }
                });
                sweeper.run(token).await;
            } else {
                print_json(&sweeper.run_once().await?)?;
            }
        }
        Command::Release { id } => {
            let released = job_queue.release_job(&id).await?;
            print_json(&serde_json::json!({ "id": id, "released": released }))?;
        }
        Command::Cancel { id } => {
            let job = job_queue
                .cancel_job(&id)
                .await?
                .with_context(|| format!("Job {id} not found or already finished"))?;
            print_json(&job)?;
        }
        Command::Reschedule { id, delay } => {
            let job = job_queue
                .reschedule_job(&id, now_utc() + to_chrono(delay))
                .await?
                .with_context(|| format!("Job {id} not found or currently running"))?;
            print_json(&job)?;
        }
        Command::List { status } => {
            let jobs = match status {
                Some(status) => job_queue.get_by_status(status).await?,
                None => job_queue.get_all().await?,
            };
            print_json(&jobs)?;
        }
        Command::History {
            job_type,
            offset,
            limit,
        } => {
            print_json(&job_queue.get_history(job_type, offset, limit).await?)?;
        }
        Command::Stats => {
            let counts: serde_json::Map<String, serde_json::Value> = job_queue
                .count_by_status()
                .await?
                .into_iter()
                .map(|(status, count)| (status.to_string(), count.into()))
                .collect();
            print_json(&counts)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
