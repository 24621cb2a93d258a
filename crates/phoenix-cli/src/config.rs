use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use phoenix_core::WorkerConfig;
use phoenix_core::domain::DEFAULT_MAX_RETRIES;

#[derive(Debug, Parser)]
#[command(name = "phoenix", version, about = "At-least-once webhook job runner")]
pub struct Cli {
    /// SQLite database shared by every worker.
    #[arg(long, env = "PHOENIX_DATABASE_URL", default_value = "sqlite://phoenix.db", global = true)]
    pub database: String,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "PHOENIX_LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a job; re-submitting the same idempotency key returns the existing job.
    Submit(SubmitArgs),
    /// Run the scheduler and recovery loops until Ctrl-C.
    Work(WorkArgs),
    /// Show one job, or counts per status.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub url: String,

    #[arg(long, default_value = "{}")]
    pub payload: String,

    #[arg(long)]
    pub key: String,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
}

#[derive(Debug, Args)]
pub struct WorkArgs {
    #[arg(long, env = "PHOENIX_WORKER_ID")]
    pub worker_id: Option<String>,

    #[arg(long, env = "PHOENIX_SCHEDULER_INTERVAL_MS", default_value_t = 1_000)]
    pub scheduler_interval_ms: u64,

    #[arg(long, env = "PHOENIX_RECOVERY_INTERVAL_SECS", default_value_t = 60)]
    pub recovery_interval_secs: u64,

    #[arg(long, env = "PHOENIX_STALENESS_SECS", default_value_t = 300)]
    pub staleness_secs: u64,

    #[arg(long, env = "PHOENIX_LEASE_TTL_SECS", default_value_t = 30)]
    pub lease_ttl_secs: u64,

    #[arg(long, env = "PHOENIX_EXECUTION_TIMEOUT_SECS", default_value_t = 30)]
    pub execution_timeout_secs: u64,

    #[arg(long, env = "PHOENIX_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,
}

impl WorkArgs {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            scheduler_interval: Duration::from_millis(self.scheduler_interval_ms),
            recovery_interval: Duration::from_secs(self.recovery_interval_secs),
            staleness_threshold: Duration::from_secs(self.staleness_secs),
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
            execution_timeout: Duration::from_secs(self.execution_timeout_secs),
            batch_size: self.batch_size,
            ..WorkerConfig::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Job id (`job-<ulid>`); omit for counts per status.
    pub id: Option<String>,
}
