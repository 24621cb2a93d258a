mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use phoenix_core::app::{SubmissionGuard, WorkerBuilder};
use phoenix_core::domain::{Job, JobId, NewJob};
use phoenix_core::impls::{HttpWebhookExecutor, SqliteJobStore, SqliteLeaseService, sqlite};
use phoenix_core::ports::{Clock, JobStore, SystemClock, UlidGenerator};

use config::{Cli, Command, StatusArgs, SubmitArgs, WorkArgs};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitOutput<'a> {
    status_code: u16,
    job: &'a Job,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let pool = sqlite::connect(&cli.database)
        .await
        .with_context(|| format!("opening {}", cli.database))?;
    sqlite::migrate(&pool).await.context("creating schema")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SqliteJobStore::new(pool.clone(), clock.clone()));

    match cli.command {
        Command::Submit(args) => submit(store, clock, args).await,
        Command::Work(args) => {
            let leases = Arc::new(SqliteLeaseService::new(pool, clock.clone()));
            work(store, leases, clock, args).await
        }
        Command::Status(args) => status(store, args).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn submit(store: Arc<SqliteJobStore>, clock: Arc<dyn Clock>, args: SubmitArgs) -> Result<()> {
    let ids = Arc::new(UlidGenerator::new(clock.clone()));
    let guard = SubmissionGuard::new(store, clock, ids);

    let request = NewJob::new(args.url, args.payload, args.key).with_max_retries(args.max_retries);
    let submission = guard.submit(request).await?;

    let output = SubmitOutput {
        status_code: submission.status_code(),
        job: submission.job(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn work(
    store: Arc<SqliteJobStore>,
    leases: Arc<SqliteLeaseService>,
    clock: Arc<dyn Clock>,
    args: WorkArgs,
) -> Result<()> {
    let config = args.worker_config();
    // leave headroom so the HTTP client gives up before the execution timeout fires
    let request_timeout = config
        .execution_timeout
        .saturating_sub(Duration::from_millis(500))
        .max(Duration::from_millis(100));
    let executor = HttpWebhookExecutor::new(request_timeout)?;

    let mut builder = WorkerBuilder::new()
        .store(store)
        .leases(leases)
        .executor(Arc::new(executor))
        .clock(clock)
        .config(config);
    if let Some(worker_id) = args.worker_id {
        builder = builder.worker_id(worker_id);
    }
    let worker = builder.build()?;

    let handle = worker.spawn();
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested, waiting for in-flight jobs");
    let crashed = handle.shutdown_and_join().await;
    if !crashed.is_empty() {
        anyhow::bail!("worker loops crashed: {}", crashed.join(", "));
    }
    Ok(())
}

async fn status(store: Arc<SqliteJobStore>, args: StatusArgs) -> Result<()> {
    match args.id {
        Some(id) => {
            let id: JobId = id.parse()?;
            let job = store
                .find_by_id(id)
                .await?
                .with_context(|| format!("job {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        None => {
            let counts = store.counts_by_status().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }
    Ok(())
}
