//! SQLite adapters - 複数 worker プロセスで共有できる永続実装
//!
//! 同じデータベースファイルを指すプロセス同士が Job Store と Lease Service を共有します。
//! 時刻は epoch milliseconds の INTEGER で保存し、インデックスで範囲検索できるようにしています。

mod lease;
mod store;

pub use lease::SqliteLeaseService;
pub use store::SqliteJobStore;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::domain::StoreError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY NOT NULL,
        idempotency_key TEXT NOT NULL UNIQUE,
        target_url TEXT NOT NULL,
        payload TEXT NOT NULL,
        status TEXT NOT NULL,
        attempt_count INTEGER NOT NULL,
        max_retries INTEGER NOT NULL,
        next_retry_at INTEGER,
        last_error TEXT,
        version INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_updated_at ON jobs (status, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_next_retry_at ON jobs (next_retry_at)",
    "CREATE TABLE IF NOT EXISTS leases (
        key TEXT PRIMARY KEY NOT NULL,
        token TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    )",
];

/// Open (and create if missing) a SQLite database shared by workers.
pub async fn connect(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create the `jobs` and `leases` tables and their indexes.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("sqlite schema ready");
    Ok(())
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {ms}")))
}

/// Drop sub-millisecond precision so a record reads back exactly as written.
pub(crate) fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to create test pool");
    migrate(&pool).await.unwrap();
    pool
}
