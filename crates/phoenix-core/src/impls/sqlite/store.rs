use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::instrument;

use super::{from_millis, to_millis, truncate_millis};
use crate::app::status::JobCounts;
use crate::domain::{Job, JobId, JobStatus, StoreError, Transition};
use crate::ports::{Clock, JobStore};

const COLUMNS: &str = "id, idempotency_key, target_url, payload, status, attempt_count, \
                       max_retries, next_retry_at, last_error, version, created_at, updated_at";

/// `JobStore` backed by the `jobs` table.
///
/// `compare_and_swap_status` reads the row, validates with `Job::apply`, and
/// writes with `UPDATE ... WHERE id = ? AND version = ?`; zero affected rows
/// means another process got there first.
pub struct SqliteJobStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

fn corrupt(err: impl Display) -> StoreError {
    StoreError::Backend(format!("corrupt job row: {err}"))
}

fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let attempt_count: i64 = row.try_get("attempt_count")?;
    let max_retries: i64 = row.try_get("max_retries")?;
    let next_retry_at: Option<i64> = row.try_get("next_retry_at")?;
    let version: i64 = row.try_get("version")?;

    Ok(Job {
        id: id.parse().map_err(corrupt)?,
        idempotency_key: row.try_get("idempotency_key")?,
        target_url: row.try_get("target_url")?,
        payload: row.try_get("payload")?,
        status: status.parse().map_err(corrupt)?,
        attempt_count: u32::try_from(attempt_count).map_err(corrupt)?,
        max_retries: u32::try_from(max_retries).map_err(corrupt)?,
        next_retry_at: next_retry_at.map(from_millis).transpose()?,
        last_error: row.try_get("last_error")?,
        version: u64::try_from(version).map_err(corrupt)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO jobs (id, idempotency_key, target_url, payload, status, attempt_count, \
             max_retries, next_retry_at, last_error, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(&job.idempotency_key)
        .bind(&job.target_url)
        .bind(&job.payload)
        .bind(job.status.as_str())
        .bind(i64::from(job.attempt_count))
        .bind(i64::from(job.max_retries))
        .bind(job.next_retry_at.map(to_millis))
        .bind(&job.last_error)
        .bind(job.version as i64)
        .bind(to_millis(job.created_at))
        .bind(to_millis(job.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::DuplicateKey(job.idempotency_key))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE idempotency_key = ?"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_by_status_and_updated_before(
        &self,
        status: JobStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM jobs WHERE status = ? AND updated_at < ? \
             ORDER BY updated_at ASC, id ASC LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(to_millis(cutoff))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn find_schedulable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status = ? OR (status = ? AND (next_retry_at IS NULL OR next_retry_at <= ?)) \
             ORDER BY created_at ASC, id ASC LIMIT ?"
        ))
        .bind(JobStatus::Pending.as_str())
        .bind(JobStatus::RetryPending.as_str())
        .bind(to_millis(now))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self, transition), fields(to = %transition.to))]
    async fn compare_and_swap_status(
        &self,
        id: JobId,
        transition: &Transition,
    ) -> Result<Job, StoreError> {
        let now = truncate_millis(self.clock.now());

        // the version-guarded UPDATE is the atomic step; no read transaction
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let current = match row {
            Some(row) => job_from_row(&row)?,
            None => return Err(StoreError::NotFound(id)),
        };
        let next = current.apply(transition, now)?;

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, attempt_count = ?, next_retry_at = ?, last_error = ?, \
             version = ?, updated_at = ? WHERE id = ? AND version = ?",
        )
        .bind(next.status.as_str())
        .bind(i64::from(next.attempt_count))
        .bind(next.next_retry_at.map(to_millis))
        .bind(&next.last_error)
        .bind(next.version as i64)
        .bind(to_millis(next.updated_at))
        .bind(id.to_string())
        .bind(current.version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(id, "record changed concurrently"));
        }
        Ok(next)
    }

    async fn counts_by_status(&self) -> Result<JobCounts, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            counts.add(
                status.parse().map_err(corrupt)?,
                usize::try_from(n).map_err(corrupt)?,
            );
        }
        Ok(counts)
    }
}
