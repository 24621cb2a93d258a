//! Errors - エラー型と分類
//!
//! - ExecutionError: 実行結果の失敗（Transient / Permanent）
//! - StoreError: Job Store の失敗（StateConflict を含む）
//! - LeaseError: Lease Service の失敗
//!
//! Lease の競合は error ではなく `acquire` の `Ok(false)` で表現します。

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::ids::JobId;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（タイムアウト、5xx、接続失敗）。リトライする
/// - Permanent: 恒久的なエラー（4xx など）。残りのリトライ回数に関係なく FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => f.write_str("transient"),
            ErrorKind::Permanent => f.write_str("permanent"),
        }
    }
}

/// Failure reported by a `JobExecutor`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} execution failure: {message}")]
pub struct ExecutionError {
    kind: ErrorKind,
    message: String,
}

impl ExecutionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::transient(format!("execution timed out after {limit:?}"))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == ErrorKind::Permanent
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The expected prior status/version no longer holds, or the edge is not allowed.
    #[error("state conflict on {job_id}: {reason}")]
    StateConflict { job_id: JobId, reason: String },

    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Unique constraint on the idempotency key.
    #[error("idempotency key already exists: {0}")]
    DuplicateKey(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn conflict(job_id: JobId, reason: impl Into<String>) -> Self {
        StoreError::StateConflict {
            job_id,
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::StateConflict { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LeaseError {
    fn from(err: sqlx::Error) -> Self {
        LeaseError::Backend(err.to_string())
    }
}
