//! Job record: the unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::state::JobStatus;

pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// A submission request: what the caller wants executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub target_url: String,
    #[serde(default)]
    pub payload: String,
    pub idempotency_key: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl NewJob {
    pub fn new(
        target_url: impl Into<String>,
        payload: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            payload: payload.into(),
            idempotency_key: idempotency_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// The stored job record.
///
/// - Single source of truth lives in the `JobStore`; this is a snapshot.
/// - Mutations go through `Transition` + `JobStore::compare_and_swap_status`,
///   never through direct field writes on a shared record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub idempotency_key: String,
    pub target_url: String,
    pub payload: String,
    pub status: JobStatus,

    /// Attempts that did not succeed (failures, timeouts, reclaimed crashes).
    pub attempt_count: u32,
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Optimistic concurrency counter, bumped on every mutation.
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly accepted job in `Created`, not yet schedulable.
    pub fn new(id: JobId, request: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            idempotency_key: request.idempotency_key,
            target_url: request.target_url,
            payload: request.payload,
            status: JobStatus::Created,
            attempt_count: 0,
            max_retries: request.max_retries,
            next_retry_at: None,
            last_error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Is the job eligible for the scheduler at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::RetryPending => self.next_retry_at.is_none_or(|at| at <= now),
            _ => false,
        }
    }

    /// Is the job stuck in `status` since before `cutoff`?
    pub fn is_stale(&self, status: JobStatus, cutoff: DateTime<Utc>) -> bool {
        self.status == status && self.updated_at < cutoff
    }
}
