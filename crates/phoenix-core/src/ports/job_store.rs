//! JobStore port - ジョブの正本（source of truth）
//!
//! # 設計原則
//! - `compare_and_swap_status` が唯一の更新経路。precondition（status + version）が
//!   崩れていれば `StoreError::StateConflict` を返し、レコードは変更しない
//! - idempotency key の一意性は insert 時に store が保証する
//! - Lease の状態とは独立して、状態遷移の正しさはここで担保される

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::status::JobCounts;
use crate::domain::{Job, JobId, JobStatus, StoreError, Transition};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job. Fails with `DuplicateKey` if the idempotency key exists.
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError>;

    /// Jobs in `status` whose `updated_at` is strictly before `cutoff`, oldest update first.
    async fn find_by_status_and_updated_before(
        &self,
        status: JobStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Pending jobs plus RetryPending jobs whose `next_retry_at <= now`,
    /// oldest `created_at` first.
    async fn find_schedulable(&self, now: DateTime<Utc>, limit: usize)
    -> Result<Vec<Job>, StoreError>;

    /// Atomically apply `transition` if its precondition still holds.
    ///
    /// Returns the updated record.
    async fn compare_and_swap_status(
        &self,
        id: JobId,
        transition: &Transition,
    ) -> Result<Job, StoreError>;

    async fn counts_by_status(&self) -> Result<JobCounts, StoreError>;
}
