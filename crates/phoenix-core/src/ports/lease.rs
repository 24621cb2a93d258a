//! LeaseService port - 分散排他（acquire-if-absent with TTL / delete-if-owner）
//!
//! Lease は「無駄な同時実行を減らすためのヒント」であり、正しさの境界ではありません。
//! 期限切れで lease を失っても、Store の compare-and-swap が最終的に 1 worker だけを通します。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{JobId, LeaseError, LeaseToken};

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Lease key for a job: `job:lease:<jobId>`.
pub fn lease_key(job_id: JobId) -> String {
    format!("job:lease:{job_id}")
}

#[async_trait]
pub trait LeaseService: Send + Sync {
    /// Set `key` to `token` for `ttl` if no live lease exists.
    ///
    /// `Ok(false)` means another attempt holds the lease (contention, not an error).
    async fn acquire(&self, key: &str, token: &LeaseToken, ttl: Duration)
    -> Result<bool, LeaseError>;

    /// Delete `key` only if it currently holds `token`.
    ///
    /// Returns whether a lease was deleted; any other condition is a no-op.
    async fn release(&self, key: &str, token: &LeaseToken) -> Result<bool, LeaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn key_format() {
        let id = JobId::from_ulid(Ulid::nil());
        assert_eq!(lease_key(id), format!("job:lease:job-{}", Ulid::nil()));
    }
}
