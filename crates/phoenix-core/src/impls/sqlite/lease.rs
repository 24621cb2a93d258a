use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::to_millis;
use crate::domain::transition::later_by;
use crate::domain::{LeaseError, LeaseToken};
use crate::ports::{Clock, LeaseService};

/// `LeaseService` backed by the `leases` table.
///
/// Acquire is a single upsert that only overwrites an expired row, so two
/// processes can never both see `rows_affected == 1` for a live lease.
pub struct SqliteLeaseService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteLeaseService {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl LeaseService for SqliteLeaseService {
    async fn acquire(
        &self,
        key: &str,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let now = self.clock.now();
        let expires_at = later_by(now, ttl);
        let result = sqlx::query(
            "INSERT INTO leases (key, token, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT (key) DO UPDATE SET token = excluded.token, expires_at = excluded.expires_at \
             WHERE leases.expires_at <= ?",
        )
        .bind(key)
        .bind(token.to_string())
        .bind(to_millis(expires_at))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &str, token: &LeaseToken) -> Result<bool, LeaseError> {
        let result = sqlx::query("DELETE FROM leases WHERE key = ? AND token = ?")
            .bind(key)
            .bind(token.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::sqlite::memory_pool;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    const TTL: Duration = Duration::from_secs(30);

    async fn service() -> (SqliteLeaseService, FixedClock) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let leases = SqliteLeaseService::new(memory_pool().await, Arc::new(clock.clone()));
        (leases, clock)
    }

    fn token() -> LeaseToken {
        LeaseToken::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn live_lease_blocks_other_tokens() {
        let (leases, clock) = service().await;
        let (a, b) = (token(), token());

        assert!(leases.acquire("job:lease:x", &a, TTL).await.unwrap());
        clock.advance(Duration::from_secs(29));
        assert!(!leases.acquire("job:lease:x", &b, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over_and_old_owner_cannot_release() {
        let (leases, clock) = service().await;
        let (a, b) = (token(), token());
        leases.acquire("k", &a, TTL).await.unwrap();

        clock.advance(TTL);
        assert!(leases.acquire("k", &b, TTL).await.unwrap());

        assert!(!leases.release("k", &a).await.unwrap());
        // b still holds it
        let c = token();
        assert!(!leases.acquire("k", &c, TTL).await.unwrap());

        assert!(leases.release("k", &b).await.unwrap());
        assert!(leases.acquire("k", &c, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn huge_ttl_saturates_instead_of_panicking() {
        let (leases, clock) = service().await;
        let (a, b) = (token(), token());

        assert!(
            leases
                .acquire("k", &a, Duration::from_secs(10_000_000_000_000))
                .await
                .unwrap()
        );
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));

        assert!(!leases.acquire("k", &b, TTL).await.unwrap());
    }
}
