//! InMemoryLeaseService - テスト・単一プロセス用の Lease Service
//!
//! TTL は注入された Clock で判定するので、テストでは FixedClock を進めて期限切れを再現できます。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::transition::later_by;
use crate::domain::{LeaseError, LeaseToken};
use crate::ports::{Clock, LeaseService};

#[derive(Debug, Clone)]
struct LeaseEntry {
    token: LeaseToken,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryLeaseService {
    leases: Mutex<HashMap<String, LeaseEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLeaseService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Token of the live lease on `key`, if any.
    pub async fn holder(&self, key: &str) -> Option<LeaseToken> {
        let now = self.clock.now();
        let leases = self.leases.lock().await;
        leases
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.token)
    }
}

#[async_trait]
impl LeaseService for InMemoryLeaseService {
    async fn acquire(
        &self,
        key: &str,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let now = self.clock.now();
        let mut leases = self.leases.lock().await;
        if let Some(entry) = leases.get(key) {
            if entry.expires_at > now {
                return Ok(false);
            }
        }
        leases.insert(
            key.to_string(),
            LeaseEntry {
                token: *token,
                expires_at: later_by(now, ttl),
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, token: &LeaseToken) -> Result<bool, LeaseError> {
        let mut leases = self.leases.lock().await;
        match leases.get(key) {
            Some(entry) if entry.token == *token => {
                leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn service() -> (InMemoryLeaseService, FixedClock) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        (InMemoryLeaseService::new(Arc::new(clock.clone())), clock)
    }

    fn token() -> LeaseToken {
        LeaseToken::from_ulid(Ulid::new())
    }

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn second_acquire_is_contended() {
        let (leases, _) = service();
        let (a, b) = (token(), token());

        assert!(leases.acquire("job:lease:1", &a, TTL).await.unwrap());
        assert!(!leases.acquire("job:lease:1", &b, TTL).await.unwrap());
        assert_eq!(leases.holder("job:lease:1").await, Some(a));
    }

    #[tokio::test]
    async fn expired_lease_can_be_reacquired() {
        let (leases, clock) = service();
        let (a, b) = (token(), token());
        leases.acquire("k", &a, TTL).await.unwrap();

        clock.advance(TTL);

        assert!(leases.acquire("k", &b, TTL).await.unwrap());
        assert_eq!(leases.holder("k").await, Some(b));
    }

    #[tokio::test]
    async fn release_with_foreign_token_is_noop() {
        let (leases, clock) = service();
        let (a, b) = (token(), token());
        leases.acquire("k", &a, TTL).await.unwrap();
        clock.advance(TTL);
        leases.acquire("k", &b, TTL).await.unwrap();

        // a's lease expired and b re-acquired: a must not delete b's lease
        assert!(!leases.release("k", &a).await.unwrap());
        assert_eq!(leases.holder("k").await, Some(b));

        assert!(leases.release("k", &b).await.unwrap());
        assert_eq!(leases.holder("k").await, None);
    }

    #[tokio::test]
    async fn release_of_missing_key_is_noop() {
        let (leases, _) = service();
        assert!(!leases.release("nothing", &token()).await.unwrap());
    }

    #[tokio::test]
    async fn huge_ttl_saturates_and_blocks_others() {
        let (leases, clock) = service();
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
