//! IdGenerator port - ID 生成の抽象化
//!
//! 複数の worker プロセスが調整なしで ID を発行できるよう ULID を使います。

use crate::domain::ids::{JobId, LeaseToken};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散環境で使える ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    /// A fresh, single-use token for one lease acquisition attempt.
    fn generate_lease_token(&self) -> LeaseToken;
}

/// UlidGenerator は Clock ベースの ULID 生成器
///
/// FixedClock を渡すと timestamp 部分が決定的になります（ランダム部分は毎回異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_lease_token(&self) -> LeaseToken {
        LeaseToken::from(self.next_ulid())
    }
}
