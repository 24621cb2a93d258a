//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。各 trait は外部システム
//! （SQLite / HTTP target / 時刻 / ID 生成）へのインターフェースを提供します。
//!
//! - JobStore が source of truth（正本）
//! - LeaseService はスループット最適化のための排他ヒント
//! - JobExecutor は webhook 呼び出しなどの副作用

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod job_store;
pub mod lease;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::JobExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::lease::{DEFAULT_LEASE_TTL, LeaseService, lease_key};
