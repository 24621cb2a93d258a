//! App - アプリケーション層
//!
//! ports を組み合わせてジョブ実行のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **WorkerBuilder**: worker の構築とワイヤリング（起動時検証）
//! - **SubmissionGuard**: idempotency key による冪等な投入
//! - **SchedulerLoop**: lease -> CAS -> 実行 -> CAS -> release
//! - **RecoverySweep**: クラッシュした worker が残したジョブの回収

pub mod builder;
pub mod config;
pub mod recovery_sweep;
pub mod scheduler_loop;
pub mod status;
pub mod submission;
pub mod worker;

pub use self::builder::{BuildError, WorkerBuilder};
pub use self::config::{ConfigError, WorkerConfig};
pub use self::recovery_sweep::RecoverySweep;
pub use self::scheduler_loop::SchedulerLoop;
pub use self::status::{CycleReport, Disposition, JobCounts, SweepReport};
pub use self::submission::{Submission, SubmissionError, SubmissionGuard};
pub use self::worker::{Worker, WorkerHandle};
