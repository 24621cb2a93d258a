//! phoenix-core
//!
//! Core building blocks for the Phoenix job runner: at-least-once webhook
//! delivery with leases, retries and crash recovery.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, job, transition, retry, errors）
//! - **ports**: 抽象化レイヤー（JobStore, LeaseService, JobExecutor, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, submission, scheduler_loop, recovery_sweep）
//! - **impls**: 実装（in-memory, SQLite, HTTP webhook）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Submission, Worker, WorkerBuilder, WorkerConfig};
pub use domain::{Job, JobId, JobStatus, NewJob};
