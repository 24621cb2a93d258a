//! Impls - ports の実装
//!
//! - **InMemoryJobStore / InMemoryLeaseService**: テスト・単一プロセス用
//! - **SqliteJobStore / SqliteLeaseService**: 複数プロセスで共有する永続実装
//! - **HttpWebhookExecutor**: reqwest による webhook 呼び出し

pub mod inmem_lease;
pub mod inmem_store;
pub mod sqlite;
pub mod webhook;

pub use self::inmem_lease::InMemoryLeaseService;
pub use self::inmem_store::InMemoryJobStore;
pub use self::sqlite::{SqliteJobStore, SqliteLeaseService};
pub use self::webhook::HttpWebhookExecutor;
