//! JobExecutor port - ジョブの実処理（webhook 呼び出し）

use async_trait::async_trait;

use crate::domain::{ExecutionError, Job};

/// Runs a job's target action once.
///
/// The scheduler wraps every call in its own timeout, so implementations do
/// not need to bound themselves. Side effects are outside the store's
/// atomicity: a crash after the call and before the status update leads to a
/// second execution (at-least-once).
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError>;
}
