use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::recovery_sweep::RecoverySweep;
use super::scheduler_loop::SchedulerLoop;
use super::submission::SubmissionGuard;

/// A wired worker: scheduler, recovery sweep and the submission guard that
/// share one store.
pub struct Worker {
    pub scheduler: Arc<SchedulerLoop>,
    pub recovery: Arc<RecoverySweep>,
    pub submissions: SubmissionGuard,
    scheduler_interval: Duration,
    recovery_interval: Duration,
}

impl Worker {
    pub(crate) fn new(
        scheduler: SchedulerLoop,
        recovery: RecoverySweep,
        submissions: SubmissionGuard,
        scheduler_interval: Duration,
        recovery_interval: Duration,
    ) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
            recovery: Arc::new(recovery),
            submissions,
            scheduler_interval,
            recovery_interval,
        }
    }

    /// Start the scheduler and recovery loops as two tokio tasks.
    pub fn spawn(&self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = Arc::clone(&self.scheduler);
        let rx = shutdown_rx.clone();
        let interval = self.scheduler_interval;
        let scheduler_join = tokio::spawn(async move {
            scheduler.run(rx, interval).await;
        });

        let recovery = Arc::clone(&self.recovery);
        let interval = self.recovery_interval;
        let recovery_join = tokio::spawn(async move {
            recovery.run(shutdown_rx, interval).await;
        });

        info!(worker_id = %self.scheduler.worker_id(), "worker spawned");
        WorkerHandle {
            shutdown_tx,
            joins: vec![("scheduler", scheduler_join), ("recovery", recovery_join)],
        }
    }
}

/// Handle to running worker loops.
/// - `request_shutdown()` で新しいサイクルを止める
/// - 実行中のジョブは中断しない（完了まで待ってからループを抜ける）
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<(&'static str, JoinHandle<()>)>,
}

impl WorkerHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for both loops.
    ///
    /// Returns the names of loops that ended abnormally (panicked or were
    /// cancelled) instead of stopping on the shutdown signal.
    pub async fn shutdown_and_join(self) -> Vec<&'static str> {
        self.request_shutdown();
        let mut crashed = Vec::new();
        for (name, join) in self.joins {
            if let Err(err) = join.await {
                error!(
                    loop_name = name,
                    panicked = err.is_panic(),
                    error = %err,
                    "worker loop crashed"
                );
                crashed.push(name);
            }
        }
        crashed
    }
}
