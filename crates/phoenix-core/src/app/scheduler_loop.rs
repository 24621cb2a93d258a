//! SchedulerLoop - 実行可能なジョブを拾って実行するループ
//!
//! # フロー（1 候補あたり）
//! 1. 新しい LeaseToken を生成して `job:lease:<id>` を acquire
//! 2. RetryPending なら Pending に戻し、Pending -> Running（どちらも CAS）
//! 3. `execution_timeout` 付きで実行
//! 4. 結果に応じて Completed / RetryPending / Failed（CAS）
//! 5. 結果に関係なく lease を release
//!
//! Lease を取れても CAS に負ければそのジョブは諦めます。正しさは Store の CAS が担保し、
//! Lease は同時実行の無駄を減らすためだけに使います。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::config::WorkerConfig;
use super::status::{CycleReport, Disposition};
use crate::domain::{
    ExecutionError, Job, JobStatus, LeaseToken, RetryPolicy, StoreError, Transition,
};
use crate::ports::{Clock, IdGenerator, JobExecutor, JobStore, LeaseService, lease_key};

pub struct SchedulerLoop {
    worker_id: String,
    store: Arc<dyn JobStore>,
    leases: Arc<dyn LeaseService>,
    executor: Arc<dyn JobExecutor>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    batch_size: usize,
    lease_ttl: Duration,
    execution_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl SchedulerLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn JobStore>,
        leases: Arc<dyn LeaseService>,
        executor: Arc<dyn JobExecutor>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            leases,
            executor,
            clock,
            ids,
            batch_size: config.batch_size,
            lease_ttl: config.lease_ttl,
            execution_timeout: config.execution_timeout,
            retry_policy: config.retry_policy.clone(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run one scheduling pass over the currently eligible jobs.
    ///
    /// Only the candidate listing can fail; per-job problems are recorded in
    /// the report and logged.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let now = self.clock.now();
        let candidates = self.store.find_schedulable(now, self.batch_size).await?;

        let mut report = CycleReport::default();
        for job in candidates {
            let disposition = self.process(job).await;
            report.record(disposition);
        }
        if report.candidates > 0 {
            debug!(?report, "scheduler cycle finished");
        }
        Ok(report)
    }

    /// Loop with a fixed delay between cycles until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, interval: Duration) {
        info!(worker_id = %self.worker_id, "scheduler loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) = self.run_cycle().await {
                warn!(worker_id = %self.worker_id, error = %err, "scheduler cycle failed");
            }
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!(worker_id = %self.worker_id, "scheduler loop stopped");
    }

    async fn process(&self, job: Job) -> Disposition {
        let job_id = job.id;
        let key = lease_key(job_id);
        let token = self.ids.generate_lease_token();

        match self.leases.acquire(&key, &token, self.lease_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(job_id = %job_id, "lease held elsewhere, skipping");
                return Disposition::Contended;
            }
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "lease backend unavailable, skipping");
                return Disposition::Unavailable;
            }
        }

        let disposition = self.execute_leased(job, &token).await;

        match self.leases.release(&key, &token).await {
            Ok(true) => {}
            Ok(false) => debug!(job_id = %job_id, "lease already expired or taken over"),
            Err(err) => warn!(job_id = %job_id, error = %err, "lease release failed"),
        }
        disposition
    }

    #[instrument(
        skip(self, job, token),
        fields(job_id = %job.id, attempt = job.attempt_count + 1, worker_id = %self.worker_id)
    )]
    async fn execute_leased(&self, job: Job, token: &LeaseToken) -> Disposition {
        let job = if job.status == JobStatus::RetryPending {
            match self.transition(&job, job.promote()).await {
                Ok(pending) => pending,
                Err(disposition) => return disposition,
            }
        } else {
            job
        };

        let running = match self.transition(&job, job.start()).await {
            Ok(running) => running,
            Err(disposition) => return disposition,
        };
        debug!(%token, "job started");

        let result = tokio::time::timeout(self.execution_timeout, self.executor.execute(&running))
            .await
            .unwrap_or_else(|_| Err(ExecutionError::timeout(self.execution_timeout)));

        let plan = match &result {
            Ok(()) => running.complete(),
            Err(err) => running.fail_attempt(err, &self.retry_policy, self.clock.now()),
        };

        let finished = match self.transition(&running, plan).await {
            Ok(finished) => finished,
            Err(disposition) => {
                // recovery reclaimed the job while it ran; the outcome is dropped
                warn!("outcome dropped after the job was reclaimed");
                return disposition;
            }
        };

        match (finished.status, result) {
            (JobStatus::Completed, _) => {
                info!("job completed");
                Disposition::Completed
            }
            (JobStatus::RetryPending, Err(err)) => {
                warn!(
                    error = %err,
                    attempt_count = finished.attempt_count,
                    next_retry_at = ?finished.next_retry_at,
                    "execution failed, retry scheduled"
                );
                Disposition::RetryScheduled
            }
            (_, result) => {
                let reason = result.err().map(|e| e.to_string()).unwrap_or_default();
                error!(
                    error = %reason,
                    attempt_count = finished.attempt_count,
                    "execution failed, job dead-lettered"
                );
                Disposition::DeadLettered
            }
        }
    }

    async fn transition(&self, job: &Job, plan: Transition) -> Result<Job, Disposition> {
        match self.store.compare_and_swap_status(job.id, &plan).await {
            Ok(updated) => Ok(updated),
            Err(err) if err.is_conflict() => {
                debug!(job_id = %job.id, error = %err, "state conflict, abandoning job");
                Err(Disposition::Conflicted)
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "store unavailable, abandoning job");
                Err(Disposition::Unavailable)
            }
        }
    }
}
