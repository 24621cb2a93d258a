//! RecoverySweep - クラッシュした worker が残したジョブの回収
//!
//! `staleness_threshold` より長く Running のままのジョブは worker が落ちたとみなし、
//! attempt を 1 つ消費して Pending に戻します（上限超過なら Failed）。
//! 提出者が insert と昇格の間で落ちて Created のまま残ったジョブも Pending に昇格させます。
//!
//! Lease Service とは一切やりとりしません。二重回収は CAS の precondition
//! （一覧時点の status + version）で防ぎます。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::config::WorkerConfig;
use super::status::SweepReport;
use crate::domain::transition::earlier_by;
use crate::domain::{Job, JobStatus, StoreError};
use crate::ports::{Clock, JobStore};

pub struct RecoverySweep {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    staleness_threshold: Duration,
    batch_size: usize,
}

impl RecoverySweep {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, config: &WorkerConfig) -> Self {
        Self {
            store,
            clock,
            staleness_threshold: config.staleness_threshold,
            batch_size: config.sweep_batch_size,
        }
    }

    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let cutoff = earlier_by(self.clock.now(), self.staleness_threshold);
        let mut report = SweepReport::default();

        let zombies = self
            .store
            .find_by_status_and_updated_before(JobStatus::Running, cutoff, self.batch_size)
            .await?;
        for job in zombies {
            self.reclaim(job, &mut report).await;
        }

        let stranded = self
            .store
            .find_by_status_and_updated_before(JobStatus::Created, cutoff, self.batch_size)
            .await?;
        for job in stranded {
            match self.store.compare_and_swap_status(job.id, &job.promote()).await {
                Ok(_) => {
                    info!(job_id = %job.id, "stranded submission promoted to pending");
                    report.promoted += 1;
                }
                Err(err) => self.skip(&job, err, &mut report),
            }
        }

        if report != SweepReport::default() {
            info!(?report, "recovery sweep finished");
        }
        Ok(report)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, interval: Duration) {
        info!("recovery sweep started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) = self.sweep().await {
                warn!(error = %err, "recovery sweep failed");
            }
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("recovery sweep stopped");
    }

    async fn reclaim(&self, job: Job, report: &mut SweepReport) {
        match self.store.compare_and_swap_status(job.id, &job.recover()).await {
            Ok(updated) if updated.status == JobStatus::Failed => {
                error!(
                    job_id = %job.id,
                    attempt_count = updated.attempt_count,
                    max_retries = updated.max_retries,
                    "zombie job dead-lettered by crash recovery"
                );
                report.dead_lettered += 1;
            }
            Ok(updated) => {
                warn!(
                    job_id = %job.id,
                    attempt_count = updated.attempt_count,
                    "zombie job requeued by crash recovery"
                );
                report.requeued += 1;
            }
            Err(err) => self.skip(&job, err, report),
        }
    }

    fn skip(&self, job: &Job, err: StoreError, report: &mut SweepReport) {
        if err.is_conflict() {
            debug!(job_id = %job.id, error = %err, "job changed since listing, skipped");
            report.conflicted += 1;
        } else {
            warn!(job_id = %job.id, error = %err, "recovery transition failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewJob, RECOVERED_ERROR};
    use crate::impls::InMemoryJobStore;
    use crate::ports::{FixedClock, IdGenerator, UlidGenerator};
    use chrono::{TimeZone, Utc};

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    struct Fixture {
        clock: FixedClock,
        store: Arc<InMemoryJobStore>,
        sweep: RecoverySweep,
        ids: UlidGenerator<FixedClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
            let shared: Arc<dyn Clock> = Arc::new(clock.clone());
            let store = Arc::new(InMemoryJobStore::new(shared.clone()));
            let sweep = RecoverySweep::new(store.clone(), shared, &WorkerConfig::default());
            Self {
                ids: UlidGenerator::new(clock.clone()),
                clock,
                store,
                sweep,
            }
        }

        async fn created(&self, key: &str, max_retries: u32) -> Job {
            let job = Job::new(
                self.ids.generate_job_id(),
                NewJob::new("https://example.test/hook", "{}", key).with_max_retries(max_retries),
                self.clock.now(),
            );
            self.store.insert(job.clone()).await.unwrap();
            job
        }

        async fn running(&self, key: &str, max_retries: u32) -> Job {
            let job = self.created(key, max_retries).await;
            let pending = self
                .store
                .compare_and_swap_status(job.id, &job.promote())
                .await
                .unwrap();
            self.store
                .compare_and_swap_status(job.id, &pending.start())
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn stale_running_job_is_requeued_with_one_more_attempt() {
        let fx = Fixture::new();
        let job = fx.running("k1", 5).await;
        fx.clock.advance(FIVE_MINUTES + Duration::from_millis(1));

        let report = fx.sweep.sweep().await.unwrap();

        assert_eq!(report.requeued, 1);
        let stored = fx.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some(RECOVERED_ERROR));
    }

    #[tokio::test]
    async fn job_within_threshold_is_untouched() {
        let fx = Fixture::new();
        let job = fx.running("k1", 5).await;
        fx.clock.advance(FIVE_MINUTES - Duration::from_secs(1));

        let report = fx.sweep.sweep().await.unwrap();

        assert_eq!(report, SweepReport::default());
        let stored = fx.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored, job);
    }

    #[tokio::test]
    async fn exhausted_zombie_is_dead_lettered() {
        let fx = Fixture::new();
        let job = fx.running("k1", 0).await;
        fx.clock.advance(FIVE_MINUTES * 2);

        let report = fx.sweep.sweep().await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        let stored = fx.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempt_count, 1);
    }

    #[tokio::test]
    async fn second_sweep_does_not_double_charge() {
        let fx = Fixture::new();
        let job = fx.running("k1", 5).await;
        fx.clock.advance(FIVE_MINUTES * 2);

        fx.sweep.sweep().await.unwrap();
        let again = fx.sweep.sweep().await.unwrap();

        assert_eq!(again, SweepReport::default());
        let stored = fx.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
    }

    #[tokio::test]
    async fn stranded_created_job_is_promoted_without_charge() {
        let fx = Fixture::new();
        let job = fx.created("k1", 5).await;
        fx.clock.advance(FIVE_MINUTES * 2);

        let report = fx.sweep.sweep().await.unwrap();

        assert_eq!(report.promoted, 1);
        let stored = fx.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.attempt_count, 0);
    }

    #[tokio::test]
    async fn terminal_jobs_are_never_listed() {
        let fx = Fixture::new();
        let job = fx.running("k1", 5).await;
        let done = fx
            .store
            .compare_and_swap_status(job.id, &job.complete())
            .await
            .unwrap();
        fx.clock.advance(FIVE_MINUTES * 10);

        let report = fx.sweep.sweep().await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(fx.store.find_by_id(job.id).await.unwrap(), Some(done));
    }

    #[tokio::test]
    async fn unrepresentable_threshold_finds_nothing_instead_of_panicking() {
        let fx = Fixture::new();
        let job = fx.running("k1", 5).await;
        let config = WorkerConfig {
            staleness_threshold: Duration::from_secs(10_000_000_000_000),
            ..WorkerConfig::default()
        };
        let sweep = RecoverySweep::new(fx.store.clone(), Arc::new(fx.clock.clone()), &config);

        let report = tokio::spawn(async move { sweep.sweep().await })
            .await
            .expect("sweep task must not panic")
            .unwrap();

        assert_eq!(report, SweepReport::default());
        let stored = fx.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
    }
}
