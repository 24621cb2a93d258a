//! WorkerBuilder - worker の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須コンポーネント（store / lease / executor）が欠けていれば build() で失敗
//! - WorkerConfig::validate() を build() 時に実行
//! - clock / id generator は省略時 SystemClock / UlidGenerator

use std::sync::Arc;

use ulid::Ulid;

use super::config::{ConfigError, WorkerConfig};
use super::recovery_sweep::RecoverySweep;
use super::scheduler_loop::SchedulerLoop;
use super::submission::SubmissionGuard;
use super::worker::Worker;
use crate::ports::{
    Clock, IdGenerator, JobExecutor, JobStore, LeaseService, SystemClock, UlidGenerator,
};

/// # 使用例
/// ```ignore
/// let worker = WorkerBuilder::new()
///     .store(store)
///     .leases(leases)
///     .executor(executor)
///     .build()?;
/// let handle = worker.spawn();
/// ```
#[derive(Default)]
pub struct WorkerBuilder {
    worker_id: Option<String>,
    store: Option<Arc<dyn JobStore>>,
    leases: Option<Arc<dyn LeaseService>>,
    executor: Option<Arc<dyn JobExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: WorkerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier used in log fields. Defaults to a random `worker-<ulid>`.
    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn leases(mut self, leases: Arc<dyn LeaseService>) -> Self {
        self.leases = Some(leases);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Worker, BuildError> {
        self.config.validate()?;

        let store = self.store.ok_or(BuildError::MissingComponent("store"))?;
        let leases = self.leases.ok_or(BuildError::MissingComponent("leases"))?;
        let executor = self
            .executor
            .ok_or(BuildError::MissingComponent("executor"))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self.ids.unwrap_or_else(|| {
            Arc::new(UlidGenerator::new(clock.clone())) as Arc<dyn IdGenerator>
        });
        let worker_id = self
            .worker_id
            .unwrap_or_else(|| format!("worker-{}", Ulid::new()));

        let scheduler = SchedulerLoop::new(
            worker_id,
            store.clone(),
            leases,
            executor,
            clock.clone(),
            ids.clone(),
            &self.config,
        );
        let recovery = RecoverySweep::new(store.clone(), clock.clone(), &self.config);
        let submissions = SubmissionGuard::new(store, clock, ids);

        Ok(Worker::new(
            scheduler,
            recovery,
            submissions,
            self.config.scheduler_interval,
            self.config.recovery_interval,
        ))
    }
}
