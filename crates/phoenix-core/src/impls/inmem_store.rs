//! InMemoryJobStore - テスト・単一プロセス用の Job Store
//!
//! 1 つの Mutex の中で read-modify-write を完結させることで、
//! compare-and-swap と idempotency key の一意性を保証します。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::app::status::JobCounts;
use crate::domain::{Job, JobId, JobStatus, StoreError, Transition};
use crate::ports::{Clock, JobStore};

#[derive(Default)]
struct InMemoryStoreState {
    /// All job records (single source of truth).
    jobs: HashMap<JobId, Job>,

    /// Unique index: idempotency key -> job id.
    by_key: HashMap<String, JobId>,
}

pub struct InMemoryJobStore {
    state: Mutex<InMemoryStoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryStoreState::default()),
            clock,
        }
    }

    /// Number of stored records (for testing).
    pub async fn len(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.by_key.contains_key(&job.idempotency_key) {
            return Err(StoreError::DuplicateKey(job.idempotency_key));
        }
        state.by_key.insert(job.idempotency_key.clone(), job.id);
        state.jobs.insert(job.id, job);
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_key
            .get(key)
            .and_then(|id| state.jobs.get(id))
            .cloned())
    }

    async fn find_by_status_and_updated_before(
        &self,
        status: JobStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut found: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.is_stale(status, cutoff))
            .cloned()
            .collect();
        found.sort_by_key(|job| (job.updated_at, job.id));
        found.truncate(limit);
        Ok(found)
    }

    async fn find_schedulable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut found: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect();
        found.sort_by_key(|job| (job.created_at, job.id));
        found.truncate(limit);
        Ok(found)
    }

    async fn compare_and_swap_status(
        &self,
        id: JobId,
        transition: &Transition,
    ) -> Result<Job, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let current = state.jobs.get(&id).ok_or(StoreError::NotFound(id))?;
        let next = current.apply(transition, now)?;
        state.jobs.insert(id, next.clone());
        Ok(next)
    }

    async fn counts_by_status(&self) -> Result<JobCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = JobCounts::default();
        for job in state.jobs.values() {
            counts.add(job.status, 1);
        }
        Ok(counts)
    }
}
