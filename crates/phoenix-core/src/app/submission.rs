//! SubmissionGuard - 冪等なジョブ投入
//!
//! # フロー（store-first）
//! 1. idempotency key で検索。見つかればそのまま返す（副作用なし）
//! 2. Created で insert。unique 制約の競合に負けたら既存レコードを返す
//! 3. Created -> Pending に昇格して返す
//!
//! 2 と 3 の間でプロセスが落ちても、ジョブは Created のまま残り、
//! RecoverySweep が後で Pending に昇格させます（失われず、遅れるだけ）。

use std::sync::Arc;

use tracing::{info, instrument};

use crate::domain::{Job, JobId, NewJob, StoreError};
use crate::ports::{Clock, IdGenerator, JobStore};

/// Result of a submission: a new record or the existing one for the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Created(Job),
    Existing(Job),
}

impl Submission {
    pub fn job(&self) -> &Job {
        match self {
            Submission::Created(job) | Submission::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Submission::Created(job) | Submission::Existing(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Submission::Created(_))
    }

    /// HTTP-style status code: 201 for a new job, 200 for an idempotent hit.
    pub fn status_code(&self) -> u16 {
        if self.is_created() { 201 } else { 200 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("invalid submission: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct SubmissionGuard {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl SubmissionGuard {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, clock, ids }
    }

    #[instrument(skip(self, request), fields(idempotency_key = %request.idempotency_key))]
    pub async fn submit(&self, request: NewJob) -> Result<Submission, SubmissionError> {
        validate(&request)?;

        if let Some(existing) = self
            .store
            .find_by_idempotency_key(&request.idempotency_key)
            .await?
        {
            info!(job_id = %existing.id, "idempotency hit");
            return Ok(Submission::Existing(existing));
        }

        let key = request.idempotency_key.clone();
        let job = Job::new(self.ids.generate_job_id(), request, self.clock.now());
        match self.store.insert(job.clone()).await {
            Ok(()) => {}
            Err(StoreError::DuplicateKey(_)) => {
                // 同じ key の並行投入に負けた
                let existing = self
                    .store
                    .find_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Backend(format!("key {key} vanished after conflict"))
                    })?;
                info!(job_id = %existing.id, "idempotency hit after concurrent insert");
                return Ok(Submission::Existing(existing));
            }
            Err(err) => return Err(err.into()),
        }

        let pending = self
            .store
            .compare_and_swap_status(job.id, &job.promote())
            .await?;
        info!(job_id = %pending.id, target_url = %pending.target_url, "job accepted");
        Ok(Submission::Created(pending))
    }

    /// Current record for asynchronous status queries.
    pub async fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.store.find_by_id(id).await
    }
}

fn validate(request: &NewJob) -> Result<(), SubmissionError> {
    if request.idempotency_key.trim().is_empty() {
        return Err(SubmissionError::Invalid(
            "idempotencyKey must not be empty".to_string(),
        ));
    }
    let url = request.target_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SubmissionError::Invalid(format!(
            "targetUrl must be an http(s) URL, got {url:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::impls::InMemoryJobStore;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::{TimeZone, Utc};

    fn guard() -> (SubmissionGuard, Arc<InMemoryJobStore>) {
        let clock: Arc<dyn Clock> =
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(InMemoryJobStore::new(clock.clone()));
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        (SubmissionGuard::new(store.clone(), clock, ids), store)
    }

    fn request(key: &str) -> NewJob {
        NewJob::new("https://example.test/hook", r#"{"n":1}"#, key)
    }

    #[tokio::test]
    async fn new_submission_is_pending_and_201() {
        let (guard, _) = guard();

        let submission = guard.submit(request("k1")).await.unwrap();

        assert_eq!(submission.status_code(), 201);
        let job = submission.job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(job.max_retries, 5);
    }

    #[tokio::test]
    async fn resubmission_returns_existing_unchanged() {
        let (guard, store) = guard();
        let first = guard.submit(request("k1")).await.unwrap().into_job();

        let second = guard.submit(request("k1")).await.unwrap();

        assert_eq!(second.status_code(), 200);
        assert_eq!(second.job(), &first);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn find_returns_current_record() {
        let (guard, _) = guard();
        let job = guard.submit(request("k1")).await.unwrap().into_job();

        assert_eq!(guard.find(job.id).await.unwrap(), Some(job));
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_store() {
        let (guard, store) = guard();

        let empty_key = guard.submit(request("  ")).await.unwrap_err();
        let bad_url = guard
            .submit(NewJob::new("ftp://example.test", "", "k"))
            .await
            .unwrap_err();

        assert!(matches!(empty_key, SubmissionError::Invalid(_)));
        assert!(matches!(bad_url, SubmissionError::Invalid(_)));
        assert!(store.is_empty().await);
    }
}
