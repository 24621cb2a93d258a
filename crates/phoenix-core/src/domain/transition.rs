//! Transition - 状態遷移の計画と検証
//!
//! Planning is pure: given a `Job` snapshot, each method returns the
//! `Transition` that would move it along one edge of the state machine. The
//! snapshot's status and version become the compare-and-swap precondition, so
//! a plan made from a stale snapshot is rejected by the store instead of
//! overwriting a newer record.
//!
//! `Job::apply` is the single validation point every store adapter uses.

use chrono::{DateTime, Utc};

use super::errors::{ExecutionError, StoreError};
use super::job::Job;
use super::retry::RetryPolicy;
use super::state::JobStatus;

pub const RECOVERED_ERROR: &str = "worker presumed crashed: reclaimed by recovery sweep";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub expected_status: JobStatus,
    pub expected_version: u64,
    pub to: JobStatus,
    pub attempt_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Transition {
    /// Is the edge itself allowed by the state machine?
    pub fn is_valid_edge(&self) -> bool {
        self.expected_status.can_transition_to(self.to)
    }
}

impl Job {
    fn plan(&self, to: JobStatus) -> Transition {
        Transition {
            expected_status: self.status,
            expected_version: self.version,
            to,
            attempt_count: self.attempt_count,
            next_retry_at: None,
            last_error: self.last_error.clone(),
        }
    }

    /// Created | RetryPending -> Pending.
    pub fn promote(&self) -> Transition {
        self.plan(JobStatus::Pending)
    }

    /// Pending -> Running.
    pub fn start(&self) -> Transition {
        self.plan(JobStatus::Running)
    }

    /// Running -> Completed. A successful attempt is not charged.
    pub fn complete(&self) -> Transition {
        let mut t = self.plan(JobStatus::Completed);
        t.last_error = None;
        t
    }

    /// Running -> RetryPending | Failed, charging one attempt.
    pub fn fail_attempt(
        &self,
        error: &ExecutionError,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Transition {
        let attempts = self.attempt_count.saturating_add(1);
        let mut t = if error.is_permanent() || attempts > self.max_retries {
            self.plan(JobStatus::Failed)
        } else {
            let mut t = self.plan(JobStatus::RetryPending);
            t.next_retry_at = Some(later_by(now, policy.backoff(attempts)));
            t
        };
        t.attempt_count = attempts;
        t.last_error = Some(error.to_string());
        t
    }

    /// Running -> Pending | Failed for a zombie, charging one attempt.
    pub fn recover(&self) -> Transition {
        let attempts = self.attempt_count.saturating_add(1);
        let to = if attempts > self.max_retries {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        let mut t = self.plan(to);
        t.attempt_count = attempts;
        t.last_error = Some(RECOVERED_ERROR.to_string());
        t
    }

    /// Validate `transition` against this record and produce the next record.
    ///
    /// Rejected with `StateConflict` when the precondition does not hold, the
    /// edge is not allowed, or the attempt count would go backwards.
    pub fn apply(&self, transition: &Transition, now: DateTime<Utc>) -> Result<Job, StoreError> {
        if self.status != transition.expected_status {
            return Err(StoreError::conflict(
                self.id,
                format!(
                    "expected status {} but found {}",
                    transition.expected_status, self.status
                ),
            ));
        }
        if self.version != transition.expected_version {
            return Err(StoreError::conflict(
                self.id,
                format!(
                    "expected version {} but found {}",
                    transition.expected_version, self.version
                ),
            ));
        }
        if !self.status.can_transition_to(transition.to) {
            return Err(StoreError::conflict(
                self.id,
                format!("transition {} -> {} is not allowed", self.status, transition.to),
            ));
        }
        if transition.attempt_count < self.attempt_count {
            return Err(StoreError::conflict(
                self.id,
                format!(
                    "attempt count would decrease from {} to {}",
                    self.attempt_count, transition.attempt_count
                ),
            ));
        }

        let mut next = self.clone();
        next.status = transition.to;
        next.attempt_count = transition.attempt_count;
        next.next_retry_at = transition.next_retry_at;
        next.last_error = transition.last_error.clone();
        next.version = self.version + 1;
        next.updated_at = now.max(self.updated_at);
        Ok(next)
    }
}

pub(crate) fn to_delta(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// `at + d`, saturating at the latest representable instant.
pub(crate) fn later_by(at: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    at.checked_add_signed(to_delta(d)).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - d`, saturating at the earliest representable instant.
pub(crate) fn earlier_by(at: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    at.checked_sub_signed(to_delta(d)).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
