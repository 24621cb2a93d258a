//! State - ジョブの状態と遷移表
//!
//! State transitions:
//! - Created -> Pending (persisted; also the recovery sweep's store-first repair)
//! - Pending -> Running (lease won)
//! - Running -> Completed | Failed | RetryPending
//! - RetryPending -> Pending (backoff elapsed)
//! - Running -> Pending (stale, reclaimed by recovery)
//!
//! Completed and Failed are terminal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Persisted, not yet visible to schedulers.
    Created,

    /// Ready to be leased.
    Pending,

    /// Leased and being executed by a worker.
    Running,

    /// Execution succeeded.
    Completed,

    /// Dead-lettered (permanent error or retry budget exhausted).
    Failed,

    /// Waiting for `next_retry_at` after a transient failure.
    RetryPending,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Created,
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::RetryPending,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Is this status eligible for the scheduler (subject to `next_retry_at`)?
    pub fn is_schedulable(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::RetryPending)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Created, Pending)
                | (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, RetryPending)
                | (Running, Pending)
                | (RetryPending, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::RetryPending => "RETRY_PENDING",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use JobStatus::*;

    #[rstest]
    #[case::persisted(Created, Pending)]
    #[case::leased(Pending, Running)]
    #[case::succeeded(Running, Completed)]
    #[case::dead_lettered(Running, Failed)]
    #[case::retry(Running, RetryPending)]
    #[case::backoff_elapsed(RetryPending, Pending)]
    #[case::recovered(Running, Pending)]
    fn allowed_edges(#[case] from: JobStatus, #[case] to: JobStatus) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case::skip_pending(Created, Running)]
    #[case::retry_without_running(Pending, RetryPending)]
    #[case::retry_straight_to_running(RetryPending, Running)]
    #[case::self_loop(Running, Running)]
    #[case::pending_to_completed(Pending, Completed)]
    fn rejected_edges(#[case] from: JobStatus, #[case] to: JobStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[rstest]
    fn terminal_states_have_no_exits(#[values(Completed, Failed)] terminal: JobStatus) {
        assert!(terminal.is_terminal());
        for next in JobStatus::ALL {
            assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
        }
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&RetryPending).unwrap();
        assert_eq!(s, "\"RETRY_PENDING\"");
    }

    #[test]
    fn parses_its_own_display() {
        for status in JobStatus::ALL {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
        assert!("QUEUED".parse::<JobStatus>().is_err());
    }
}
