//! Status - 件数ビューと 1 サイクルごとの結果レポート

use serde::{Deserialize, Serialize};

use crate::domain::JobStatus;

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub created: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub retry_pending: usize,
}

impl JobCounts {
    pub fn add(&mut self, status: JobStatus, n: usize) {
        match status {
            JobStatus::Created => self.created += n,
            JobStatus::Pending => self.pending += n,
            JobStatus::Running => self.running += n,
            JobStatus::Completed => self.completed += n,
            JobStatus::Failed => self.failed += n,
            JobStatus::RetryPending => self.retry_pending += n,
        }
    }

    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Created => self.created,
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::RetryPending => self.retry_pending,
        }
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// What happened to one scheduling candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    RetryScheduled,
    DeadLettered,
    /// Another worker holds the lease.
    Contended,
    /// The store rejected a transition; another process moved the job first.
    Conflicted,
    /// Lease or store backend error; the job is left for a later cycle.
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub candidates: usize,
    pub completed: usize,
    pub retry_scheduled: usize,
    pub dead_lettered: usize,
    pub contended: usize,
    pub conflicted: usize,
    pub unavailable: usize,
}

impl CycleReport {
    pub fn record(&mut self, disposition: Disposition) {
        self.candidates += 1;
        match disposition {
            Disposition::Completed => self.completed += 1,
            Disposition::RetryScheduled => self.retry_scheduled += 1,
            Disposition::DeadLettered => self.dead_lettered += 1,
            Disposition::Contended => self.contended += 1,
            Disposition::Conflicted => self.conflicted += 1,
            Disposition::Unavailable => self.unavailable += 1,
        }
    }

    /// Number of jobs this worker actually executed.
    pub fn executed(&self) -> usize {
        self.completed + self.retry_scheduled + self.dead_lettered
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Zombies put back to Pending.
    pub requeued: usize,
    /// Zombies that exhausted their retries.
    pub dead_lettered: usize,
    /// Jobs left in Created by a crashed submitter, promoted to Pending.
    pub promoted: usize,
    /// Candidates another process changed first.
    pub conflicted: usize,
}
