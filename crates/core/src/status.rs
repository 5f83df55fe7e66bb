use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobFailure;
use crate::job::JobId;

/// Lifecycle state of a job as seen by a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    /// Placeholder state for batch queries on unknown jobs.
    Unknown,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Done => write!(f, "DONE"),
            JobState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Point-in-time snapshot of a job. Re-derived on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub queue: String,
    pub state: JobState,
    /// Present once the process finished; absent if it never started.
    pub exit_code: Option<i32>,
    pub error: Option<JobFailure>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Backend-specific details such as the process id.
    #[serde(default)]
    pub info: BTreeMap<String, String>,
}

impl JobStatus {
    /// Placeholder returned by batch queries in place of an error.
    pub fn not_found(job_id: JobId) -> Self {
        let error = JobFailure::NoSuchJob(job_id.to_string());
        Self {
            job_id,
            queue: String::new(),
            state: JobState::Unknown,
            exit_code: None,
            error: Some(error),
            submitted_at: None,
            started_at: None,
            finished_at: None,
            info: BTreeMap::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn was_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(JobFailure::is_cancellation)
    }
}

/// Concurrency policy of a named queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "limit", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// At most one running job.
    Single,
    /// At most `n` running jobs.
    Multi(usize),
    /// No cap.
    Unlimited,
}

impl QueuePolicy {
    /// Maximum number of concurrently running jobs, `None` when uncapped.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            QueuePolicy::Single => Some(1),
            QueuePolicy::Multi(n) => Some(*n),
            QueuePolicy::Unlimited => None,
        }
    }

    /// Number of free slots given the number of occupied ones.
    pub fn free_slots(&self, occupied: usize) -> usize {
        match self.capacity() {
            Some(cap) => cap.saturating_sub(occupied),
            None => usize::MAX,
        }
    }
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuePolicy::Single => write!(f, "single"),
            QueuePolicy::Multi(n) => write!(f, "multi({})", n),
            QueuePolicy::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Snapshot of one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub name: String,
    pub policy: Option<QueuePolicy>,
    pub pending: usize,
    pub running: usize,
    pub finished: usize,
    pub error: Option<JobFailure>,
}

impl QueueStatus {
    /// Placeholder returned by batch queries for unconfigured queue names.
    pub fn not_found(name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: None,
            pending: 0,
            running: 0,
            finished: 0,
            error: Some(JobFailure::NoSuchQueue(name.to_string())),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
