use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobId;

/// Errors returned directly to callers of a [`Scheduler`](crate::Scheduler).
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid job description: {0}")]
    InvalidJobDescription(String),

    #[error("Incomplete job description: {0}")]
    IncompleteJobDescription(String),

    #[error("No such job: {0}")]
    NoSuchJob(JobId),

    #[error("No such queue: {0}")]
    NoSuchQueue(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler is closed")]
    ClosedEngine,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// A failure captured into a job or queue status instead of being returned.
///
/// Per-job failures live here so that one bad job never aborts the poller
/// or a batch query.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobFailure {
    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Job exceeded its maximum run time of {0}ms")]
    TimedOut(u64),

    #[error("Failed to create process: {0}")]
    ProcessCreation(String),

    #[error("Process did not terminate after {0} destroy attempts")]
    Unterminated(u32),

    #[error("No such job: {0}")]
    NoSuchJob(String),

    #[error("No such queue: {0}")]
    NoSuchQueue(String),
}

impl JobFailure {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, JobFailure::Cancelled(_))
    }
}
