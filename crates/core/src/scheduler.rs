use crate::error::Result;
use crate::job::{Job, JobDescription};
use crate::process::Streams;
use crate::status::{JobStatus, QueueStatus};

/// Capability contract shared by every scheduler backend.
///
/// Single-item queries return errors for unknown jobs or queues, while the
/// batch variants return per-entry placeholders so one bad entry never
/// aborts the whole batch.
pub trait Scheduler: Send + Sync {
    /// Short backend name, e.g. `"local"`.
    fn adaptor_name(&self) -> &str;

    fn submit_job(&self, description: JobDescription) -> Result<Job>;

    /// Submit a job whose stdio is handed back through [`take_streams`](Self::take_streams).
    fn submit_interactive_job(&self, description: JobDescription) -> Result<Job>;

    /// Stdio of a running interactive job. `None` once taken or if not yet started.
    fn take_streams(&self, job: &Job) -> Result<Option<Streams>>;

    fn get_job_status(&self, job: &Job) -> Result<JobStatus>;

    fn get_job_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>>;

    fn cancel_job(&self, job: &Job) -> Result<JobStatus>;

    /// Jobs known to the given queues; all queues when `queue_names` is empty.
    fn get_jobs(&self, queue_names: &[&str]) -> Result<Vec<Job>>;

    fn get_queue_names(&self) -> Vec<String>;

    fn get_default_queue_name(&self) -> &str;

    fn get_queue_status(&self, queue_name: &str) -> Result<QueueStatus>;

    /// Statuses for the given queues; all queues when `queue_names` is empty.
    fn get_queue_statuses(&self, queue_names: &[&str]) -> Result<Vec<QueueStatus>>;

    /// Block until the job is running or done, or `timeout_ms` elapses.
    /// `0` returns immediately; negative values are rejected.
    fn wait_until_running(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus>;

    /// Block until the job is done, or `timeout_ms` elapses.
    fn wait_until_done(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus>;

    fn is_open(&self) -> bool;

    /// Stop the scheduler. Safe to call more than once.
    fn end(&self);
}
