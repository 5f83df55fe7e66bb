//! Local scheduler engine -- owns the named queues and the single poller thread.
//!
//! Split into focused submodules:
//! - `core`: LocalScheduler struct, construction, shutdown, and accessors
//! - `submission`: description validation, queue dispatch, and cancellation
//! - `queries`: status, listing, and wait operations
//! - `poller`: the periodic tick that starts, reconciles, and trims queues

mod core;
mod poller;
mod queries;
mod submission;
#[cfg(test)]
mod tests;

use runq_core::{Job, JobDescription, JobStatus, QueueStatus, Result, Scheduler, Streams};

pub use self::core::LocalScheduler;

/// Backend name, also the prefix of every job id.
pub const ADAPTOR_NAME: &str = "local";

impl Scheduler for LocalScheduler {
    fn adaptor_name(&self) -> &str {
        ADAPTOR_NAME
    }

    fn submit_job(&self, description: JobDescription) -> Result<Job> {
        LocalScheduler::submit_job(self, description)
    }

    fn submit_interactive_job(&self, description: JobDescription) -> Result<Job> {
        LocalScheduler::submit_interactive_job(self, description)
    }

    fn take_streams(&self, job: &Job) -> Result<Option<Streams>> {
        LocalScheduler::take_streams(self, job)
    }

    fn get_job_status(&self, job: &Job) -> Result<JobStatus> {
        LocalScheduler::get_job_status(self, job)
    }

    fn get_job_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>> {
        LocalScheduler::get_job_statuses(self, jobs)
    }

    fn cancel_job(&self, job: &Job) -> Result<JobStatus> {
        LocalScheduler::cancel_job(self, job)
    }

    fn get_jobs(&self, queue_names: &[&str]) -> Result<Vec<Job>> {
        LocalScheduler::get_jobs(self, queue_names)
    }

    fn get_queue_names(&self) -> Vec<String> {
        LocalScheduler::get_queue_names(self)
    }

    fn get_default_queue_name(&self) -> &str {
        LocalScheduler::get_default_queue_name(self)
    }

    fn get_queue_status(&self, queue_name: &str) -> Result<QueueStatus> {
        LocalScheduler::get_queue_status(self, queue_name)
    }

    fn get_queue_statuses(&self, queue_names: &[&str]) -> Result<Vec<QueueStatus>> {
        LocalScheduler::get_queue_statuses(self, queue_names)
    }

    fn wait_until_running(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        LocalScheduler::wait_until_running(self, job, timeout_ms)
    }

    fn wait_until_done(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        LocalScheduler::wait_until_done(self, job, timeout_ms)
    }

    fn is_open(&self) -> bool {
        LocalScheduler::is_open(self)
    }

    fn end(&self) {
        LocalScheduler::end(self)
    }
}
