use std::sync::atomic::Ordering;

use tracing::info;

use runq_core::{Job, JobDescription, JobId, JobStatus, Result, SchedulerError};

use super::LocalScheduler;

impl LocalScheduler {
    /// Submit a batch job. Returns as soon as the job is queued; process
    /// creation happens on the poller thread.
    pub fn submit_job(&self, description: JobDescription) -> Result<Job> {
        if description.interactive {
            return Err(SchedulerError::InvalidJobDescription(
                "interactive jobs must be submitted with submit_interactive_job".to_string(),
            ));
        }
        self.submit(description)
    }

    /// Submit an interactive job. Its stdio becomes available through
    /// [`take_streams`](Self::take_streams) once the job is running.
    pub fn submit_interactive_job(&self, description: JobDescription) -> Result<Job> {
        if !description.interactive {
            return Err(SchedulerError::InvalidJobDescription(
                "description is not marked interactive".to_string(),
            ));
        }
        self.submit(description)
    }

    fn submit(&self, description: JobDescription) -> Result<Job> {
        self.shared.ensure_open()?;
        description.validate()?;

        let queue_name = if description.queue_name.is_empty() {
            self.shared.config.default_queue.as_str()
        } else {
            description.queue_name.as_str()
        };
        let queue = self
            .shared
            .queue(queue_name)
            .ok_or_else(|| SchedulerError::NoSuchQueue(queue_name.to_string()))?;

        let id = JobId::new(&self.shared.id_prefix, self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let job = Job::new(id, description, queue.name());
        info!(queue = queue.name(), job_id = %job.id(), label = job.label(), "Job submitted");

        if queue.submit(job.clone()) {
            self.shared.wakeup.notify();
        }
        if let Ok(mut m) = self.shared.metrics.write() {
            m.record_submitted(queue.name());
        }
        Ok(job)
    }

    /// Cancel a job. Pending jobs are DONE on return; running jobs get a
    /// destroy request that the poller confirms on a later tick. Cancelling
    /// a finished job returns its status unchanged.
    pub fn cancel_job(&self, job: &Job) -> Result<JobStatus> {
        self.shared.ensure_open()?;
        let queue = self
            .shared
            .queue(job.queue_name())
            .ok_or_else(|| SchedulerError::NoSuchJob(job.id().clone()))?;
        let cancellation = queue
            .cancel(job.id())
            .ok_or_else(|| SchedulerError::NoSuchJob(job.id().clone()))?;

        if cancellation.removed_pending {
            if let Ok(mut m) = self.shared.metrics.write() {
                m.record_cancelled(queue.name());
            }
        }
        Ok(cancellation.status)
    }
}
