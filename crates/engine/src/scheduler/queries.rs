use std::time::{Duration, Instant};

use runq_core::{Job, JobStatus, QueueStatus, Result, SchedulerError, Streams};

use crate::queue::Queue;

use super::LocalScheduler;

impl LocalScheduler {
    /// Queue holding `job`. Handles issued by another engine resolve to
    /// `NoSuchJob`, since their ids carry that engine's instance number.
    fn owning_queue(&self, job: &Job) -> Result<&Queue> {
        self.shared
            .queue(job.queue_name())
            .ok_or_else(|| SchedulerError::NoSuchJob(job.id().clone()))
    }

    /// Resolve queue names, treating an empty list as "all queues".
    fn resolve_queues(&self, names: &[&str]) -> Result<Vec<&Queue>> {
        if names.is_empty() {
            return Ok(self.shared.queues.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.shared
                    .queue(name)
                    .ok_or_else(|| SchedulerError::NoSuchQueue(name.to_string()))
            })
            .collect()
    }

    /// Status of one job. Unknown or evicted jobs are an error.
    pub fn get_job_status(&self, job: &Job) -> Result<JobStatus> {
        self.shared.ensure_open()?;
        self.owning_queue(job)?
            .status(job.id())
            .ok_or_else(|| SchedulerError::NoSuchJob(job.id().clone()))
    }

    /// Statuses of many jobs. Unknown jobs get a placeholder entry instead
    /// of failing the whole batch.
    pub fn get_job_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>> {
        self.shared.ensure_open()?;
        Ok(jobs
            .iter()
            .map(|job| {
                self.shared
                    .queue(job.queue_name())
                    .and_then(|q| q.status(job.id()))
                    .unwrap_or_else(|| JobStatus::not_found(job.id().clone()))
            })
            .collect())
    }

    /// Wait until the job is running (or already done).
    pub fn wait_until_running(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        self.wait_until(job, timeout_ms, |s| s.is_running() || s.is_done())
    }

    pub fn wait_until_done(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        self.wait_until(job, timeout_ms, JobStatus::is_done)
    }

    /// Re-check the job every polling interval until `ready` holds or the
    /// timeout elapses. A zero timeout returns the current status at once.
    fn wait_until(
        &self,
        job: &Job,
        timeout_ms: i64,
        ready: impl Fn(&JobStatus) -> bool,
    ) -> Result<JobStatus> {
        if timeout_ms < 0 {
            return Err(SchedulerError::InvalidArgument(format!(
                "timeout must be non-negative, got {}",
                timeout_ms
            )));
        }
        // Timeouts too large to represent never expire.
        let deadline = Instant::now().checked_add(Duration::from_millis(timeout_ms as u64));
        let interval = self.shared.config.polling_delay();

        loop {
            let status = self.get_job_status(job)?;
            if ready(&status) || timeout_ms == 0 {
                return Ok(status);
            }
            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(status);
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };
            std::thread::sleep(nap);
        }
    }

    /// Stdio of a running interactive job, handed out once.
    pub fn take_streams(&self, job: &Job) -> Result<Option<Streams>> {
        self.shared.ensure_open()?;
        let queue = self.owning_queue(job)?;
        match queue.running_process(job.id()) {
            Some(process) => Ok(process.take_streams()),
            None if queue.contains(job.id()) => Ok(None),
            None => Err(SchedulerError::NoSuchJob(job.id().clone())),
        }
    }

    /// Jobs known to the given queues, or to every queue when `queue_names` is empty.
    pub fn get_jobs(&self, queue_names: &[&str]) -> Result<Vec<Job>> {
        self.shared.ensure_open()?;
        Ok(self
            .resolve_queues(queue_names)?
            .into_iter()
            .flat_map(Queue::jobs)
            .collect())
    }

    pub fn get_queue_names(&self) -> Vec<String> {
        self.shared
            .queues
            .iter()
            .map(|q| q.name().to_string())
            .collect()
    }

    pub fn get_default_queue_name(&self) -> &str {
        &self.shared.config.default_queue
    }

    /// Status of one queue. Unknown names are an error.
    pub fn get_queue_status(&self, queue_name: &str) -> Result<QueueStatus> {
        self.shared.ensure_open()?;
        self.shared
            .queue(queue_name)
            .map(Queue::queue_status)
            .ok_or_else(|| SchedulerError::NoSuchQueue(queue_name.to_string()))
    }

    /// Statuses of many queues, every queue when `queue_names` is empty.
    /// Unknown names get a placeholder entry.
    pub fn get_queue_statuses(&self, queue_names: &[&str]) -> Result<Vec<QueueStatus>> {
        self.shared.ensure_open()?;
        if queue_names.is_empty() {
            return Ok(self.shared.queues.iter().map(Queue::queue_status).collect());
        }
        Ok(queue_names
            .iter()
            .map(|name| {
                self.shared
                    .queue(name)
                    .map(Queue::queue_status)
                    .unwrap_or_else(|| QueueStatus::not_found(name))
            })
            .collect())
    }
}
