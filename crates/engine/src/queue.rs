//! One named job queue and its concurrency policy.
//!
//! A job moves `pending -> starting -> running -> history`. "Starting" jobs
//! have left the FIFO and occupy a slot while their process is being created
//! with the lock released. The lock is only held for state transitions,
//! never while calling the process factory or a process handle.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use runq_core::{
    InteractiveProcess, Job, JobFailure, JobId, JobState, JobStatus, ProcessFactory, QueuePolicy,
    QueueStatus,
};

const CANCELLED_BY_USER: &str = "cancelled by user";

#[derive(Debug)]
struct PendingJob {
    job: Job,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct StartingJob {
    job: Job,
    submitted_at: DateTime<Utc>,
}

/// Why a running process is being destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Cancelled,
    TimedOut,
}

/// A running job and its process. Exists iff the job is RUNNING.
struct RunningHandle {
    job: Job,
    process: Arc<dyn InteractiveProcess>,
    pid: Option<u32>,
    submitted_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    deadline: Option<Instant>,
    termination: Option<Termination>,
    destroy_attempts: u32,
}

#[derive(Debug)]
struct FinishedJob {
    job: Job,
    pid: Option<u32>,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: DateTime<Utc>,
    exit_code: Option<i32>,
    failure: Option<JobFailure>,
}

impl FinishedJob {
    fn never_started(job: Job, submitted_at: DateTime<Utc>, failure: JobFailure) -> Self {
        Self {
            job,
            pid: None,
            submitted_at,
            started_at: None,
            finished_at: Utc::now(),
            exit_code: None,
            failure: Some(failure),
        }
    }

    fn from_handle(handle: RunningHandle, exit_code: Option<i32>, failure: Option<JobFailure>) -> Self {
        Self {
            job: handle.job,
            pid: handle.pid,
            submitted_at: handle.submitted_at,
            started_at: Some(handle.started_at),
            finished_at: Utc::now(),
            exit_code,
            failure,
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingJob>,
    starting: Vec<StartingJob>,
    running: Vec<RunningHandle>,
    history: VecDeque<FinishedJob>,
}

impl QueueState {
    fn occupied(&self) -> usize {
        self.starting.len() + self.running.len()
    }

    fn running_index(&self, id: &JobId) -> Option<usize> {
        self.running.iter().position(|h| h.job.id() == id)
    }

    fn finish(&mut self, finished: FinishedJob) {
        self.history.push_back(finished);
    }
}

/// Jobs moved out of the FIFO by one [`Queue::advance`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    pub started: u64,
    pub failed: u64,
}

/// Transitions applied by one [`Queue::reconcile`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub completed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub abandoned: u64,
}

impl ReconcileOutcome {
    pub fn freed_slots(&self) -> bool {
        self.completed + self.cancelled + self.timed_out + self.abandoned > 0
    }
}

/// Result of [`Queue::cancel`].
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub status: JobStatus,
    /// The job was still pending and is now DONE without ever starting.
    pub removed_pending: bool,
}

/// A named pool enforcing one [`QueuePolicy`].
pub struct Queue {
    name: String,
    policy: QueuePolicy,
    state: Mutex<QueueState>,
}

impl Queue {
    pub fn new(name: impl Into<String>, policy: QueuePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job to the FIFO. Returns true if a slot is free right now,
    /// so the caller can wake the poller instead of waiting a full interval.
    pub fn submit(&self, job: Job) -> bool {
        let mut state = self.lock();
        debug!(queue = %self.name, job_id = %job.id(), "Job queued");
        state.pending.push_back(PendingJob {
            job,
            submitted_at: Utc::now(),
        });
        self.policy.free_slots(state.occupied()) >= state.pending.len()
    }

    /// Fill free slots from the head of the FIFO.
    ///
    /// Process creation runs with the lock released. A failed creation is
    /// not retried: the job goes straight to history with the failure.
    pub fn advance(&self, factory: &dyn ProcessFactory) -> AdvanceOutcome {
        let batch: Vec<Job> = {
            let mut state = self.lock();
            let free = self.policy.free_slots(state.occupied());
            let take = free.min(state.pending.len());
            let popped: Vec<PendingJob> = state.pending.drain(..take).collect();
            popped
                .into_iter()
                .map(|p| {
                    let job = p.job.clone();
                    state.starting.push(StartingJob {
                        job: p.job,
                        submitted_at: p.submitted_at,
                    });
                    job
                })
                .collect()
        };

        let mut outcome = AdvanceOutcome::default();
        for job in batch {
            let created = factory.create(&job);
            let mut state = self.lock();
            let Some(idx) = state.starting.iter().position(|s| s.job.id() == job.id()) else {
                // Cancelled or shut down while the process was being created.
                drop(state);
                if let Ok(process) = created {
                    debug!(queue = %self.name, job_id = %job.id(), "Destroying process of a job cancelled during creation");
                    if let Err(e) = process.destroy() {
                        warn!(queue = %self.name, job_id = %job.id(), error = %e, "Failed to destroy process of cancelled job");
                    }
                }
                continue;
            };
            let starting = state.starting.remove(idx);
            match created {
                Ok(process) => {
                    let process: Arc<dyn InteractiveProcess> = Arc::from(process);
                    let pid = process.pid();
                    let max_runtime = job.description().max_runtime_ms;
                    let deadline = (max_runtime > 0)
                        .then(|| Instant::now() + Duration::from_millis(max_runtime));
                    info!(queue = %self.name, job_id = %job.id(), label = job.label(), pid = ?pid, "Job started");
                    state.running.push(RunningHandle {
                        job: starting.job,
                        process,
                        pid,
                        submitted_at: starting.submitted_at,
                        started_at: Utc::now(),
                        deadline,
                        termination: None,
                        destroy_attempts: 0,
                    });
                    outcome.started += 1;
                }
                Err(e) => {
                    warn!(queue = %self.name, job_id = %job.id(), error = %e, "Failed to create process");
                    state.finish(FinishedJob::never_started(
                        starting.job,
                        starting.submitted_at,
                        JobFailure::ProcessCreation(e.to_string()),
                    ));
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Reconcile running jobs against their processes.
    ///
    /// Completed processes move to history. Processes past their deadline get
    /// a destroy request. Cancelled or timed-out processes that are still
    /// alive get another destroy request each call, until `max_destroy_attempts`
    /// is exhausted and the handle is abandoned.
    pub fn reconcile(&self, now: Instant, max_destroy_attempts: u32) -> ReconcileOutcome {
        let snapshot: Vec<(JobId, Arc<dyn InteractiveProcess>)> = {
            let state = self.lock();
            state
                .running
                .iter()
                .map(|h| (h.job.id().clone(), Arc::clone(&h.process)))
                .collect()
        };
        if snapshot.is_empty() {
            return ReconcileOutcome::default();
        }

        let finished: Vec<(JobId, Option<i32>)> = snapshot
            .iter()
            .filter(|(_, process)| process.is_done())
            .map(|(id, process)| (id.clone(), process.exit_status()))
            .collect();

        let mut outcome = ReconcileOutcome::default();
        let mut to_destroy: Vec<(JobId, Arc<dyn InteractiveProcess>)> = Vec::new();
        {
            let mut state = self.lock();
            for (id, exit_code) in finished {
                let Some(idx) = state.running_index(&id) else { continue };
                let handle = state.running.remove(idx);
                let failure = match handle.termination {
                    Some(Termination::Cancelled) => {
                        outcome.cancelled += 1;
                        Some(JobFailure::Cancelled(CANCELLED_BY_USER.to_string()))
                    }
                    Some(Termination::TimedOut) => {
                        outcome.timed_out += 1;
                        Some(JobFailure::TimedOut(handle.job.description().max_runtime_ms))
                    }
                    None => {
                        outcome.completed += 1;
                        None
                    }
                };
                info!(queue = %self.name, job_id = %id, exit_code = ?exit_code, "Job finished");
                state.finish(FinishedJob::from_handle(handle, exit_code, failure));
            }

            let mut abandoned = Vec::new();
            for (idx, handle) in state.running.iter_mut().enumerate() {
                if handle.termination.is_none() {
                    match handle.deadline {
                        Some(deadline) if now >= deadline => {
                            warn!(queue = %self.name, job_id = %handle.job.id(), "Job exceeded maximum run time");
                            handle.termination = Some(Termination::TimedOut);
                        }
                        _ => continue,
                    }
                }
                if handle.destroy_attempts >= max_destroy_attempts {
                    abandoned.push(idx);
                    continue;
                }
                handle.destroy_attempts += 1;
                to_destroy.push((handle.job.id().clone(), Arc::clone(&handle.process)));
            }

            for idx in abandoned.into_iter().rev() {
                let handle = state.running.remove(idx);
                warn!(
                    queue = %self.name,
                    job_id = %handle.job.id(),
                    attempts = handle.destroy_attempts,
                    "Process ignored destroy requests, abandoning it"
                );
                let failure = JobFailure::Unterminated(handle.destroy_attempts);
                state.finish(FinishedJob::from_handle(handle, None, Some(failure)));
                outcome.abandoned += 1;
            }
        }

        for (id, process) in to_destroy {
            if let Err(e) = process.destroy() {
                warn!(queue = %self.name, job_id = %id, error = %e, "Destroy failed, retrying next tick");
            }
        }
        outcome
    }

    /// Drop the oldest finished jobs beyond `max`. Returns how many were evicted.
    pub fn trim_history(&self, max: usize) -> usize {
        let mut state = self.lock();
        let excess = state.history.len().saturating_sub(max);
        for finished in state.history.drain(..excess) {
            debug!(queue = %self.name, job_id = %finished.job.id(), "Evicted from history");
        }
        excess
    }

    /// Cancel a job. Pending jobs finish immediately; running jobs get a
    /// destroy request confirmed by a later [`reconcile`](Self::reconcile).
    /// Finished jobs are returned unchanged. `None` if the job is unknown.
    pub fn cancel(&self, id: &JobId) -> Option<Cancellation> {
        let (destroy, removed_pending) = {
            let mut state = self.lock();
            if let Some(idx) = state.pending.iter().position(|p| p.job.id() == id) {
                if let Some(pending) = state.pending.remove(idx) {
                    info!(queue = %self.name, job_id = %id, "Pending job cancelled");
                    state.finish(FinishedJob::never_started(
                        pending.job,
                        pending.submitted_at,
                        JobFailure::Cancelled(CANCELLED_BY_USER.to_string()),
                    ));
                }
                (None, true)
            } else if let Some(idx) = state.starting.iter().position(|s| s.job.id() == id) {
                // Still reported PENDING, so it finishes now. `advance` destroys
                // the process once its creation returns.
                let starting = state.starting.remove(idx);
                info!(queue = %self.name, job_id = %id, "Job cancelled during process creation");
                state.finish(FinishedJob::never_started(
                    starting.job,
                    starting.submitted_at,
                    JobFailure::Cancelled(CANCELLED_BY_USER.to_string()),
                ));
                (None, true)
            } else if let Some(idx) = state.running_index(id) {
                let handle = &mut state.running[idx];
                if handle.termination.is_none() {
                    info!(queue = %self.name, job_id = %id, "Destroy requested for running job");
                    handle.termination = Some(Termination::Cancelled);
                    handle.destroy_attempts += 1;
                    (Some(Arc::clone(&handle.process)), false)
                } else {
                    (None, false)
                }
            } else {
                (None, false)
            }
        };

        if let Some(process) = destroy {
            if let Err(e) = process.destroy() {
                warn!(queue = %self.name, job_id = %id, error = %e, "Destroy failed, retrying next tick");
            }
        }

        self.status(id).map(|status| Cancellation {
            status,
            removed_pending,
        })
    }

    /// Fresh status snapshot, `None` if the job is unknown or evicted.
    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        let state = self.lock();
        if let Some(p) = state.pending.iter().find(|p| p.job.id() == id) {
            return Some(self.snapshot(&p.job, JobState::Pending, p.submitted_at));
        }
        if let Some(s) = state.starting.iter().find(|s| s.job.id() == id) {
            return Some(self.snapshot(&s.job, JobState::Pending, s.submitted_at));
        }
        if let Some(h) = state.running.iter().find(|h| h.job.id() == id) {
            let mut status = self.snapshot(&h.job, JobState::Running, h.submitted_at);
            status.started_at = Some(h.started_at);
            if let Some(pid) = h.pid {
                status.info.insert("pid".to_string(), pid.to_string());
            }
            return Some(status);
        }
        state.history.iter().find(|f| f.job.id() == id).map(|f| {
            let mut status = self.snapshot(&f.job, JobState::Done, f.submitted_at);
            status.started_at = f.started_at;
            status.finished_at = Some(f.finished_at);
            status.exit_code = f.exit_code;
            status.error = f.failure.clone();
            if let Some(pid) = f.pid {
                status.info.insert("pid".to_string(), pid.to_string());
            }
            status
        })
    }

    fn snapshot(&self, job: &Job, state: JobState, submitted_at: DateTime<Utc>) -> JobStatus {
        let mut info = BTreeMap::new();
        info.insert("policy".to_string(), self.policy.to_string());
        JobStatus {
            job_id: job.id().clone(),
            queue: self.name.clone(),
            state,
            exit_code: None,
            error: None,
            submitted_at: Some(submitted_at),
            started_at: None,
            finished_at: None,
            info,
        }
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.status(id).is_some()
    }

    /// Process of a running job, for handing out its streams.
    pub fn running_process(&self, id: &JobId) -> Option<Arc<dyn InteractiveProcess>> {
        let state = self.lock();
        state
            .running
            .iter()
            .find(|h| h.job.id() == id)
            .map(|h| Arc::clone(&h.process))
    }

    /// Every job still known to this queue, oldest submission state first:
    /// finished, running, starting, then pending.
    pub fn jobs(&self) -> Vec<Job> {
        let state = self.lock();
        state
            .history
            .iter()
            .map(|f| f.job.clone())
            .chain(state.running.iter().map(|h| h.job.clone()))
            .chain(state.starting.iter().map(|s| s.job.clone()))
            .chain(state.pending.iter().map(|p| p.job.clone()))
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    pub fn queue_status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            name: self.name.clone(),
            policy: Some(self.policy),
            pending: state.pending.len() + state.starting.len(),
            running: state.running.len(),
            finished: state.history.len(),
            error: None,
        }
    }

    /// Cancel everything still pending and hand back the live processes so
    /// the caller can destroy them with the lock released.
    pub fn shutdown(&self, reason: &str) -> Vec<Arc<dyn InteractiveProcess>> {
        let mut state = self.lock();
        let pending: Vec<PendingJob> = state.pending.drain(..).collect();
        for p in pending {
            state.finish(FinishedJob::never_started(
                p.job,
                p.submitted_at,
                JobFailure::Cancelled(reason.to_string()),
            ));
        }
        let starting: Vec<StartingJob> = state.starting.drain(..).collect();
        for s in starting {
            state.finish(FinishedJob::never_started(
                s.job,
                s.submitted_at,
                JobFailure::Cancelled(reason.to_string()),
            ));
        }
        let running: Vec<RunningHandle> = state.running.drain(..).collect();
        let mut processes = Vec::with_capacity(running.len());
        for handle in running {
            processes.push(Arc::clone(&handle.process));
            let failure = JobFailure::Cancelled(reason.to_string());
            state.finish(FinishedJob::from_handle(handle, None, Some(failure)));
        }
        processes
    }
}
