//! Contract between the scheduling engine and whatever actually runs processes.
//!
//! The engine never waits on a process. It only asks [`InteractiveProcess::is_done`]
//! from its poller and issues [`InteractiveProcess::destroy`] requests.

use std::fmt;
use std::io::{self, Read, Write};

use crate::job::{Job, JobId};

/// A live process started for one job.
pub trait InteractiveProcess: Send + Sync {
    /// Non-blocking completion check.
    fn is_done(&self) -> bool;

    /// Exit code. Only meaningful once [`is_done`](Self::is_done) returned true.
    fn exit_status(&self) -> Option<i32>;

    /// Request termination. Best-effort, idempotent and non-blocking.
    fn destroy(&self) -> io::Result<()>;

    /// Stdio of an interactive process. Returns `Some` at most once.
    fn take_streams(&self) -> Option<Streams>;

    /// OS process id, when there is one.
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Creates processes for jobs.
///
/// Implementations must not block beyond spawn latency and must wire stdio
/// according to the job's description.
pub trait ProcessFactory: Send + Sync {
    fn create(&self, job: &Job) -> io::Result<Box<dyn InteractiveProcess>>;
}

/// Stdio handles of an interactive job.
pub struct Streams {
    pub job_id: JobId,
    pub stdin: Option<Box<dyn Write + Send>>,
    pub stdout: Option<Box<dyn Read + Send>>,
    pub stderr: Option<Box<dyn Read + Send>>,
}

impl fmt::Debug for Streams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streams")
            .field("job_id", &self.job_id)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}
