//! Local process creation backed by `std::process`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use runq_core::{InteractiveProcess, Job, ProcessFactory, Streams};

/// Spawns jobs as child processes of the current process.
#[derive(Debug, Clone)]
pub struct LocalProcessFactory {
    base_dir: PathBuf,
}

impl LocalProcessFactory {
    /// Relative working directories resolve against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(base: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

impl ProcessFactory for LocalProcessFactory {
    fn create(&self, job: &Job) -> io::Result<Box<dyn InteractiveProcess>> {
        let desc = job.description();
        let workdir = match &desc.working_directory {
            Some(dir) => Self::resolve(&self.base_dir, dir),
            None => self.base_dir.clone(),
        };

        let mut command = Command::new(&desc.executable);
        command
            .args(&desc.arguments)
            .current_dir(&workdir)
            .envs(&desc.environment);

        if desc.interactive {
            command
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        } else {
            // Redirection targets are relative to the job's working directory.
            let stdin = match &desc.stdin {
                Some(path) => Stdio::from(File::open(Self::resolve(&workdir, path))?),
                None => Stdio::null(),
            };
            let stdout = match &desc.stdout {
                Some(path) => Stdio::from(File::create(Self::resolve(&workdir, path))?),
                None => Stdio::null(),
            };
            let stderr = match &desc.stderr {
                Some(path) => Stdio::from(File::create(Self::resolve(&workdir, path))?),
                None => Stdio::null(),
            };
            command.stdin(stdin).stdout(stdout).stderr(stderr);
        }

        let mut child = command.spawn()?;
        debug!(
            job_id = %job.id(),
            executable = %desc.executable,
            workdir = %workdir.display(),
            pid = child.id(),
            "Spawned process"
        );

        let streams = desc.interactive.then(|| Streams {
            job_id: job.id().clone(),
            stdin: child
                .stdin
                .take()
                .map(|s| Box::new(s) as Box<dyn Write + Send>),
            stdout: child
                .stdout
                .take()
                .map(|s| Box::new(s) as Box<dyn Read + Send>),
            stderr: child
                .stderr
                .take()
                .map(|s| Box::new(s) as Box<dyn Read + Send>),
        });

        Ok(Box::new(LocalProcess {
            pid: child.id(),
            child: Mutex::new(ChildState { child, exit: None }),
            streams: Mutex::new(streams),
        }))
    }
}

struct ChildState {
    child: Child,
    exit: Option<i32>,
}

/// A child process polled with `try_wait`.
pub struct LocalProcess {
    pid: u32,
    child: Mutex<ChildState>,
    streams: Mutex<Option<Streams>>,
}

impl LocalProcess {
    fn lock(&self) -> MutexGuard<'_, ChildState> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exit code of a finished process; signal deaths map to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

impl InteractiveProcess for LocalProcess {
    fn is_done(&self) -> bool {
        let mut state = self.lock();
        if state.exit.is_some() {
            return true;
        }
        match state.child.try_wait() {
            Ok(Some(status)) => {
                state.exit = Some(exit_code(status));
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "Failed to poll process");
                false
            }
        }
    }

    fn exit_status(&self) -> Option<i32> {
        self.lock().exit
    }

    fn destroy(&self) -> io::Result<()> {
        let mut state = self.lock();
        if state.exit.is_some() {
            return Ok(());
        }
        match state.child.kill() {
            Ok(()) => Ok(()),
            // Already exited but not yet reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn take_streams(&self) -> Option<Streams> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }
}
