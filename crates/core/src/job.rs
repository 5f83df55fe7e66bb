use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Opaque job identifier, unique for the lifetime of the engine that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(prefix: &str, sequence: u64) -> Self {
        Self(format!("{}-{}", prefix, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to run one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Optional human-readable name, used for logging only.
    #[serde(default)]
    pub name: Option<String>,
    pub executable: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Relative paths resolve against the engine's working directory.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub stdin: Option<PathBuf>,
    #[serde(default)]
    pub stdout: Option<PathBuf>,
    #[serde(default)]
    pub stderr: Option<PathBuf>,
    /// Target queue; empty selects the engine's default queue.
    #[serde(default)]
    pub queue_name: String,
    /// Soft limit on run time in milliseconds. 0 = unlimited.
    #[serde(default)]
    pub max_runtime_ms: u64,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default = "default_count")]
    pub node_count: u32,
    #[serde(default = "default_count")]
    pub processes_per_node: u32,
    #[serde(default)]
    pub scheduler_arguments: Vec<String>,
}

fn default_count() -> u32 { 1 }

impl Default for JobDescription {
    fn default() -> Self {
        Self {
            name: None,
            executable: String::new(),
            arguments: Vec::new(),
            working_directory: None,
            environment: BTreeMap::new(),
            stdin: None,
            stdout: None,
            stderr: None,
            queue_name: String::new(),
            max_runtime_ms: 0,
            interactive: false,
            node_count: default_count(),
            processes_per_node: default_count(),
            scheduler_arguments: Vec::new(),
        }
    }
}

impl JobDescription {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue_name = queue.into();
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn with_stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn with_stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    pub fn with_max_runtime_ms(mut self, ms: u64) -> Self {
        self.max_runtime_ms = ms;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Check the description against what a local engine can run.
    ///
    /// Queue names are resolved by the engine, not here.
    pub fn validate(&self) -> Result<()> {
        if self.executable.trim().is_empty() {
            return Err(SchedulerError::IncompleteJobDescription(
                "executable missing".to_string(),
            ));
        }
        if self.node_count != 1 {
            return Err(SchedulerError::InvalidJobDescription(format!(
                "unsupported node count: {}",
                self.node_count
            )));
        }
        if self.processes_per_node != 1 {
            return Err(SchedulerError::InvalidJobDescription(format!(
                "unsupported processes per node: {}",
                self.processes_per_node
            )));
        }
        if !self.scheduler_arguments.is_empty() {
            return Err(SchedulerError::InvalidJobDescription(
                "scheduler arguments are not supported by the local scheduler".to_string(),
            ));
        }
        if self.interactive
            && (self.stdin.is_some() || self.stdout.is_some() || self.stderr.is_some())
        {
            return Err(SchedulerError::InvalidJobDescription(
                "interactive jobs cannot redirect stdin, stdout or stderr".to_string(),
            ));
        }
        for key in self.environment.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(SchedulerError::InvalidJobDescription(format!(
                    "invalid environment variable name: {:?}",
                    key
                )));
            }
        }
        Ok(())
    }
}

/// A submitted job. Cheap to clone; never mutated after submission.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    description: Arc<JobDescription>,
    queue: String,
}

impl Job {
    pub fn new(id: JobId, description: JobDescription, queue: impl Into<String>) -> Self {
        Self {
            id,
            description: Arc::new(description),
            queue: queue.into(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn description(&self) -> &JobDescription {
        &self.description
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn is_interactive(&self) -> bool {
        self.description.interactive
    }

    /// Name for log lines: the description's name, else the executable.
    pub fn label(&self) -> &str {
        self.description
            .name
            .as_deref()
            .unwrap_or(&self.description.executable)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}
