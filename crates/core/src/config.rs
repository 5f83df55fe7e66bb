use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

pub const SINGLE_QUEUE: &str = "single";
pub const MULTI_QUEUE: &str = "multi";
pub const UNLIMITED_QUEUE: &str = "unlimited";

/// Queue names every local engine provides, in display order.
pub const QUEUE_NAMES: [&str; 3] = [SINGLE_QUEUE, MULTI_QUEUE, UNLIMITED_QUEUE];

pub const MIN_POLLING_DELAY_MS: u64 = 100;
pub const MAX_POLLING_DELAY_MS: u64 = 60_000;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_opt(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| SchedulerError::InvalidConfig(format!("{} has invalid value {:?}", key, raw))),
        None => Ok(None),
    }
}

/// Engine configuration, typically parsed from TOML or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Poller interval in milliseconds.
    #[serde(default = "default_polling_delay")]
    pub polling_delay_ms: u64,
    /// Concurrency cap of the "multi" queue. 0 = available parallelism.
    #[serde(default)]
    pub multi_q_max_concurrent_jobs: usize,
    /// Finished jobs retained per queue.
    #[serde(default = "default_max_history")]
    pub max_history_size: usize,
    /// Destroy requests issued for a timed-out or cancelled process before it is abandoned.
    #[serde(default = "default_destroy_attempts")]
    pub destroy_attempts: u32,
    /// Queue used when a description leaves its queue name empty.
    #[serde(default = "default_queue")]
    pub default_queue: String,
    /// Base for relative working directories and redirection paths.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

fn default_polling_delay() -> u64 { 1000 }
fn default_max_history() -> usize { 500 }
fn default_destroy_attempts() -> u32 { 3 }
fn default_queue() -> String { SINGLE_QUEUE.to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polling_delay_ms: default_polling_delay(),
            multi_q_max_concurrent_jobs: 0,
            max_history_size: default_max_history(),
            destroy_attempts: default_destroy_attempts(),
            default_queue: default_queue(),
            working_directory: None,
        }
    }
}

impl EngineConfig {
    /// Build config from `RUNQ_*` environment variables (call `load_dotenv()` first).
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_parsed("RUNQ_POLLING_DELAY_MS")? {
            config.polling_delay_ms = v;
        }
        if let Some(v) = env_parsed("RUNQ_MULTI_MAX_CONCURRENT")? {
            config.multi_q_max_concurrent_jobs = v;
        }
        if let Some(v) = env_parsed("RUNQ_MAX_HISTORY")? {
            config.max_history_size = v;
        }
        if let Some(v) = env_parsed("RUNQ_DESTROY_ATTEMPTS")? {
            config.destroy_attempts = v;
        }
        if let Some(v) = env_opt("RUNQ_DEFAULT_QUEUE") {
            config.default_queue = v;
        }
        if let Some(v) = env_opt("RUNQ_WORKDIR") {
            config.working_directory = Some(PathBuf::from(v));
        }
        Ok(config)
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading engine config");
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            SchedulerError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_POLLING_DELAY_MS..=MAX_POLLING_DELAY_MS).contains(&self.polling_delay_ms) {
            return Err(SchedulerError::InvalidConfig(format!(
                "polling delay must be between {} and {} ms, got {}",
                MIN_POLLING_DELAY_MS, MAX_POLLING_DELAY_MS, self.polling_delay_ms
            )));
        }
        if self.max_history_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max history size must be at least 1".to_string(),
            ));
        }
        if self.destroy_attempts == 0 {
            return Err(SchedulerError::InvalidConfig(
                "destroy attempts must be at least 1".to_string(),
            ));
        }
        if !QUEUE_NAMES.contains(&self.default_queue.as_str()) {
            return Err(SchedulerError::InvalidConfig(format!(
                "default queue {:?} is not one of {:?}",
                self.default_queue, QUEUE_NAMES
            )));
        }
        Ok(())
    }

    /// Resolve the "multi" cap (0 means use available parallelism).
    pub fn resolved_multi_concurrency(&self) -> usize {
        if self.multi_q_max_concurrent_jobs == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.multi_q_max_concurrent_jobs
        }
    }

    pub fn polling_delay(&self) -> Duration {
        Duration::from_millis(self.polling_delay_ms)
    }

    /// Working directory for relative paths, falling back to the process cwd.
    pub fn resolved_working_directory(&self) -> PathBuf {
        self.working_directory
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            polling_delay_ms = self.polling_delay_ms,
            multi_concurrency = self.resolved_multi_concurrency(),
            max_history = self.max_history_size,
            destroy_attempts = self.destroy_attempts,
            default_queue = %self.default_queue,
            "Engine config loaded"
        );
    }
}
