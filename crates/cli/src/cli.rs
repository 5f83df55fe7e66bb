use std::path::PathBuf;

use clap::Parser;

/// Run a command on a local runq queue.
///
/// Submits one job, waits for it to finish, prints its final status as JSON
/// and exits with the job's exit code.
#[derive(Parser, Debug)]
#[command(name = "runq", about = "Run a command on a local job queue")]
pub struct CliArgs {
    /// Path to a TOML engine config (default: ~/.config/runq/config.toml, then RUNQ_* env vars)
    #[arg(long, env = "RUNQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Queue to submit to: single, multi or unlimited (default from config)
    #[arg(long, short)]
    pub queue: Option<String>,

    /// Human-readable job name
    #[arg(long)]
    pub name: Option<String>,

    /// Kill the job after this many milliseconds (0 = no limit)
    #[arg(long, default_value = "0")]
    pub max_runtime_ms: u64,

    /// Working directory for the job
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// File to feed to the job's stdin
    #[arg(long)]
    pub stdin: Option<PathBuf>,

    /// File to write the job's stdout to
    #[arg(long)]
    pub stdout: Option<PathBuf>,

    /// File to write the job's stderr to
    #[arg(long)]
    pub stderr: Option<PathBuf>,

    /// Extra environment variable for the job, as KEY=VALUE (repeatable)
    #[arg(long = "env", short = 'e', value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Stop waiting after this many milliseconds and cancel the job
    #[arg(long)]
    pub timeout_ms: Option<i64>,

    /// Print engine metrics to stderr before exiting
    #[arg(long)]
    pub metrics: bool,

    /// Executable followed by its arguments
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
