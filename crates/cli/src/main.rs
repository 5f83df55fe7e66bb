mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use runq_core::{Job, JobDescription, JobStatus};
use runq_engine::LocalScheduler;

use crate::cli::CliArgs;

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let code = run(args)?;
    std::process::exit(code);
}

fn run(args: CliArgs) -> Result<i32> {
    let config = config::load(args.config.as_deref()).context("failed to load configuration")?;
    let engine = LocalScheduler::new(config).context("failed to start scheduler")?;

    let description = build_description(&args);
    let job = engine
        .submit_job(description)
        .with_context(|| format!("failed to submit '{}'", args.command.join(" ")))?;
    info!(job_id = %job.id(), queue = job.queue_name(), "Submitted");

    let status = wait_for(&engine, &job, args.timeout_ms)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("failed to serialize job status")?
    );

    if args.metrics {
        let metrics = serde_json::to_string_pretty(&engine.metrics())
            .context("failed to serialize metrics")?;
        eprintln!("{}", metrics);
    }

    engine.end();
    Ok(status.exit_code.unwrap_or(1))
}

fn build_description(args: &CliArgs) -> JobDescription {
    let mut command = args.command.iter();
    let executable = command.next().cloned().unwrap_or_default();
    let mut desc = JobDescription::new(executable)
        .with_args(command.cloned())
        .with_max_runtime_ms(args.max_runtime_ms);

    if let Some(ref queue) = args.queue {
        desc = desc.with_queue(queue.clone());
    }
    if let Some(ref name) = args.name {
        desc = desc.with_name(name.clone());
    }
    if let Some(ref dir) = args.workdir {
        desc = desc.with_working_directory(dir.clone());
    }
    if let Some(ref path) = args.stdin {
        desc = desc.with_stdin(path.clone());
    }
    if let Some(ref path) = args.stdout {
        desc = desc.with_stdout(path.clone());
    }
    if let Some(ref path) = args.stderr {
        desc = desc.with_stderr(path.clone());
    }
    for (key, value) in &args.env {
        desc = desc.with_env(key.clone(), value.clone());
    }
    desc
}

/// Wait for the job to finish. On timeout, cancel it and give the poller
/// enough ticks to confirm the kill.
fn wait_for(engine: &LocalScheduler, job: &Job, timeout_ms: Option<i64>) -> Result<JobStatus> {
    let status = engine
        .wait_until_done(job, timeout_ms.unwrap_or(i64::MAX))
        .context("failed waiting for job")?;
    if status.is_done() {
        return Ok(status);
    }

    warn!(job_id = %job.id(), "Timed out waiting for job, cancelling");
    engine.cancel_job(job).context("failed to cancel job")?;
    let config = engine.config();
    let grace = config.polling_delay_ms * (u64::from(config.destroy_attempts) + 2);
    engine
        .wait_until_done(job, i64::try_from(grace).unwrap_or(i64::MAX))
        .context("failed waiting for cancelled job")
}
