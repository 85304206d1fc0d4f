mod cli;
mod jobs;

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use simrun_core::RunConfig;
use simrun_scheduler::{CommandPrefixes, JobHandler};

use crate::cli::CliArgs;
use crate::jobs::JobsFile;

fn main() -> Result<ExitCode> {
    simrun_core::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = RunConfig::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("failed to load config {}", path.display()),
        None => "invalid configuration from environment".to_string(),
    })?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.log_summary();

    let jobs = JobsFile::from_file(&args.jobs)?;
    let prefixes = CommandPrefixes::from_config(&config);
    let base_dir = config.working_dir.clone();
    let mut handler = JobHandler::new(config).context("invalid run configuration")?;

    for (i, entry) in jobs.jobs.iter().enumerate() {
        let job = entry
            .to_external(&prefixes, &base_dir)
            .with_context(|| format!("job #{}", i + 1))?;
        handler.add_external_job(job);
    }
    info!(submitted = handler.num_submitted(), "all jobs submitted");

    let poll = Duration::from_millis(args.poll_ms.max(1));
    let mut collected = 0usize;
    loop {
        for runner in handler.get_finished(None) {
            collected += 1;
            info!(
                job = runner.identifier(),
                job_id = runner.job_id(),
                runtime_ms = runner.runtime().map(|d| d.as_millis() as u64),
                collected,
                "job collected"
            );
        }
        if handler.is_finished() && handler.num_running() == 0 {
            break;
        }
        thread::sleep(poll);
    }

    let metrics = handler.metrics();
    info!(
        collected,
        failed = handler.number_of_failures(),
        avg_runtime_ms = metrics.avg_runtime.as_millis() as u64,
        "run complete"
    );

    if handler.number_of_failures() == 0 {
        return Ok(ExitCode::SUCCESS);
    }
    warn!(failed = handler.number_of_failures(), "some jobs failed");
    let report = serde_json::to_string_pretty(handler.failed_jobs())
        .context("failed to serialize failure report")?;
    println!("{report}");
    Ok(ExitCode::FAILURE)
}
