use std::path::PathBuf;

use clap::Parser;

/// Batch runner for simulation jobs.
///
/// Runs every job listed in the jobs file, keeping at most `batch_size`
/// of them active, and reports the ones that failed.
#[derive(Parser, Debug)]
#[command(name = "simrun", about = "Run batches of simulation jobs")]
pub struct CliArgs {
    /// Run configuration (TOML). Defaults apply when omitted.
    #[arg(long, env = "SIMRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Jobs file (TOML) with one `[[job]]` table per job
    #[arg(long)]
    pub jobs: PathBuf,

    /// Milliseconds between completion polls
    #[arg(long, default_value = "100")]
    pub poll_ms: u64,

    /// Override the number of concurrent slots
    #[arg(long)]
    pub batch_size: Option<usize>,
}
