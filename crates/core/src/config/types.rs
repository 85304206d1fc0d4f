use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Run settings consumed by the job handler.
///
/// Parsed from a `run.toml` file with support for environment variable
/// overrides. Every field has a default so an empty document is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of jobs allowed to run at once (the slot count).
    #[serde(default = "default_one_usize")]
    pub batch_size: usize,

    /// MPI ranks requested for every parallel command segment.
    #[serde(default = "default_one_u32")]
    pub num_mpi: u32,

    /// MPI launcher prefix, e.g. `mpiexec -n`. The rank count is appended.
    #[serde(default)]
    pub parallel_command: String,

    /// Threads requested per job. Also substituted for `%NUM_CPUS%`.
    #[serde(default = "default_one_u32")]
    pub num_threads: u32,

    /// Threading flag prefix, e.g. `--n-threads=`. The thread count is appended.
    #[serde(default)]
    pub threading_command: String,

    /// Text placed in front of every parallel segment.
    #[serde(default)]
    pub precommand: String,

    /// Text placed after every parallel segment.
    #[serde(default)]
    pub postcommand: String,

    /// Substituted for `%SCRIPT_DIR%`.
    #[serde(default = "default_dir")]
    pub script_dir: PathBuf,

    /// Substituted for `%FRAMEWORK_DIR%`.
    #[serde(default = "default_dir")]
    pub framework_dir: PathBuf,

    /// Base working directory, substituted for `%BASE_WORKING_DIR%`.
    #[serde(default = "default_dir")]
    pub working_dir: PathBuf,

    /// Remove a job's output file when it finishes with exit code 0.
    #[serde(default)]
    pub delete_successful_logs: bool,

    /// File extensions removed from a successful job's working directory.
    #[serde(default)]
    pub delete_out_extensions: Vec<String>,

    /// Worker backend settings for internal jobs.
    #[serde(default)]
    pub parallel: ParallelConfig,
}

fn default_one_usize() -> usize {
    1
}

fn default_one_u32() -> u32 {
    1
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

// ── Section configs ─────────────────────────────────────────────────

/// Internal-job parallelism: local threads or a worker backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Run internal jobs on a worker backend instead of plain threads.
    #[serde(default)]
    pub internal_parallel: bool,

    /// Host names, one entry per available core. Repeated names mean
    /// several cores on the same host.
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Worker count when no node list is given.
    #[serde(default = "default_one_usize")]
    pub total_cores: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            internal_parallel: false,
            nodes: Vec::new(),
            total_cores: default_one_usize(),
        }
    }
}

impl ParallelConfig {
    /// Distinct host names in first-seen order.
    pub fn unique_nodes(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for node in &self.nodes {
            let node = node.trim();
            if !seen.contains(&node) {
                seen.push(node);
            }
        }
        seen
    }
}
