use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::helpers::{env_bool, env_opt, env_parse};
use super::types::{ParallelConfig, RunConfig};

impl RunConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path`, or from an empty document when there is none.
    ///
    /// Both cases apply the `SIMRUN_*` overrides and validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_toml(""),
        }
    }

    /// Config with `batch_size` slots and defaults everywhere else.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `SIMRUN_KEY` overrides `key`.
    /// - `SIMRUN_BATCH_SIZE` -> `batch_size`
    /// - `SIMRUN_NUM_MPI` -> `num_mpi`
    /// - `SIMRUN_NUM_THREADS` -> `num_threads`
    /// - `SIMRUN_PARALLEL_COMMAND` -> `parallel_command`
    /// - `SIMRUN_WORKING_DIR` -> `working_dir`
    /// - `SIMRUN_INTERNAL_PARALLEL` -> `parallel.internal_parallel`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("SIMRUN_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_parse("SIMRUN_NUM_MPI") {
            self.num_mpi = v;
        }
        if let Some(v) = env_parse("SIMRUN_NUM_THREADS") {
            self.num_threads = v;
        }
        if let Some(v) = env_opt("SIMRUN_PARALLEL_COMMAND") {
            self.parallel_command = v;
        }
        if let Some(v) = env_opt("SIMRUN_WORKING_DIR") {
            self.working_dir = PathBuf::from(v);
        }
        if let Some(v) = env_bool("SIMRUN_INTERNAL_PARALLEL") {
            self.parallel.internal_parallel = v;
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Run config loaded:");
        tracing::info!("  slots:       batch_size={}", self.batch_size);
        tracing::info!(
            "  parallel:    num_mpi={}, command='{}', num_threads={}, threading='{}'",
            self.num_mpi,
            self.parallel_command,
            self.num_threads,
            self.threading_command
        );
        tracing::info!("  paths:       working_dir={}", self.working_dir.display());
        tracing::info!(
            "  cleanup:     delete_logs={}, extensions={:?}",
            self.delete_successful_logs,
            self.delete_out_extensions
        );
        tracing::info!(
            "  internal:    parallel={}, nodes={}, cores={}",
            self.parallel.internal_parallel,
            self.parallel.nodes.len(),
            self.parallel.total_cores
        );
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_mpi: 1,
            parallel_command: String::new(),
            num_threads: 1,
            threading_command: String::new(),
            precommand: String::new(),
            postcommand: String::new(),
            script_dir: PathBuf::from("."),
            framework_dir: PathBuf::from("."),
            working_dir: PathBuf::from("."),
            delete_successful_logs: false,
            delete_out_extensions: Vec::new(),
            parallel: ParallelConfig::default(),
        }
    }
}
