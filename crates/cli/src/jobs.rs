use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use simrun_core::Metadata;
use simrun_scheduler::{CommandPrefixes, ExternalJob};

/// Contents of a jobs file.
#[derive(Debug, Deserialize)]
pub struct JobsFile {
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobEntry>,
}

/// One `[[job]]` table.
#[derive(Debug, Deserialize)]
pub struct JobEntry {
    /// `[mode, command]` pairs, run in order.
    pub segments: Vec<(String, String)>,
    pub output: Option<PathBuf>,
    /// Relative paths resolve against the configured base working directory.
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl JobsFile {
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: Self = toml::from_str(text).context("invalid jobs file")?;
        for (i, job) in file.jobs.iter().enumerate() {
            if job.segments.is_empty() {
                bail!("job #{} has no command segments", i + 1);
            }
        }
        Ok(file)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read jobs file {}", path.display()))?;
        Self::from_toml(&text)
    }
}

impl JobEntry {
    /// Compose the job's command and resolve its working directory.
    pub fn to_external(&self, prefixes: &CommandPrefixes, base_dir: &Path) -> Result<ExternalJob> {
        let command = prefixes.compose(&self.segments)?;
        let working_dir = match &self.working_dir {
            Some(dir) => base_dir.join(dir),
            None => base_dir.to_path_buf(),
        };
        let mut job = ExternalJob::new(command, working_dir).with_metadata(&self.metadata);
        if let Some(output) = &self.output {
            job = job.with_output(output);
        }
        for (key, value) in &self.env {
            job = job.with_env(key.clone(), value.clone());
        }
        Ok(job)
    }
}
