use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use simrun_core::Metadata;

use crate::validator::ResultValidator;

/// Result of one internal function call: a value, or an error message.
pub type TaskOutcome = Result<Value, String>;

/// Function executed by an internal job. Called with the job's arguments.
pub type JobFunction = Arc<dyn Fn(&[Value]) -> TaskOutcome + Send + Sync>;

/// Wrap a closure as a [`JobFunction`].
pub fn job_function<F>(function: F) -> JobFunction
where
    F: Fn(&[Value]) -> TaskOutcome + Send + Sync + 'static,
{
    Arc::new(function)
}

/// A queued unit of work, waiting for a free slot.
#[derive(Clone)]
pub enum JobSpec {
    External(ExternalJob),
    Internal(InternalJob),
}

impl JobSpec {
    /// Label used in logs before a runner (and its identifier) exists.
    pub fn label(&self) -> &str {
        match self {
            Self::External(job) => &job.command,
            Self::Internal(job) => job.identifier.as_deref().unwrap_or("internal"),
        }
    }
}

/// An OS process to launch through `sh -c`.
#[derive(Clone)]
pub struct ExternalJob {
    /// Composed shell line; `%TOKEN%`s are substituted when the job starts.
    pub command: String,
    /// Output target. Relative paths resolve against `working_dir`.
    pub output: Option<PathBuf>,
    pub working_dir: PathBuf,
    pub metadata: Metadata,
    /// Extra variables merged over the inherited environment.
    pub env: BTreeMap<String, String>,
    pub validator: Option<Arc<dyn ResultValidator>>,
}

impl ExternalJob {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            output: None,
            working_dir: working_dir.into(),
            metadata: Metadata::new(),
            env: BTreeMap::new(),
            validator: None,
        }
    }

    pub fn with_output(mut self, output: impl AsRef<Path>) -> Self {
        self.output = Some(output.as_ref().to_path_buf());
        self
    }

    /// Attach a copy of `metadata`.
    pub fn with_metadata(mut self, metadata: &Metadata) -> Self {
        self.metadata = metadata.clone();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn ResultValidator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

impl fmt::Debug for ExternalJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalJob")
            .field("command", &self.command)
            .field("output", &self.output)
            .field("working_dir", &self.working_dir)
            .field("metadata", &self.metadata)
            .field("env", &self.env)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// A function call executed on a worker thread or a worker backend.
#[derive(Clone)]
pub struct InternalJob {
    /// Positional arguments. The first one is echoed back with the result.
    pub args: Vec<Value>,
    pub function: JobFunction,
    pub identifier: Option<String>,
    pub metadata: Metadata,
    /// Modules or libraries a remote backend must load before running the function.
    pub dependencies: Vec<String>,
    /// Use a local thread even when a worker backend is configured.
    pub force_local_threads: bool,
}

impl InternalJob {
    pub fn new<F>(args: Vec<Value>, function: F) -> Self
    where
        F: Fn(&[Value]) -> TaskOutcome + Send + Sync + 'static,
    {
        Self {
            args,
            function: job_function(function),
            identifier: None,
            metadata: Metadata::new(),
            dependencies: Vec::new(),
            force_local_threads: false,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Attach a copy of `metadata`.
    pub fn with_metadata(mut self, metadata: &Metadata) -> Self {
        self.metadata = metadata.clone();
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[String]) -> Self {
        self.dependencies = dependencies.to_vec();
        self
    }

    pub fn force_local_threads(mut self, force: bool) -> Self {
        self.force_local_threads = force;
        self
    }
}

impl fmt::Debug for InternalJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalJob")
            .field("args", &self.args)
            .field("identifier", &self.identifier)
            .field("metadata", &self.metadata)
            .field("dependencies", &self.dependencies)
            .field("force_local_threads", &self.force_local_threads)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn label_names_queued_job() {
        let external = JobSpec::External(ExternalJob::new("echo hi", "."));
        assert_eq!(external.label(), "echo hi");

        let unnamed = JobSpec::Internal(InternalJob::new(vec![], |_: &[Value]| Ok(json!(null))));
        assert_eq!(unnamed.label(), "internal");

        let named = JobSpec::Internal(
            InternalJob::new(vec![], |_: &[Value]| Ok(json!(null))).with_identifier("cell~7~a"),
        );
        assert_eq!(named.label(), "cell~7~a");
    }
}
