//! Runners: the executing handle of one job.
//!
//! - `external`: an OS process launched through `sh -c`
//! - `internal`: a function call on a worker thread or a worker backend

mod external;
mod internal;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use simrun_core::Metadata;

use crate::error::SchedulerError;

pub use external::ExternalRunner;
pub use internal::InternalRunner;

/// Identifier used when a job has no usable name.
pub const DEFAULT_IDENTIFIER: &str = "generalOut";

/// Which runner variant executed a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunnerKind {
    External,
    Internal,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => write!(f, "external"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// What a runner hands back through [`Runner::return_evaluation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// External runs leave their results in files.
    NotApplicable,
    /// The run has not finished yet.
    Pending,
    /// The run finished without a usable result.
    Failed,
    /// The first input argument paired with the function's result.
    Output { input: Value, output: Value },
}

/// Uniform lifecycle of a job, whatever executes it.
///
/// All methods are non-blocking. `return_code` and `return_evaluation` are
/// meaningful once `is_done` has returned `true`.
pub trait Runner: Send {
    fn identifier(&self) -> &str;

    /// Scheduler sequence number assigned at start. Never reused.
    fn job_id(&self) -> u64;

    fn kind(&self) -> RunnerKind;

    /// Shell line for external runs, `"internal"` otherwise.
    fn command(&self) -> &str;

    /// Begin execution. A failure leaves the runner done with return code -1.
    fn start(&mut self) -> Result<(), SchedulerError>;

    fn is_done(&mut self) -> bool;

    /// Exit status, computed once and memoized. -1 while still running.
    fn return_code(&mut self) -> i32;

    fn return_evaluation(&mut self) -> Evaluation;

    fn metadata(&self) -> &Metadata;

    fn working_dir(&self) -> Option<&Path>;

    /// File receiving the process output, for external runs.
    fn output_filename(&self) -> Option<PathBuf>;

    /// Wall time from start until completion was first observed (or now).
    fn runtime(&self) -> Option<Duration>;

    /// Best-effort termination. Callers must not kill a finished runner.
    fn kill(&mut self);
}

impl fmt::Debug for dyn Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("identifier", &self.identifier())
            .field("job_id", &self.job_id())
            .field("kind", &self.kind())
            .field("command", &self.command())
            .finish()
    }
}

/// Text between the first and second `~`, if the label has one.
fn tilde_identifier(label: &str) -> Option<&str> {
    label.split('~').nth(1)
}

/// Identifier for an internal job from its explicit label.
pub(crate) fn internal_identifier(label: Option<&str>) -> String {
    match label {
        Some(label) => tilde_identifier(label).unwrap_or(label).to_string(),
        None => DEFAULT_IDENTIFIER.to_string(),
    }
}

/// Identifier for an external job: the `~` suffix of the output target, or
/// the name of the directory holding it.
pub(crate) fn external_identifier(output: &Path) -> String {
    let text = output.to_string_lossy();
    if let Some(id) = tilde_identifier(&text) {
        return id.to_string();
    }
    let parts: Vec<String> = output
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2].clone()
    } else {
        DEFAULT_IDENTIFIER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_identifier_rules() {
        assert_eq!(internal_identifier(Some("sample~12")), "12");
        assert_eq!(internal_identifier(Some("a~b~c")), "b");
        assert_eq!(internal_identifier(Some("plain")), "plain");
        assert_eq!(internal_identifier(None), DEFAULT_IDENTIFIER);
    }

    #[test]
    fn external_identifier_rules() {
        assert_eq!(external_identifier(Path::new("/runs/out~42")), "42");
        assert_eq!(external_identifier(Path::new("/runs/7/out.txt")), "7");
        assert_eq!(external_identifier(Path::new("sample3/out")), "sample3");
        assert_eq!(external_identifier(Path::new("out.txt")), DEFAULT_IDENTIFIER);
        assert_eq!(external_identifier(Path::new("./out.txt")), DEFAULT_IDENTIFIER);
    }
}
