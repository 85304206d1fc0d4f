//! Worker backends for internal jobs.
//!
//! A backend accepts a [`Task`] and hands back a [`TaskHandle`] the runner
//! polls without blocking. The default backend is a local `rayon` pool;
//! remote backends plug in through [`BackendLauncher`].

mod launcher;
mod local;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::job::{JobFunction, TaskOutcome};

pub use launcher::{BackendLauncher, BackendSlot, LocalPoolLauncher};
pub use local::LocalPoolBackend;

/// Errors raised by a worker backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("task rejected: {0}")]
    Rejected(String),
}

/// One function call submitted to a backend.
#[derive(Clone)]
pub struct Task {
    pub identifier: String,
    pub function: JobFunction,
    pub args: Vec<Value>,
    pub dependencies: Vec<String>,
}

/// Submission and progress counters of a backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStats {
    pub workers: usize,
    pub submitted: u64,
    pub completed: u64,
    pub cancelled: u64,
}

/// A submit/poll/result service running internal jobs.
pub trait WorkerBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Queue a task. Never waits for it to run.
    fn submit(&self, task: Task) -> Result<Box<dyn TaskHandle>, BackendError>;

    fn stats(&self) -> BackendStats;
}

/// Handle to a submitted task.
pub trait TaskHandle: Send {
    /// Non-blocking completion check. Cancelled tasks count as finished.
    fn is_finished(&self) -> bool;

    /// Take the outcome if one was produced. Returns `None` when the task is
    /// still running, was cancelled, or the outcome was already taken.
    fn take_result(&mut self) -> Option<TaskOutcome>;

    /// Best-effort cancellation.
    fn cancel(&mut self);
}

/// Run a job function, turning a panic into an error outcome.
pub(crate) fn run_guarded(function: &JobFunction, args: &[Value]) -> TaskOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| function(args))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job_function;

    #[test]
    fn run_guarded_passes_through_outcomes() {
        let f = job_function(|args| Ok(Value::from(args.len())));
        assert_eq!(run_guarded(&f, &[Value::Null, Value::Null]), Ok(Value::from(2)));

        let f = job_function(|_| Err("bad input".to_string()));
        assert_eq!(run_guarded(&f, &[]), Err("bad input".to_string()));
    }

    #[test]
    fn run_guarded_catches_panics() {
        let f = job_function(|_| panic!("division by zero"));
        let outcome = run_guarded(&f, &[]);
        assert_eq!(outcome, Err("panicked: division by zero".to_string()));
    }
}
