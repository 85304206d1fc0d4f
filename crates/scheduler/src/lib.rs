//! Batch job scheduler for simulation runs.
//!
//! A [`JobHandler`] keeps at most `batch_size` jobs active. External jobs are
//! shell commands run as child processes with their output captured to a
//! file; internal jobs are function calls run on a worker thread or on a
//! [`WorkerBackend`]. Completion is polled, never awaited.

pub mod backend;
pub mod command;
pub mod error;
pub mod handler;
pub mod job;
pub mod ledger;
pub mod metrics;
pub mod runner;
pub mod validator;

pub use backend::{
    BackendError, BackendLauncher, BackendStats, LocalPoolBackend, LocalPoolLauncher, Task,
    TaskHandle, WorkerBackend,
};
pub use command::{CommandPrefixes, ExecutionMode, TemplateContext};
pub use error::SchedulerError;
pub use handler::JobHandler;
pub use job::{job_function, ExternalJob, InternalJob, JobFunction, JobSpec, TaskOutcome};
pub use ledger::{FailureLedger, FailureRecord};
pub use metrics::{JobMetrics, KindCounts};
pub use runner::{Evaluation, ExternalRunner, InternalRunner, Runner, RunnerKind};
pub use validator::ResultValidator;
