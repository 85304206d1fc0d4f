use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the job handler and its runners.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(
        "for execution command <{command}> the run type was neither \"serial\" nor \"parallel\", got \"{mode}\""
    )]
    InvalidExecutionMode { mode: String, command: String },

    #[error("internal job arguments must be an ordered sequence, got {0}")]
    InvalidArguments(String),

    #[error("worker backend bootstrap failed: {0}")]
    BackendBootstrap(String),

    #[error("failed to start job {identifier}: {source}")]
    Spawn {
        identifier: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to submit job {identifier}: {source}")]
    Submit {
        identifier: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Config(#[from] simrun_core::ConfigError),
}
