use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use simrun_core::{Metadata, RunConfig};
use tracing::{debug, info};

use crate::backend::{BackendLauncher, BackendSlot, LocalPoolLauncher};
use crate::command::CommandPrefixes;
use crate::error::SchedulerError;
use crate::job::{ExternalJob, InternalJob, JobSpec, TaskOutcome};
use crate::ledger::FailureLedger;
use crate::metrics::JobMetrics;
use crate::runner::{Runner, RunnerKind};
use crate::validator::ResultValidator;

/// Runs submitted jobs with at most `batch_size` of them active at once.
///
/// The handler is driven from a single control loop: submit jobs, then call
/// [`get_finished`](Self::get_finished) periodically until
/// [`is_finished`](Self::is_finished) reports `true`. No call blocks on a job.
pub struct JobHandler {
    pub(super) config: RunConfig,
    pub(super) prefixes: CommandPrefixes,
    /// Fixed-size slot array. `None` is a free slot.
    pub(super) slots: Vec<Option<Box<dyn Runner>>>,
    /// Jobs waiting for a free slot, oldest first.
    pub(super) queue: VecDeque<JobSpec>,
    pub(super) backend: BackendSlot,
    /// Sequence number handed to the next started runner.
    pub(super) next_id: u64,
    pub(super) num_submitted: usize,
    pub(super) num_failed: usize,
    pub(super) failed_jobs: FailureLedger,
    pub(super) metrics: JobMetrics,
}

impl JobHandler {
    /// Create a handler from a validated run configuration.
    ///
    /// The worker backend is not launched until the first internal job.
    pub fn new(config: RunConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let prefixes = CommandPrefixes::from_config(&config);
        info!(
            batch_size = config.batch_size,
            mpi_command = %prefixes.mpi_command,
            threading_command = %prefixes.threading_command,
            "job handler initialized"
        );
        Ok(Self {
            slots: (0..config.batch_size).map(|_| None).collect(),
            queue: VecDeque::new(),
            backend: BackendSlot::new(Box::new(LocalPoolLauncher)),
            prefixes,
            config,
            next_id: 0,
            num_submitted: 0,
            num_failed: 0,
            failed_jobs: FailureLedger::new(),
            metrics: JobMetrics::default(),
        })
    }

    /// Use a different worker backend launcher. Has no effect once an
    /// internal job has been submitted.
    pub fn with_launcher(mut self, launcher: Box<dyn BackendLauncher>) -> Self {
        self.backend.set_launcher(launcher);
        self
    }

    /// Queue an external job built from `(mode, command)` segments.
    ///
    /// Fails without queueing anything when a segment's mode is neither
    /// `serial` nor `parallel`.
    pub fn add_external<M, C>(
        &mut self,
        segments: &[(M, C)],
        output: Option<&Path>,
        working_dir: &Path,
        metadata: &Metadata,
        validator: Option<Arc<dyn ResultValidator>>,
    ) -> Result<(), SchedulerError>
    where
        M: AsRef<str>,
        C: AsRef<str>,
    {
        let command = self.prefixes.compose(segments)?;
        let mut job = ExternalJob::new(command, working_dir).with_metadata(metadata);
        if let Some(output) = output {
            job = job.with_output(output);
        }
        if let Some(validator) = validator {
            job = job.with_validator(validator);
        }
        self.add_external_job(job);
        Ok(())
    }

    /// Queue a fully built external job.
    pub fn add_external_job(&mut self, job: ExternalJob) {
        info!(command = %job.command, "execution command submitted");
        self.enqueue(JobSpec::External(job), RunnerKind::External);
    }

    /// Queue a function call.
    ///
    /// `args` must be a JSON array; its elements become the positional
    /// arguments. The first internal submission launches the worker backend.
    pub fn add_internal<F>(
        &mut self,
        args: Value,
        function: F,
        identifier: &str,
        metadata: &Metadata,
        dependencies: &[String],
        force_local_threads: bool,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(&[Value]) -> TaskOutcome + Send + Sync + 'static,
    {
        let args = match args {
            Value::Array(args) => args,
            other => return Err(SchedulerError::InvalidArguments(other.to_string())),
        };
        let job = InternalJob::new(args, function)
            .with_identifier(identifier)
            .with_metadata(metadata)
            .with_dependencies(dependencies)
            .force_local_threads(force_local_threads);
        self.add_internal_job(job)
    }

    /// Queue a fully built internal job.
    pub fn add_internal_job(&mut self, job: InternalJob) -> Result<(), SchedulerError> {
        self.backend
            .get_or_launch(&self.config.parallel)
            .map_err(SchedulerError::BackendBootstrap)?;
        debug!(job = job.identifier.as_deref().unwrap_or("internal"), "internal job submitted");
        self.enqueue(JobSpec::Internal(job), RunnerKind::Internal);
        Ok(())
    }

    fn enqueue(&mut self, job: JobSpec, kind: RunnerKind) {
        self.queue.push_back(job);
        self.num_submitted += 1;
        self.metrics.record_submit(kind);
        self.add_runs();
    }

    /// Jobs submitted since construction or the last
    /// [`starting_new_step`](Self::starting_new_step).
    pub fn num_submitted(&self) -> usize {
        self.num_submitted
    }

    /// Reset the submission counter for a new step.
    pub fn starting_new_step(&mut self) {
        self.num_submitted = 0;
    }

    pub fn number_of_failures(&self) -> usize {
        self.num_failed
    }

    /// Failed runs in collection order, keyed by identifier.
    pub fn failed_jobs(&self) -> &FailureLedger {
        &self.failed_jobs
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn batch_size(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots, whether running or finished but not yet collected.
    pub fn num_running(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}
