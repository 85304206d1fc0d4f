use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use simrun_core::Metadata;
use tracing::{debug, info, warn};

use crate::backend::{run_guarded, Task, TaskHandle, WorkerBackend};
use crate::error::SchedulerError;
use crate::job::{InternalJob, JobFunction, TaskOutcome};

use super::{internal_identifier, Evaluation, Runner, RunnerKind};

/// Where the function call is running.
enum Execution {
    NotStarted,
    Thread {
        handle: JoinHandle<()>,
        rx: Receiver<TaskOutcome>,
    },
    Backend(Box<dyn TaskHandle>),
    /// Killed or lost; no result will arrive.
    Detached,
    Finished,
}

/// Runs a function call on a dedicated thread, or on the worker backend
/// when one is configured.
pub struct InternalRunner {
    job_id: u64,
    identifier: String,
    function: JobFunction,
    args: Vec<Value>,
    dependencies: Vec<String>,
    metadata: Metadata,
    backend: Option<Arc<dyn WorkerBackend>>,
    execution: Execution,
    /// `None` until the outcome was fetched.
    outcome: Option<Option<Value>>,
    return_code: Option<i32>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl InternalRunner {
    /// `backend` is ignored when the job forces local threads.
    pub fn new(job: InternalJob, job_id: u64, backend: Option<Arc<dyn WorkerBackend>>) -> Self {
        let backend = if job.force_local_threads { None } else { backend };
        Self {
            job_id,
            identifier: internal_identifier(job.identifier.as_deref()),
            function: job.function,
            args: job.args,
            dependencies: job.dependencies,
            metadata: job.metadata,
            backend,
            execution: Execution::NotStarted,
            outcome: None,
            return_code: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn fail(&mut self, message: String) {
        self.metadata.insert("error".to_string(), Value::String(message));
        self.settle(None);
    }

    fn settle(&mut self, value: Option<Value>) {
        self.outcome = Some(value);
        self.finished_at = Some(Instant::now());
        if !matches!(self.execution, Execution::Detached) {
            self.execution = Execution::Finished;
        }
    }

    fn accept(&mut self, outcome: TaskOutcome) {
        match outcome {
            Ok(value) => {
                debug!(job = %self.identifier, "internal job finished");
                self.settle(Some(value));
            }
            Err(message) => {
                warn!(job = %self.identifier, error = %message, "internal job failed");
                self.fail(message);
            }
        }
    }

    /// Fetch the outcome once the execution is complete. Never blocks.
    fn poll(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        match &mut self.execution {
            Execution::NotStarted | Execution::Detached | Execution::Finished => {}
            Execution::Thread { handle, rx } => {
                let received = match rx.try_recv() {
                    Err(TryRecvError::Empty) if handle.is_finished() => rx
                        .recv_timeout(Duration::from_secs(1))
                        .map_err(|_| TryRecvError::Disconnected),
                    other => other,
                };
                match received {
                    Ok(outcome) => self.accept(outcome),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {
                        self.fail("worker thread exited without a result".to_string());
                    }
                }
            }
            Execution::Backend(handle) => {
                if !handle.is_finished() {
                    return;
                }
                match handle.take_result() {
                    Some(outcome) => self.accept(outcome),
                    None => self.fail("task produced no result".to_string()),
                }
                if let Some(backend) = &self.backend {
                    debug!(backend = backend.name(), stats = ?backend.stats(), "backend progress");
                }
            }
        }
    }

    fn start_thread(&mut self) -> Result<(), SchedulerError> {
        let (tx, rx) = mpsc::sync_channel(1);
        let function = Arc::clone(&self.function);
        let args = self.args.clone();
        let spawned = thread::Builder::new()
            .name(format!("simrun-job-{}", self.job_id))
            .spawn(move || {
                let _ = tx.send(run_guarded(&function, &args));
            });
        match spawned {
            Ok(handle) => {
                self.execution = Execution::Thread { handle, rx };
                Ok(())
            }
            Err(source) => {
                self.fail(format!("failed to start: {source}"));
                Err(SchedulerError::Spawn {
                    identifier: self.identifier.clone(),
                    source,
                })
            }
        }
    }

    fn start_backend(&mut self, backend: Arc<dyn WorkerBackend>) -> Result<(), SchedulerError> {
        let task = Task {
            identifier: self.identifier.clone(),
            function: Arc::clone(&self.function),
            args: self.args.clone(),
            dependencies: self.dependencies.clone(),
        };
        match backend.submit(task) {
            Ok(handle) => {
                self.execution = Execution::Backend(handle);
                Ok(())
            }
            Err(source) => {
                self.fail(format!("failed to submit: {source}"));
                Err(SchedulerError::Submit {
                    identifier: self.identifier.clone(),
                    source,
                })
            }
        }
    }
}

impl Runner for InternalRunner {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn job_id(&self) -> u64 {
        self.job_id
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Internal
    }

    fn command(&self) -> &str {
        "internal"
    }

    fn start(&mut self) -> Result<(), SchedulerError> {
        self.started_at = Some(Instant::now());
        match self.backend.clone() {
            Some(backend) => {
                debug!(job = %self.identifier, backend = backend.name(), "submitting internal job");
                self.start_backend(backend)
            }
            None => {
                debug!(job = %self.identifier, "starting internal job on a thread");
                self.start_thread()
            }
        }
    }

    fn is_done(&mut self) -> bool {
        self.poll();
        self.outcome.is_some()
    }

    fn return_code(&mut self) -> i32 {
        if let Some(code) = self.return_code {
            return code;
        }
        if !self.is_done() {
            return -1;
        }
        let code = match &self.outcome {
            Some(Some(value)) if !value.is_null() => 0,
            _ => -1,
        };
        self.return_code = Some(code);
        code
    }

    fn return_evaluation(&mut self) -> Evaluation {
        if !self.is_done() {
            return Evaluation::Pending;
        }
        match &self.outcome {
            Some(Some(value)) if !value.is_null() => Evaluation::Output {
                input: self.args.first().cloned().unwrap_or(Value::Null),
                output: value.clone(),
            },
            _ => Evaluation::Failed,
        }
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn working_dir(&self) -> Option<&Path> {
        None
    }

    fn output_filename(&self) -> Option<PathBuf> {
        None
    }

    fn runtime(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(
            self.finished_at
                .map_or_else(|| started.elapsed(), |end| end.duration_since(started)),
        )
    }

    fn kill(&mut self) {
        if self.outcome.is_some() {
            warn!(job = %self.identifier, "kill requested on a finished job; ignoring");
            return;
        }
        match std::mem::replace(&mut self.execution, Execution::Detached) {
            Execution::Backend(mut handle) => {
                info!(job = %self.identifier, "cancelling backend task");
                handle.cancel();
            }
            Execution::Thread { .. } => {
                // Threads cannot be interrupted; drop the handle and let it finish unobserved.
                info!(job = %self.identifier, "detaching worker thread");
            }
            Execution::NotStarted => {
                debug!(job = %self.identifier, "kill requested before the job started");
            }
            Execution::Detached | Execution::Finished => {}
        }
        self.fail("terminated".to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::json;

    use super::*;
    use crate::backend::LocalPoolBackend;

    fn wait_done(runner: &mut InternalRunner) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !runner.is_done() {
            assert!(Instant::now() < deadline, "job did not finish in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn square() -> InternalJob {
        InternalJob::new(vec![json!(4)], |args| {
            let x = args[0].as_i64().ok_or("not a number")?;
            Ok(json!(x * x))
        })
    }

    #[test]
    fn thread_run_returns_evaluation() {
        let mut runner = InternalRunner::new(square().with_identifier("sq~7"), 0, None);
        assert_eq!(runner.identifier(), "7");
        assert_eq!(runner.command(), "internal");

        runner.start().unwrap();
        wait_done(&mut runner);

        assert_eq!(runner.return_code(), 0);
        assert_eq!(
            runner.return_evaluation(),
            Evaluation::Output {
                input: json!(4),
                output: json!(16)
            }
        );
        assert!(runner.working_dir().is_none());
    }

    #[test]
    fn null_result_is_failure() {
        let job = InternalJob::new(vec![json!("x")], |_| Ok(Value::Null));
        let mut runner = InternalRunner::new(job, 0, None);
        runner.start().unwrap();
        wait_done(&mut runner);

        assert_eq!(runner.return_code(), -1);
        assert_eq!(runner.return_evaluation(), Evaluation::Failed);
        assert!(!runner.metadata().contains_key("error"));
    }

    #[test]
    fn error_and_panic_recorded_in_metadata() {
        let job = InternalJob::new(vec![], |_| Err("diverged".to_string()));
        let mut runner = InternalRunner::new(job, 0, None);
        runner.start().unwrap();
        wait_done(&mut runner);
        assert_eq!(runner.return_code(), -1);
        assert_eq!(runner.metadata()["error"], json!("diverged"));

        let job = InternalJob::new(vec![], |_| panic!("bad mesh"));
        let mut runner = InternalRunner::new(job, 1, None);
        runner.start().unwrap();
        wait_done(&mut runner);
        assert_eq!(runner.return_code(), -1);
        assert_eq!(runner.metadata()["error"], json!("panicked: bad mesh"));
    }

    #[test]
    fn backend_run_and_forced_threads() {
        let backend: Arc<dyn WorkerBackend> = Arc::new(LocalPoolBackend::new(1).unwrap());

        let mut runner = InternalRunner::new(square(), 0, Some(Arc::clone(&backend)));
        runner.start().unwrap();
        wait_done(&mut runner);
        assert_eq!(runner.return_code(), 0);
        assert_eq!(backend.stats().submitted, 1);

        let mut runner =
            InternalRunner::new(square().force_local_threads(true), 1, Some(Arc::clone(&backend)));
        runner.start().unwrap();
        wait_done(&mut runner);
        assert_eq!(runner.return_code(), 0);
        assert_eq!(backend.stats().submitted, 1);
    }

    #[test]
    fn kill_detaches_thread() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&release);
        let job = InternalJob::new(vec![json!(1)], move |_| {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(json!(true))
        });
        let mut runner = InternalRunner::new(job, 0, None);
        runner.start().unwrap();
        assert!(!runner.is_done());

        runner.kill();
        assert!(runner.is_done());
        assert_eq!(runner.return_code(), -1);
        assert_eq!(runner.metadata()["error"], json!("terminated"));
        release.store(true, Ordering::SeqCst);
    }
}
