use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use simrun_core::Metadata;
use tracing::{debug, info, warn};

use crate::command::TemplateContext;
use crate::error::SchedulerError;
use crate::job::ExternalJob;
use crate::validator::ResultValidator;

use super::{external_identifier, Evaluation, Runner, RunnerKind, DEFAULT_IDENTIFIER};

/// Runs one shell command as a child process, output redirected to a file.
pub struct ExternalRunner {
    job_id: u64,
    identifier: String,
    command: String,
    output: PathBuf,
    working_dir: PathBuf,
    env: BTreeMap<String, String>,
    metadata: Metadata,
    validator: Option<Arc<dyn ResultValidator>>,
    child: Option<Child>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    exit_code: Option<i32>,
    validator_failed: Option<bool>,
    start_failed: bool,
    kill_sent: bool,
}

impl ExternalRunner {
    /// Build a runner from a queued job, substituting `%TOKEN%`s in its command.
    pub fn new(job: ExternalJob, job_id: u64, template: &TemplateContext<'_>) -> Self {
        let (identifier, output, working_dir) = match &job.output {
            Some(output) => {
                let working_dir = match output.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() && parent != job.working_dir => {
                        job.working_dir.join(parent)
                    }
                    _ => job.working_dir.clone(),
                };
                (
                    external_identifier(output),
                    job.working_dir.join(output),
                    working_dir,
                )
            }
            None => (
                DEFAULT_IDENTIFIER.to_string(),
                job.working_dir.join(DEFAULT_IDENTIFIER),
                job.working_dir.clone(),
            ),
        };
        let command = template.substitute(&job.command, &working_dir);

        Self {
            job_id,
            identifier,
            command,
            output,
            working_dir,
            env: job.env,
            metadata: job.metadata,
            validator: job.validator,
            child: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
            validator_failed: None,
            start_failed: false,
            kill_sent: false,
        }
    }

    fn spawn(&self) -> io::Result<Child> {
        let out = File::create(&self.output)?;
        let err = out.try_clone()?;
        Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            .process_group(0)
            .spawn()
    }

    fn record_exit(&mut self, status: ExitStatus) {
        let code = match (status.code(), status.signal()) {
            (Some(code), _) => code,
            (None, Some(sig)) => 128 + sig,
            (None, None) => -1,
        };
        debug!(job = %self.identifier, code, "external job exited");
        self.exit_code = Some(code);
        self.finished_at = Some(Instant::now());
    }
}

impl Runner for ExternalRunner {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn job_id(&self) -> u64 {
        self.job_id
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::External
    }

    fn command(&self) -> &str {
        &self.command
    }

    fn start(&mut self) -> Result<(), SchedulerError> {
        self.started_at = Some(Instant::now());
        match self.spawn() {
            Ok(child) => {
                debug!(
                    job = %self.identifier,
                    pid = child.id(),
                    working_dir = %self.working_dir.display(),
                    "external job started"
                );
                self.child = Some(child);
                Ok(())
            }
            Err(source) => {
                self.start_failed = true;
                self.exit_code = Some(-1);
                self.finished_at = self.started_at;
                self.metadata.insert(
                    "error".to_string(),
                    Value::String(format!("failed to start: {source}")),
                );
                Err(SchedulerError::Spawn {
                    identifier: self.identifier.clone(),
                    source,
                })
            }
        }
    }

    fn is_done(&mut self) -> bool {
        if self.exit_code.is_some() {
            return true;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(job = %self.identifier, error = %e, "failed to poll external job");
                self.exit_code = Some(-1);
                self.finished_at = Some(Instant::now());
                true
            }
        }
    }

    fn return_code(&mut self) -> i32 {
        if !self.is_done() {
            return -1;
        }
        let code = self.exit_code.unwrap_or(-1);
        if self.start_failed {
            return code;
        }
        if let Some(validator) = &self.validator {
            let failed = *self.validator_failed.get_or_insert_with(|| {
                validator.check_for_output_failure(&self.output, &self.working_dir)
            });
            if failed {
                return 1;
            }
        }
        code
    }

    fn return_evaluation(&mut self) -> Evaluation {
        Evaluation::NotApplicable
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn working_dir(&self) -> Option<&Path> {
        Some(&self.working_dir)
    }

    fn output_filename(&self) -> Option<PathBuf> {
        Some(self.output.clone())
    }

    fn runtime(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(
            self.finished_at
                .map_or_else(|| started.elapsed(), |end| end.duration_since(started)),
        )
    }

    fn kill(&mut self) {
        let Some(child) = self.child.as_mut() else {
            debug!(job = %self.identifier, "kill requested before the job started");
            return;
        };
        if self.exit_code.is_some() {
            warn!(job = %self.identifier, "kill requested on a finished job; ignoring");
            return;
        }
        if self.kill_sent {
            debug!(job = %self.identifier, "termination already requested");
            return;
        }
        self.kill_sent = true;
        info!(job = %self.identifier, pid = child.id(), command = %self.command, "terminating");
        // The shell leads its own process group, so this reaches every command it forked.
        let pgid = Pid::from_raw(child.id() as i32);
        if let Err(e) = signal::killpg(pgid, Signal::SIGTERM) {
            warn!(job = %self.identifier, error = %e, "SIGTERM failed; killing");
            if let Err(e) = child.kill() {
                warn!(job = %self.identifier, error = %e, "kill failed");
            }
        }
    }
}
