use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::ledger::FailureRecord;
use crate::runner::{Runner, RunnerKind};

use super::JobHandler;

/// Bytes of a failed job's output kept in the ledger and the log.
const OUTPUT_EXCERPT_BYTES: u64 = 4096;

fn matches_prefix(runner: &dyn Runner, prefix: Option<&str>) -> bool {
    prefix.map_or(true, |p| runner.identifier().starts_with(p))
}

impl JobHandler {
    /// Collect finished runners and free their slots.
    ///
    /// With a `prefix`, only runners whose identifier starts with it are
    /// collected. Each collected runner's return code is read once: failures
    /// go to the ledger, successful external runs get their configured
    /// cleanup. Freed slots are refilled from the queue.
    pub fn get_finished(&mut self, prefix: Option<&str>) -> Vec<Box<dyn Runner>> {
        let mut finished = Vec::new();
        for slot in &mut self.slots {
            let take = match slot {
                Some(runner) => runner.is_done() && matches_prefix(&**runner, prefix),
                None => false,
            };
            if take {
                if let Some(runner) = slot.take() {
                    finished.push(runner);
                }
            }
        }

        for runner in &mut finished {
            self.record_outcome(&mut **runner);
        }

        if !self.queue.is_empty() {
            self.add_runs();
        }
        finished
    }

    /// Finished runners, left in their slots with no bookkeeping.
    ///
    /// Queued jobs are started in free slots first.
    pub fn get_finished_no_pop(&mut self, prefix: Option<&str>) -> Vec<&mut Box<dyn Runner>> {
        if !self.queue.is_empty() {
            self.add_runs();
        }
        self.slots
            .iter_mut()
            .flatten()
            .filter_map(|runner| {
                (runner.is_done() && matches_prefix(&**runner, prefix)).then_some(runner)
            })
            .collect()
    }

    /// `true` once nothing is queued and every occupied slot is done.
    pub fn is_finished(&mut self) -> bool {
        self.queue.is_empty()
            && self
                .slots
                .iter_mut()
                .flatten()
                .all(|runner| runner.is_done())
    }

    /// Drop every queued job and terminate running ones.
    ///
    /// Terminated runners stay in their slots until collected. Counters and
    /// the failure ledger are left alone.
    pub fn terminate_all(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        let mut killed = 0;
        for runner in self.slots.iter_mut().flatten() {
            if !runner.is_done() {
                runner.kill();
                killed += 1;
            }
        }
        info!(dropped, killed, "terminated all jobs");
    }

    fn record_outcome(&mut self, runner: &mut dyn Runner) {
        let return_code = runner.return_code();
        let success = return_code == 0;
        self.metrics
            .record_collection(runner.kind(), runner.runtime(), success);

        if success {
            debug!(job = runner.identifier(), "job finished");
            if runner.kind() == RunnerKind::External {
                self.clean_up(runner);
            }
            return;
        }

        warn!(
            job = runner.identifier(),
            command = runner.command(),
            return_code,
            "process failed"
        );
        self.num_failed += 1;

        let excerpt = runner.output_filename().and_then(|path| {
            let excerpt = read_excerpt(&path);
            match &excerpt {
                Some(e) if e.truncated() => warn!(
                    job = runner.identifier(),
                    output = %e.text,
                    shown_bytes = OUTPUT_EXCERPT_BYTES,
                    total_bytes = e.total_bytes,
                    path = %path.display(),
                    "job output truncated; full log kept at path"
                ),
                Some(e) => warn!(job = runner.identifier(), output = %e.text, "job output"),
                None => warn!(job = runner.identifier(), path = %path.display(), "no output"),
            }
            excerpt
        });
        let record = match excerpt {
            Some(e) => FailureRecord::new(return_code, runner.metadata().clone(), Some(e.text))
                .with_output_bytes(e.total_bytes),
            None => FailureRecord::new(return_code, runner.metadata().clone(), None),
        };
        self.failed_jobs.insert(runner.identifier().to_string(), record);
    }

    /// Remove the log and configured scratch files of a successful external run.
    fn clean_up(&self, runner: &dyn Runner) {
        if self.config.delete_successful_logs {
            if let Some(output) = runner.output_filename() {
                info!(job = runner.identifier(), "run ended smoothly, removing log file");
                remove_file(&output);
            }
        }

        if self.config.delete_out_extensions.is_empty() {
            return;
        }
        let Some(dir) = runner.working_dir() else {
            return;
        };
        let suffixes: Vec<String> = self
            .config
            .delete_out_extensions
            .iter()
            .map(|ext| {
                if ext.starts_with('.') {
                    ext.clone()
                } else {
                    format!(".{ext}")
                }
            })
            .collect();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot list working directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if suffixes.iter().any(|s| name.ends_with(s.as_str())) {
                remove_file(&entry.path());
            }
        }
    }
}

fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

/// Head of a failed job's output file.
struct Excerpt {
    text: String,
    total_bytes: u64,
}

impl Excerpt {
    fn truncated(&self) -> bool {
        self.total_bytes > OUTPUT_EXCERPT_BYTES
    }
}

/// Leading bytes of a file as lossy UTF-8, or `None` if it cannot be read.
fn read_excerpt(path: &Path) -> Option<Excerpt> {
    let file = fs::File::open(path).ok()?;
    let total_bytes = file.metadata().ok()?.len();
    let mut buf = Vec::new();
    file.take(OUTPUT_EXCERPT_BYTES).read_to_end(&mut buf).ok()?;
    Some(Excerpt {
        text: String::from_utf8_lossy(&buf).into_owned(),
        total_bytes,
    })
}
