use tracing::{debug, warn};

use crate::command::TemplateContext;
use crate::job::JobSpec;
use crate::runner::{ExternalRunner, InternalRunner, Runner};

use super::JobHandler;

/// Build method substituted for `%METHOD%` when `METHOD` is unset.
const DEFAULT_METHOD: &str = "opt";

impl JobHandler {
    /// Start queued jobs in every free slot, lowest slot index first.
    pub(crate) fn add_runs(&mut self) {
        let method = std::env::var("METHOD").unwrap_or_else(|_| DEFAULT_METHOD.to_string());

        for index in 0..self.slots.len() {
            if self.slots[index].is_some() {
                continue;
            }
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            debug!(job = job.label(), slot = index, "dequeued job");

            let mut runner: Box<dyn Runner> = match job {
                JobSpec::External(job) => {
                    let template = TemplateContext {
                        slot_index: index,
                        current_id: self.next_id,
                        script_dir: &self.config.script_dir,
                        framework_dir: &self.config.framework_dir,
                        base_working_dir: &self.config.working_dir,
                        method: method.clone(),
                        num_cpus: self.config.num_threads,
                    };
                    Box::new(ExternalRunner::new(job, self.next_id, &template))
                }
                JobSpec::Internal(job) => Box::new(InternalRunner::new(
                    job,
                    self.next_id,
                    self.backend.current(),
                )),
            };

            if let Err(e) = runner.start() {
                warn!(job = runner.identifier(), error = %e, "job failed to start");
            } else {
                debug!(
                    job = runner.identifier(),
                    job_id = runner.job_id(),
                    slot = index,
                    "job started"
                );
            }
            self.metrics.record_start(runner.kind());
            self.slots[index] = Some(runner);
            self.next_id += 1;
        }
    }

    /// Free or finished slots, counted only while nothing is queued.
    ///
    /// Returns 0 whenever the queue is non-empty, even if slots are free.
    pub fn how_many_free_spots(&mut self) -> usize {
        if !self.queue.is_empty() {
            return 0;
        }
        self.slots
            .iter_mut()
            .map(|slot| slot.as_mut().map_or(true, |runner| runner.is_done()))
            .filter(|free| *free)
            .count()
    }
}
