use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::job::TaskOutcome;

use super::{run_guarded, BackendError, BackendStats, Task, TaskHandle, WorkerBackend};

/// In-process backend: a fixed-size `rayon` pool shared by all internal jobs.
pub struct LocalPoolBackend {
    pool: rayon::ThreadPool,
    workers: usize,
    counters: Arc<PoolCounters>,
}

#[derive(Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
}

impl LocalPoolBackend {
    /// Build a pool with `workers` threads.
    pub fn new(workers: usize) -> Result<Self, BackendError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("simrun-worker-{i}"))
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build worker pool: {e}")))?;
        debug!(workers, "local worker pool started");
        Ok(Self {
            pool,
            workers,
            counters: Arc::new(PoolCounters::default()),
        })
    }
}

impl WorkerBackend for LocalPoolBackend {
    fn name(&self) -> &str {
        "local-pool"
    }

    fn submit(&self, task: Task) -> Result<Box<dyn TaskHandle>, BackendError> {
        let slot = Arc::new(TaskSlot::default());
        let worker_slot = Arc::clone(&slot);
        let counters = Arc::clone(&self.counters);
        trace!(
            task = %task.identifier,
            dependencies = ?task.dependencies,
            "submitting task to local pool"
        );

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.pool.spawn(move || {
            if worker_slot.cancelled.load(Ordering::Acquire) {
                counters.cancelled.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let outcome = run_guarded(&task.function, &task.args);
            *worker_slot
                .outcome
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(outcome);
            worker_slot.finished.store(true, Ordering::Release);
            counters.completed.fetch_add(1, Ordering::Relaxed);
        });

        Ok(Box::new(LocalTaskHandle { slot }))
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            workers: self.workers,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Shared between a pool task and its handle.
#[derive(Default)]
struct TaskSlot {
    finished: AtomicBool,
    cancelled: AtomicBool,
    outcome: Mutex<Option<TaskOutcome>>,
}

struct LocalTaskHandle {
    slot: Arc<TaskSlot>,
}

impl TaskHandle for LocalTaskHandle {
    fn is_finished(&self) -> bool {
        self.slot.finished.load(Ordering::Acquire) || self.slot.cancelled.load(Ordering::Acquire)
    }

    fn take_result(&mut self) -> Option<TaskOutcome> {
        if !self.slot.finished.load(Ordering::Acquire) {
            return None;
        }
        self.slot
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn cancel(&mut self) {
        self.slot.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use serde_json::Value;

    use super::*;
    use crate::job::job_function;

    fn task(name: &str, function: crate::job::JobFunction, args: Vec<Value>) -> Task {
        Task {
            identifier: name.to_string(),
            function,
            args,
            dependencies: Vec::new(),
        }
    }

    fn wait_finished(handle: &dyn TaskHandle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "task did not finish in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runs_task_and_returns_result() {
        let backend = LocalPoolBackend::new(2).unwrap();
        let f = job_function(|args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(Value::from(a + b))
        });
        let mut handle = backend
            .submit(task("sum", f, vec![Value::from(2), Value::from(3)]))
            .unwrap();

        wait_finished(handle.as_ref());
        assert_eq!(handle.take_result(), Some(Ok(Value::from(5))));
        // Outcome is handed out once.
        assert_eq!(handle.take_result(), None);

        let stats = backend.stats();
        assert_eq!(stats.workers, 2);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn panicking_task_yields_error() {
        let backend = LocalPoolBackend::new(1).unwrap();
        let f = job_function(|_| panic!("boom"));
        let mut handle = backend.submit(task("boom", f, Vec::new())).unwrap();

        wait_finished(handle.as_ref());
        let outcome = handle.take_result().unwrap();
        assert!(outcome.unwrap_err().contains("boom"));
    }

    #[test]
    fn cancelled_queued_task_never_runs() {
        let backend = LocalPoolBackend::new(1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        // Occupy the only worker until released.
        let blocker = job_function(move |_| {
            let _ = release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5));
            Ok(Value::Bool(true))
        });
        let blocking = backend.submit(task("blocker", blocker, Vec::new())).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_flag = Arc::clone(&ran);
        let queued = job_function(move |_| {
            ran_flag.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let mut handle = backend.submit(task("queued", queued, Vec::new())).unwrap();
        handle.cancel();
        assert!(handle.is_finished());

        release_tx.send(()).unwrap();
        wait_finished(blocking.as_ref());

        let deadline = Instant::now() + Duration::from_secs(5);
        while backend.stats().cancelled == 0 {
            assert!(Instant::now() < deadline, "cancelled task was never drained");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(handle.take_result(), None);
    }
}
