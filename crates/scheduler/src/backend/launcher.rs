use std::sync::{Arc, OnceLock};

use simrun_core::ParallelConfig;
use tracing::{info, warn};

use super::{BackendError, LocalPoolBackend, WorkerBackend};

/// Creates the worker backend from configuration.
///
/// `Ok(None)` means internal jobs run on plain threads.
pub trait BackendLauncher: Send + Sync {
    fn launch(
        &self,
        config: &ParallelConfig,
    ) -> Result<Option<Arc<dyn WorkerBackend>>, BackendError>;
}

/// Default launcher: a local `rayon` pool sized from the node list or core count.
///
/// Node lists naming more than one host need a launcher that knows how to
/// reach the remote workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPoolLauncher;

impl BackendLauncher for LocalPoolLauncher {
    fn launch(
        &self,
        config: &ParallelConfig,
    ) -> Result<Option<Arc<dyn WorkerBackend>>, BackendError> {
        if !config.internal_parallel {
            return Ok(None);
        }

        let workers = if config.nodes.is_empty() {
            config.total_cores
        } else {
            let hosts = config.unique_nodes();
            if hosts.len() > 1 {
                return Err(BackendError::Unavailable(format!(
                    "node list spans {} hosts ({}); the local pool only serves one host",
                    hosts.len(),
                    hosts.join(",")
                )));
            }
            config.nodes.len()
        };

        let backend = LocalPoolBackend::new(workers)?;
        Ok(Some(Arc::new(backend)))
    }
}

type LaunchState = Result<Option<Arc<dyn WorkerBackend>>, String>;

/// Lazily launched backend with a one-shot initialization latch.
///
/// The launcher runs at most once. A failed launch is remembered, so every
/// later request sees the same error.
pub struct BackendSlot {
    launcher: Box<dyn BackendLauncher>,
    state: OnceLock<LaunchState>,
}

impl BackendSlot {
    pub fn new(launcher: Box<dyn BackendLauncher>) -> Self {
        Self {
            launcher,
            state: OnceLock::new(),
        }
    }

    /// Replace the launcher. Ignored once the backend has been launched.
    pub fn set_launcher(&mut self, launcher: Box<dyn BackendLauncher>) {
        if self.is_initialized() {
            warn!("worker backend already launched; ignoring new launcher");
            return;
        }
        self.launcher = launcher;
    }

    /// Launch on first use, then return the cached outcome.
    pub fn get_or_launch(&self, config: &ParallelConfig) -> LaunchState {
        self.state
            .get_or_init(|| {
                info!(
                    internal_parallel = config.internal_parallel,
                    nodes = config.nodes.len(),
                    "bootstrapping worker backend"
                );
                match self.launcher.launch(config) {
                    Ok(Some(backend)) => {
                        info!(backend = backend.name(), "worker backend ready");
                        Ok(Some(backend))
                    }
                    Ok(None) => {
                        info!("internal jobs will run on local threads");
                        Ok(None)
                    }
                    Err(e) => {
                        warn!(error = %e, "worker backend bootstrap failed");
                        Err(e.to_string())
                    }
                }
            })
            .clone()
    }

    /// The launched backend, if launching already happened and succeeded.
    pub fn current(&self) -> Option<Arc<dyn WorkerBackend>> {
        match self.state.get() {
            Some(Ok(backend)) => backend.clone(),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingLauncher {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl BackendLauncher for CountingLauncher {
        fn launch(
            &self,
            _config: &ParallelConfig,
        ) -> Result<Option<Arc<dyn WorkerBackend>>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BackendError::Unavailable("no listeners".to_string()))
            } else {
                Ok(None)
            }
        }
    }

    fn parallel(nodes: &[&str], cores: usize) -> ParallelConfig {
        ParallelConfig {
            internal_parallel: true,
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            total_cores: cores,
        }
    }

    #[test]
    fn threads_when_internal_parallel_off() {
        let config = ParallelConfig::default();
        assert!(LocalPoolLauncher.launch(&config).unwrap().is_none());
    }

    #[test]
    fn pool_sized_from_cores_or_nodes() {
        let backend = LocalPoolLauncher.launch(&parallel(&[], 3)).unwrap().unwrap();
        assert_eq!(backend.stats().workers, 3);

        let backend = LocalPoolLauncher
            .launch(&parallel(&["host", "host ", "host"], 1))
            .unwrap()
            .unwrap();
        assert_eq!(backend.stats().workers, 3);
    }

    #[test]
    fn multiple_hosts_rejected() {
        let err = LocalPoolLauncher
            .launch(&parallel(&["a", "b"], 1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("2 hosts"));
    }

    #[test]
    fn launcher_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot = BackendSlot::new(Box::new(CountingLauncher {
            calls: Arc::clone(&calls),
            fail: false,
        }));
        assert!(!slot.is_initialized());

        let config = parallel(&[], 1);
        assert!(slot.get_or_launch(&config).unwrap().is_none());
        assert!(slot.get_or_launch(&config).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.is_initialized());
    }

    #[test]
    fn failed_launch_is_remembered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot = BackendSlot::new(Box::new(CountingLauncher {
            calls: Arc::clone(&calls),
            fail: true,
        }));
        let config = parallel(&[], 1);

        let first = slot.get_or_launch(&config).err().unwrap();
        let second = slot.get_or_launch(&config).err().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("no listeners"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.current().is_none());
    }
}
