use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::runner::RunnerKind;

/// Per-kind job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub submitted: u64,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Job handler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobMetrics {
    /// Counters by runner kind.
    pub by_kind: HashMap<RunnerKind, KindCounts>,
    /// Number of collected runs that reported a runtime.
    pub timed_runs: u64,
    /// Rolling average wall time of collected runs.
    pub avg_runtime: Duration,
    /// When a run was last collected.
    pub last_collected: Option<DateTime<Utc>>,
}

impl JobMetrics {
    pub fn record_submit(&mut self, kind: RunnerKind) {
        self.by_kind.entry(kind).or_default().submitted += 1;
    }

    pub fn record_start(&mut self, kind: RunnerKind) {
        self.by_kind.entry(kind).or_default().started += 1;
    }

    /// Record a collected run.
    pub fn record_collection(&mut self, kind: RunnerKind, runtime: Option<Duration>, success: bool) {
        let counts = self.by_kind.entry(kind).or_default();
        if success {
            counts.succeeded += 1;
        } else {
            counts.failed += 1;
        }
        self.last_collected = Some(Utc::now());

        let Some(runtime) = runtime else {
            return;
        };
        self.timed_runs += 1;

        // Incremental mean: new_avg = prev_avg + (runtime - prev_avg) / count
        self.avg_runtime = if self.timed_runs == 1 {
            runtime
        } else {
            let prev = self.avg_runtime.as_nanos() as f64;
            let cur = runtime.as_nanos() as f64;
            let avg = prev + (cur - prev) / self.timed_runs as f64;
            Duration::from_nanos(avg as u64)
        };
    }

    /// Counters for one kind, zero if nothing was recorded.
    pub fn counts(&self, kind: RunnerKind) -> KindCounts {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }

    pub fn total_failed(&self) -> u64 {
        self.by_kind.values().map(|c| c.failed).sum()
    }
}
