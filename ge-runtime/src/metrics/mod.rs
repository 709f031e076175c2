//! Manager-wide counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a graph manager.
#[derive(Debug, Default)]
pub struct ManagerMetrics {
    /// Graphs registered by `add_graph` or `fork_graph`.
    pub graphs_added: AtomicU64,
    /// Graphs removed.
    pub graphs_removed: AtomicU64,
    /// Successful compiles.
    pub compiles: AtomicU64,
    /// Failed compiles.
    pub compile_failures: AtomicU64,
    /// Recompiles triggered by changed resources.
    pub rebuilds: AtomicU64,
    /// Executions started.
    pub runs_started: AtomicU64,
    /// Executions completed successfully.
    pub runs_completed: AtomicU64,
    /// Executions that failed.
    pub runs_failed: AtomicU64,
    /// Async requests accepted onto the run queue.
    pub async_enqueued: AtomicU64,
    /// Requests rejected because the graph was already running.
    pub already_running: AtomicU64,
}

impl ManagerMetrics {
    /// Record a graph registration.
    pub fn record_graph_added(&self) {
        self.graphs_added.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a graph removal.
    pub fn record_graph_removed(&self) {
        self.graphs_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a compile outcome.
    pub fn record_compile(&self, ok: bool) {
        if ok {
            self.compiles.fetch_add(1, Ordering::Relaxed);
        } else {
            self.compile_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rebuild.
    pub fn record_rebuild(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run start.
    pub fn record_run_start(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run outcome.
    pub fn record_run_finished(&self, ok: bool) {
        if ok {
            self.runs_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an accepted async request.
    pub fn record_enqueued(&self) {
        self.async_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an already-running rejection.
    pub fn record_already_running(&self) {
        self.already_running.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs started but not yet finished.
    pub fn runs_active(&self) -> u64 {
        let started = self.runs_started.load(Ordering::Relaxed);
        let finished = self.runs_completed.load(Ordering::Relaxed)
            + self.runs_failed.load(Ordering::Relaxed);
        started.saturating_sub(finished)
    }

    /// Get the current run error rate (failures / started).
    pub fn error_rate(&self) -> f64 {
        let started = self.runs_started.load(Ordering::Relaxed);
        let failed = self.runs_failed.load(Ordering::Relaxed);
        if started == 0 {
            0.0
        } else {
            failed as f64 / started as f64
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            graphs_added: self.graphs_added.load(Ordering::Relaxed),
            graphs_removed: self.graphs_removed.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            async_enqueued: self.async_enqueued.load(Ordering::Relaxed),
            already_running: self.already_running.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`ManagerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct MetricsSnapshot {
    pub graphs_added: u64,
    pub graphs_removed: u64,
    pub compiles: u64,
    pub compile_failures: u64,
    pub rebuilds: u64,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub async_enqueued: u64,
    pub already_running: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accounting() {
        let metrics = ManagerMetrics::default();
        metrics.record_run_start();
        metrics.record_run_start();
        metrics.record_run_finished(true);
        assert_eq!(metrics.runs_active(), 1);

        metrics.record_run_finished(false);
        assert_eq!(metrics.runs_active(), 0);
        assert!((metrics.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_serializes() {
        let metrics = ManagerMetrics::default();
        metrics.record_graph_added();
        metrics.record_compile(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.graphs_added, 1);
        assert_eq!(snapshot.compile_failures, 1);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["graphs_added"], 1);
    }
}
