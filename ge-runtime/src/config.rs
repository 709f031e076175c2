//! Graph manager configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`GraphManager`](crate::manager::GraphManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of pending async run requests.
    pub run_queue_capacity: usize,
    /// Name given to the async run worker thread.
    pub worker_thread_name: String,
    /// Dispatch async runs with the legacy run-args shape.
    ///
    /// Legacy executors resolve the model by graph id rather than receiving it
    /// with the request.
    pub use_legacy_run_args: bool,
    /// Permit `remove_graph` while the graph is executing.
    pub allow_remove_while_running: bool,
    /// Timeout applied to runs whose graph options do not set one, in
    /// milliseconds. Zero means no timeout.
    pub default_exec_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            run_queue_capacity: 1024,
            worker_thread_name: "ge-run-worker".to_string(),
            use_legacy_run_args: false,
            allow_remove_while_running: false,
            default_exec_timeout_ms: 0,
        }
    }
}

impl ManagerConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `GE_RUN_QUEUE_CAPACITY`: Maximum pending async run requests
    /// - `GE_WORKER_THREAD_NAME`: Name of the async run worker thread
    /// - `GE_LEGACY_RUN_ARGS`: Use the legacy run-args shape ("1" or "true")
    /// - `GE_EXEC_TIMEOUT_MS`: Default execution timeout in milliseconds
    ///
    /// # Example
    ///
    /// ```bash
    /// export GE_RUN_QUEUE_CAPACITY=256
    /// export GE_EXEC_TIMEOUT_MS=5000
    /// ```
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let run_queue_capacity = std::env::var("GE_RUN_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.run_queue_capacity);

        let worker_thread_name = std::env::var("GE_WORKER_THREAD_NAME")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.worker_thread_name);

        let use_legacy_run_args = std::env::var("GE_LEGACY_RUN_ARGS")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.use_legacy_run_args);

        let default_exec_timeout_ms = std::env::var("GE_EXEC_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.default_exec_timeout_ms);

        Self {
            run_queue_capacity,
            worker_thread_name,
            use_legacy_run_args,
            default_exec_timeout_ms,
            ..defaults
        }
    }

    /// Set the run queue capacity.
    pub fn with_run_queue_capacity(mut self, capacity: usize) -> Self {
        self.run_queue_capacity = capacity.max(1);
        self
    }

    /// Set the worker thread name.
    pub fn with_worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Use the legacy run-args shape for async dispatch.
    pub fn with_legacy_run_args(mut self, legacy: bool) -> Self {
        self.use_legacy_run_args = legacy;
        self
    }

    /// Permit removal of running graphs.
    pub fn with_remove_while_running(mut self, allow: bool) -> Self {
        self.allow_remove_while_running = allow;
        self
    }

    /// Set the default execution timeout in milliseconds.
    pub fn with_default_exec_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_exec_timeout_ms = timeout_ms;
        self
    }

    /// Default execution timeout, if any.
    pub fn default_exec_timeout(&self) -> Option<Duration> {
        (self.default_exec_timeout_ms > 0).then(|| Duration::from_millis(self.default_exec_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.run_queue_capacity, 1024);
        assert!(!config.allow_remove_while_running);
        assert_eq!(config.default_exec_timeout(), None);
    }

    #[test]
    fn builder_methods() {
        let config = ManagerConfig::default()
            .with_run_queue_capacity(0)
            .with_default_exec_timeout_ms(250)
            .with_legacy_run_args(true);
        assert_eq!(config.run_queue_capacity, 1);
        assert_eq!(
            config.default_exec_timeout(),
            Some(Duration::from_millis(250))
        );
        assert!(config.use_legacy_run_args);
    }

    #[test]
    fn deserialize_partial() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{"run_queue_capacity": 8}"#).unwrap();
        assert_eq!(config.run_queue_capacity, 8);
        assert_eq!(config.worker_thread_name, "ge-run-worker");
    }
}
