//! GE Runtime - Graph lifecycle and execution manager.
//!
//! This crate owns compiled graphs from registration to execution:
//! - Graph registry with a per-graph state machine and run exclusivity
//! - Compile, build and load through the `GraphCompiler` and `Executor` collaborators
//! - Memory-base accounting for constant, fixed and refreshable feature memory
//! - Synchronous runs and a single-worker asynchronous run pipeline
//! - Compiled graph summaries and rebuild tracking for externally written resources

#![warn(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod rebuild;
pub mod summary;
pub mod testing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::ManagerConfig;
    pub use crate::diagnostics::DiagnosticContext;
    pub use crate::manager::{GraphManager, GraphState, GraphStatus};
    pub use crate::memory::{MemoryBaseTable, RefreshScope};
    pub use crate::metrics::{ManagerMetrics, MetricsSnapshot};
    pub use crate::observability::{LogFormat, TracingConfig, init_tracing};
    pub use crate::pipeline::{RunCompletion, RunRequest};
    pub use crate::rebuild::RebuildStateController;
    pub use crate::summary::{CompiledGraphSummary, FeatureMemoryInfo, ModelStreams};
    pub use crate::testing::{MockExecutor, StubCompiler};
    pub use ge_core::prelude::*;
}
