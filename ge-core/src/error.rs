//! Error types for GE.
//!
//! Every error carries the identifiers needed to act on it and maps onto the
//! stable external [`Status`] vocabulary through [`GeError::status`].

use crate::traits::{CompileError, ExecutorError};
use crate::types::{DeviceAddr, GraphId, MemoryKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable status vocabulary surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The operation succeeded.
    Success,
    /// Generic failure.
    Failed,
    /// A parameter was invalid.
    ParamInvalid,
    /// The graph id is not registered.
    GraphNotExist,
    /// The graph node expected to exist was missing.
    GraphNodeNull,
    /// The graph is already executing.
    AlreadyRunning,
    /// The graph has not been compiled (or loaded, for stream runs).
    NotBuilt,
    /// A one-shot operation was repeated.
    RepeatOperation,
    /// The operation is not supported in the graph's current configuration.
    Unsupported,
    /// The graph is executing and cannot be modified.
    GraphIsRunning,
    /// An internal invariant was violated.
    InternalError,
    /// An option value could not be parsed.
    OptionsInvalid,
    /// The graph id is already registered.
    AlreadyExists,
    /// The execution did not produce a result within the caller's timeout.
    ExecutionTimeout,
}

impl Status {
    /// Whether this status denotes success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }

    /// Status of a result.
    #[must_use]
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.status(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The main error type for GE operations.
#[derive(Error, Debug)]
pub enum GeError {
    // =========================================================================
    // Usage Errors (GE100-GE199)
    // =========================================================================
    /// The graph id is already registered.
    #[error("GE101: Graph {graph_id} already exists")]
    GraphAlreadyExists {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// The graph id is not registered.
    #[error("GE102: Graph {graph_id} does not exist")]
    GraphNotExist {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// The graph node vanished between lookup and use.
    #[error("GE103: Graph node for {graph_id} is null")]
    GraphNodeNull {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// A second execution was requested while one is in flight.
    #[error("GE104: Graph {graph_id} is already running")]
    AlreadyRunning {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// A mutation was requested while the graph is executing.
    #[error("GE105: Graph {graph_id} is running, cannot {operation}")]
    GraphIsRunning {
        /// The graph identifier.
        graph_id: GraphId,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The graph has not been compiled.
    #[error("GE106: Graph {graph_id} has not been compiled, cannot {operation}")]
    NotBuilt {
        /// The graph identifier.
        graph_id: GraphId,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The graph has not been loaded.
    #[error("GE107: Graph {graph_id} has not been loaded, cannot {operation}")]
    NotLoaded {
        /// The graph identifier.
        graph_id: GraphId,
        /// The rejected operation.
        operation: &'static str,
    },

    /// A parameter was rejected.
    #[error("GE108: Invalid parameter for graph {graph_id}: {cause}")]
    InvalidParam {
        /// The graph identifier.
        graph_id: GraphId,
        /// Why the parameter was rejected.
        cause: String,
    },

    /// Tracked resources changed after the graph was built.
    #[error(
        "GE109: Graph {graph_id} needs to be rebuilt; remove it and add it again before building"
    )]
    NeedsRebuild {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// The manager has not been initialized, or has been finalized.
    #[error("GE110: Graph manager is not initialized")]
    NotInitialized,

    // =========================================================================
    // Memory-Base Errors (GE200-GE299)
    // =========================================================================
    /// A one-shot memory base was set twice.
    #[error("GE201: {memory} of graph {graph_id} has already been set")]
    RepeatOperation {
        /// The graph identifier.
        graph_id: GraphId,
        /// The memory slot.
        memory: MemoryKind,
    },

    /// The memory-base operation conflicts with the graph's state or options.
    #[error("GE202: Cannot set {memory} of graph {graph_id}: {cause}")]
    MemoryUnsupported {
        /// The graph identifier.
        graph_id: GraphId,
        /// The memory slot.
        memory: MemoryKind,
        /// Why the operation is unsupported.
        cause: String,
    },

    /// Address and size disagree about nullness.
    #[error("GE203: Invalid {memory} base for graph {graph_id}: address {addr} with size {size}")]
    InvalidMemoryBase {
        /// The graph identifier.
        graph_id: GraphId,
        /// The memory slot.
        memory: MemoryKind,
        /// The address supplied.
        addr: DeviceAddr,
        /// The size supplied.
        size: u64,
    },

    /// The supplied buffer is smaller than the model requires.
    #[error(
        "GE204: {memory} base for graph {graph_id} too small: required {required} bytes, got {provided}"
    )]
    MemoryTooSmall {
        /// The graph identifier.
        graph_id: GraphId,
        /// The memory slot.
        memory: MemoryKind,
        /// Bytes the model needs.
        required: u64,
        /// Bytes supplied.
        provided: u64,
    },

    // =========================================================================
    // Execution Errors (GE300-GE399)
    // =========================================================================
    /// The device reported no result within the caller's timeout.
    #[error("GE301: Graph {graph_id} execution timed out after {timeout_ms}ms")]
    ExecutionTimeout {
        /// The graph identifier.
        graph_id: GraphId,
        /// The caller's timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The executor collaborator failed.
    #[error("GE302: Executor failed for graph {graph_id}: {source}")]
    Executor {
        /// The graph identifier.
        graph_id: GraphId,
        /// The executor error.
        #[source]
        source: ExecutorError,
    },

    /// A queued request was discarded because the manager shut down.
    #[error("GE303: Run request for graph {graph_id} discarded at shutdown")]
    Finalized {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// A completion sink was dropped without being resolved.
    #[error("GE304: Completion for graph {graph_id} was dropped without a result")]
    CallbackDropped {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// The async run queue is full.
    #[error("GE305: Run queue full: {current}/{max} pending requests")]
    QueueFull {
        /// Current queue length.
        current: usize,
        /// Queue capacity.
        max: usize,
    },

    /// The async run queue has been stopped.
    #[error("GE306: Run queue is stopped")]
    QueueStopped,

    // =========================================================================
    // Compile Errors (GE400-GE499)
    // =========================================================================
    /// A compile stage failed; the graph stays uncompiled.
    #[error("GE401: Compile of graph {graph_id} failed: {source}")]
    Compile {
        /// The graph identifier.
        graph_id: GraphId,
        /// The stage failure.
        #[source]
        source: CompileError,
    },

    /// A size field was queried on a graph that is not statically shaped.
    #[error("GE402: {field} of graph {graph_id} is unknown for a dynamic-shape graph")]
    SummaryUnavailable {
        /// The graph identifier.
        graph_id: GraphId,
        /// The queried field.
        field: &'static str,
    },

    // =========================================================================
    // Configuration Errors (GE500-GE599)
    // =========================================================================
    /// An option could not be parsed.
    #[error("GE501: Invalid option '{key}'='{value}': {cause}")]
    OptionsInvalid {
        /// The option key.
        key: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        cause: String,
    },

    // =========================================================================
    // Internal Errors (GE900-GE999)
    // =========================================================================
    /// An internal invariant was violated.
    #[error("GE901: Internal error: {cause}")]
    Internal {
        /// Description of the violation.
        cause: String,
    },
}

impl GeError {
    /// Get the error code (e.g., "GE101").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::GraphAlreadyExists { .. } => "GE101",
            Self::GraphNotExist { .. } => "GE102",
            Self::GraphNodeNull { .. } => "GE103",
            Self::AlreadyRunning { .. } => "GE104",
            Self::GraphIsRunning { .. } => "GE105",
            Self::NotBuilt { .. } => "GE106",
            Self::NotLoaded { .. } => "GE107",
            Self::InvalidParam { .. } => "GE108",
            Self::NeedsRebuild { .. } => "GE109",
            Self::NotInitialized => "GE110",
            Self::RepeatOperation { .. } => "GE201",
            Self::MemoryUnsupported { .. } => "GE202",
            Self::InvalidMemoryBase { .. } => "GE203",
            Self::MemoryTooSmall { .. } => "GE204",
            Self::ExecutionTimeout { .. } => "GE301",
            Self::Executor { .. } => "GE302",
            Self::Finalized { .. } => "GE303",
            Self::CallbackDropped { .. } => "GE304",
            Self::QueueFull { .. } => "GE305",
            Self::QueueStopped => "GE306",
            Self::Compile { .. } => "GE401",
            Self::SummaryUnavailable { .. } => "GE402",
            Self::OptionsInvalid { .. } => "GE501",
            Self::Internal { .. } => "GE901",
        }
    }

    /// Map onto the external status vocabulary.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::GraphAlreadyExists { .. } => Status::AlreadyExists,
            Self::GraphNotExist { .. } => Status::GraphNotExist,
            Self::GraphNodeNull { .. } => Status::GraphNodeNull,
            Self::AlreadyRunning { .. } => Status::AlreadyRunning,
            Self::GraphIsRunning { .. } => Status::GraphIsRunning,
            Self::NotBuilt { .. } | Self::NotLoaded { .. } => Status::NotBuilt,
            Self::InvalidParam { .. }
            | Self::NeedsRebuild { .. }
            | Self::InvalidMemoryBase { .. }
            | Self::MemoryTooSmall { .. } => Status::ParamInvalid,
            Self::RepeatOperation { .. } => Status::RepeatOperation,
            Self::MemoryUnsupported { .. } => Status::Unsupported,
            Self::ExecutionTimeout { .. } => Status::ExecutionTimeout,
            Self::CallbackDropped { .. } | Self::Internal { .. } => Status::InternalError,
            Self::OptionsInvalid { .. } => Status::OptionsInvalid,
            Self::NotInitialized
            | Self::Executor { .. }
            | Self::Finalized { .. }
            | Self::QueueFull { .. }
            | Self::QueueStopped
            | Self::Compile { .. }
            | Self::SummaryUnavailable { .. } => Status::Failed,
        }
    }

    /// The graph the error concerns, if any.
    #[must_use]
    pub fn graph_id(&self) -> Option<GraphId> {
        match self {
            Self::GraphAlreadyExists { graph_id }
            | Self::GraphNotExist { graph_id }
            | Self::GraphNodeNull { graph_id }
            | Self::AlreadyRunning { graph_id }
            | Self::GraphIsRunning { graph_id, .. }
            | Self::NotBuilt { graph_id, .. }
            | Self::NotLoaded { graph_id, .. }
            | Self::InvalidParam { graph_id, .. }
            | Self::NeedsRebuild { graph_id }
            | Self::RepeatOperation { graph_id, .. }
            | Self::MemoryUnsupported { graph_id, .. }
            | Self::InvalidMemoryBase { graph_id, .. }
            | Self::MemoryTooSmall { graph_id, .. }
            | Self::ExecutionTimeout { graph_id, .. }
            | Self::Executor { graph_id, .. }
            | Self::Finalized { graph_id }
            | Self::CallbackDropped { graph_id }
            | Self::Compile { graph_id, .. }
            | Self::SummaryUnavailable { graph_id, .. } => Some(*graph_id),
            Self::NotInitialized
            | Self::QueueFull { .. }
            | Self::QueueStopped
            | Self::OptionsInvalid { .. }
            | Self::Internal { .. } => None,
        }
    }

    /// Check if this error is a caller usage error (never retried).
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::GraphAlreadyExists { .. }
                | Self::GraphNotExist { .. }
                | Self::AlreadyRunning { .. }
                | Self::GraphIsRunning { .. }
                | Self::NotBuilt { .. }
                | Self::NotLoaded { .. }
                | Self::InvalidParam { .. }
                | Self::RepeatOperation { .. }
                | Self::MemoryUnsupported { .. }
                | Self::InvalidMemoryBase { .. }
                | Self::MemoryTooSmall { .. }
                | Self::OptionsInvalid { .. }
        )
    }

    /// Check if the caller may reasonably retry the same call later.
    ///
    /// The manager itself never retries.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning { .. }
                | Self::GraphIsRunning { .. }
                | Self::ExecutionTimeout { .. }
                | Self::QueueFull { .. }
        ) || matches!(
            self,
            Self::Executor {
                source: ExecutorError::QueueEmpty,
                ..
            }
        )
    }
}

/// Result type alias using `GeError`.
pub type Result<T> = std::result::Result<T, GeError>;

/// Extension trait for attaching graph context to collaborator errors.
pub trait ResultExt<T> {
    /// Wrap an executor error with the graph it concerns.
    fn for_graph(self, graph_id: GraphId) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, ExecutorError> {
    fn for_graph(self, graph_id: GraphId) -> Result<T> {
        self.map_err(|source| GeError::Executor { graph_id, source })
    }
}

impl<T> ResultExt<T> for std::result::Result<T, CompileError> {
    fn for_graph(self, graph_id: GraphId) -> Result<T> {
        self.map_err(|source| GeError::Compile { graph_id, source })
    }
}
