//! The executor collaborator: the component that performs device loads and runs.
//!
//! The manager never talks to the driver directly. Every device-facing call
//! goes through an [`Executor`], which returns a typed status and never
//! retries internally.

use crate::model::GeRootModel;
use crate::options::FrozenInput;
use crate::types::{
    DeviceAddr, GraphId, MemoryBase, MemoryClass, Mutability, SessionId, StreamHandle, Tensor,
    TensorView,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The device has no result available yet.
    ///
    /// Transient; the manager translates it into an execution timeout only
    /// when the caller supplied a non-zero timeout.
    #[error("device queue empty: no result available yet")]
    QueueEmpty,

    /// The model is not loaded on the executor.
    #[error("model for {graph_id} is not loaded")]
    ModelNotLoaded {
        /// The graph identifier.
        graph_id: GraphId,
    },

    /// A device call failed.
    #[error("device call '{call}' failed with code {code}: {message}")]
    Device {
        /// Name of the failing call.
        call: &'static str,
        /// Driver status code.
        code: u32,
        /// Driver message.
        message: String,
    },
}

/// Result type for executor calls.
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;

/// A feature-memory base bound at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMemoryBinding {
    /// Memory class.
    pub class: MemoryClass,
    /// Fixed or refreshable.
    pub mutability: Mutability,
    /// Caller-supplied base.
    pub base: MemoryBase,
}

/// Per-graph state the executor needs to load a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRequest {
    /// The graph identifier.
    pub graph_id: GraphId,
    /// Caller-supplied constant-weight memory.
    pub const_memory: Option<MemoryBase>,
    /// Caller-supplied feature memory.
    pub feature_memory: Vec<FeatureMemoryBinding>,
    /// Inputs bound to caller buffers for every run.
    pub frozen_inputs: Vec<FrozenInput>,
    /// Inputs whose memory the model may reuse.
    pub input_reuse_indexes: Vec<usize>,
    /// Outputs whose memory the model may reuse.
    pub output_reuse_indexes: Vec<usize>,
}

/// Identifies the loaded model a run targets.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The graph identifier.
    pub graph_id: GraphId,
    /// The issuing session.
    pub session_id: SessionId,
    /// The compiled artifact.
    pub model: Arc<GeRootModel>,
    /// The caller's execution timeout, if any.
    pub timeout: Option<Duration>,
}

/// Completion handed to the executor with asynchronously dispatched work.
///
/// Must be invoked exactly once.
pub type RunDone = Box<dyn FnOnce(ExecutorResult<Vec<Tensor>>) + Send + 'static>;

/// Arguments for an asynchronously dispatched run.
pub enum RunArgs {
    /// Legacy shape: the executor resolves the model by graph id.
    Legacy {
        /// The graph identifier.
        graph_id: GraphId,
        /// The issuing session.
        session_id: SessionId,
        /// Host inputs.
        inputs: Vec<Tensor>,
        /// Completion.
        done: RunDone,
    },
    /// Current shape: the model travels with the request.
    Current {
        /// Run target.
        ctx: RunContext,
        /// Host inputs.
        inputs: Vec<Tensor>,
        /// Completion.
        done: RunDone,
    },
}

impl RunArgs {
    /// The targeted graph.
    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        match self {
            Self::Legacy { graph_id, .. } => *graph_id,
            Self::Current { ctx, .. } => ctx.graph_id,
        }
    }

    /// Split into inputs and completion, discarding the target.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Tensor>, RunDone) {
        match self {
            Self::Legacy { inputs, done, .. } | Self::Current { inputs, done, .. } => {
                (inputs, done)
            }
        }
    }
}

impl fmt::Debug for RunArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy {
                graph_id,
                session_id,
                inputs,
                ..
            } => f
                .debug_struct("Legacy")
                .field("graph_id", graph_id)
                .field("session_id", session_id)
                .field("inputs", &inputs.len())
                .finish_non_exhaustive(),
            Self::Current { ctx, inputs, .. } => f
                .debug_struct("Current")
                .field("graph_id", &ctx.graph_id)
                .field("session_id", &ctx.session_id)
                .field("inputs", &inputs.len())
                .finish_non_exhaustive(),
        }
    }
}

/// Device-facing collaborator.
///
/// # Implementation Notes
///
/// - All methods may block the calling thread for the duration of the device call
/// - `push_run_args` must invoke the request's `done` exactly once, possibly on
///   another thread
/// - Implementations must not retry internally
pub trait Executor: Send + Sync {
    /// Load a compiled model, optionally onto a caller-owned stream.
    fn load_graph(
        &self,
        model: &Arc<GeRootModel>,
        request: &LoadRequest,
        stream: Option<StreamHandle>,
    ) -> ExecutorResult<()>;

    /// Unload a previously loaded model.
    fn unload_graph(&self, model: &Arc<GeRootModel>, graph_id: GraphId) -> ExecutorResult<()>;

    /// Dispatch a run whose completion is reported through `done`.
    fn push_run_args(&self, args: RunArgs) -> ExecutorResult<()>;

    /// Run with host tensors and wait for the outputs.
    fn run_graph(&self, ctx: &RunContext, inputs: &[Tensor]) -> ExecutorResult<Vec<Tensor>>;

    /// Run on a caller stream and wait for the outputs.
    fn run_graph_with_stream(
        &self,
        ctx: &RunContext,
        stream: StreamHandle,
        inputs: &[Tensor],
    ) -> ExecutorResult<Vec<Tensor>>;

    /// Enqueue a run on a caller stream with device-resident tensors.
    fn execute_graph_with_stream_async(
        &self,
        ctx: &RunContext,
        stream: StreamHandle,
        inputs: &[TensorView],
        outputs: &[TensorView],
    ) -> ExecutorResult<()>;

    /// Rebind the refreshable feature memory of a loaded model.
    fn update_feature_memory_base(
        &self,
        ctx: &RunContext,
        addr: DeviceAddr,
        size: u64,
    ) -> ExecutorResult<()>;

    /// Notify the executor that a physical range was remapped.
    fn pa_remapped(
        &self,
        ctx: &RunContext,
        old_addr: DeviceAddr,
        new_addr: DeviceAddr,
        len: u64,
    ) -> ExecutorResult<()>;
}
