//! Prelude for convenient imports.
//!
//! ```ignore
//! use ge_core::prelude::*;
//! ```

// Core types
pub use crate::types::{
    DataType, DeviceAddr, GraphId, MemoryBase, MemoryClass, MemoryKind, Mutability, SessionId,
    Shape, StreamHandle, Tensor, TensorDesc, TensorView,
};

// Error handling
pub use crate::error::{GeError, Result, ResultExt, Status};

// Graph and model
pub use crate::graph::{ComputeGraph, InputDesc};
pub use crate::model::{FeatureMemoryAttr, GeModel, GeRootModel, ModelAttrs, OpOffsets, StreamInfo};

// Options
pub use crate::options::{FrozenInput, GraphOptions, LoadOptions};

// Collaborators
pub use crate::traits::{
    CompileError, CompileStage, Executor, ExecutorError, ExecutorResult, GraphCompiler,
    LoadRequest, RunArgs, RunContext, RunDone, Subgraph,
};
