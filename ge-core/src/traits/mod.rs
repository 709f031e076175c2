//! Collaborator contracts consumed by the lifecycle manager.
//!
//! - `Executor`: device load/run calls
//! - `GraphCompiler`: partition, optimize, kernel-select, model-build stages

mod compiler;
mod executor;

pub use compiler::{CompileError, CompileStage, GraphCompiler, Subgraph};
pub use executor::{
    Executor, ExecutorError, ExecutorResult, FeatureMemoryBinding, LoadRequest, RunArgs,
    RunContext, RunDone,
};
