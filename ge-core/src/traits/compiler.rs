//! The compile collaborator: partitioning, per-engine optimization, kernel
//! selection and model building.
//!
//! The algorithms behind each stage belong to the kernel engines. The manager
//! only sequences the stages and guarantees that a failure at any stage leaves
//! the graph uncompiled.

use crate::graph::ComputeGraph;
use crate::model::GeRootModel;
use crate::options::GraphOptions;
use crate::types::Tensor;
use std::fmt;
use thiserror::Error;

/// A compile stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileStage {
    /// Split the graph into per-engine subgraphs.
    Partition,
    /// Run per-engine optimization passes on a subgraph.
    Optimize,
    /// Choose kernel candidates for every op.
    KernelSelect,
    /// Assemble the device-executable model.
    ModelBuild,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition => write!(f, "partition"),
            Self::Optimize => write!(f, "optimize"),
            Self::KernelSelect => write!(f, "kernel_select"),
            Self::ModelBuild => write!(f, "model_build"),
        }
    }
}

/// A compile stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} stage failed: {cause}")]
pub struct CompileError {
    /// The failing stage.
    pub stage: CompileStage,
    /// Reason reported by the engine.
    pub cause: String,
}

impl CompileError {
    /// Create a stage failure.
    pub fn new(stage: CompileStage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

/// A partitioned subgraph assigned to one kernel engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subgraph {
    /// Subgraph name.
    pub name: String,
    /// Engine that owns the subgraph.
    pub engine: String,
    /// Number of ops in the subgraph.
    pub op_count: usize,
    /// Whether kernels have been selected for every op.
    pub kernels_selected: bool,
}

impl Subgraph {
    /// Create a subgraph.
    pub fn new(name: impl Into<String>, engine: impl Into<String>, op_count: usize) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            op_count,
            kernels_selected: false,
        }
    }
}

/// Compile pipeline collaborator.
pub trait GraphCompiler: Send + Sync {
    /// Partition the graph into per-engine subgraphs.
    fn partition(
        &self,
        graph: &ComputeGraph,
        inputs: &[Tensor],
        options: &GraphOptions,
    ) -> Result<Vec<Subgraph>, CompileError>;

    /// Optimize one subgraph with its engine's passes.
    fn optimize(&self, subgraph: &mut Subgraph, options: &GraphOptions)
    -> Result<(), CompileError>;

    /// Select kernel candidates for every subgraph.
    fn select_kernels(
        &self,
        subgraphs: &mut [Subgraph],
        options: &GraphOptions,
    ) -> Result<(), CompileError>;

    /// Build the executable model from the optimized subgraphs.
    fn build_model(
        &self,
        graph: &ComputeGraph,
        subgraphs: Vec<Subgraph>,
        options: &GraphOptions,
    ) -> Result<GeRootModel, CompileError>;
}
