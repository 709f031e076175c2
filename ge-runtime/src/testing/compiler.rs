//! Stub graph compiler.

use ge_core::graph::ComputeGraph;
use ge_core::model::{GeModel, GeRootModel, ModelAttrs, OpOffsets, StreamInfo};
use ge_core::options::GraphOptions;
use ge_core::traits::{CompileError, CompileStage, GraphCompiler, Subgraph};
use ge_core::types::Tensor;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Default)]
struct ModelTemplate {
    attrs: ModelAttrs,
    dynamic: bool,
    data_ops: Vec<OpOffsets>,
    net_output: Option<OpOffsets>,
    streams: Vec<StreamInfo>,
    submodels: Vec<GeModel>,
}

/// Compiler double producing a configurable model.
///
/// Every stage succeeds unless a failure was scripted for it.
#[derive(Debug, Default)]
pub struct StubCompiler {
    template: Mutex<ModelTemplate>,
    failures: Mutex<HashMap<CompileStage, VecDeque<String>>>,
    builds: AtomicUsize,
}

impl StubCompiler {
    /// Create a compiler producing an empty static model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `attrs` for the root model.
    pub fn with_attrs(self, attrs: ModelAttrs) -> Self {
        self.template.lock().attrs = attrs;
        self
    }

    /// Mark produced models dynamic-shaped.
    pub fn with_dynamic_shape(self, dynamic: bool) -> Self {
        self.template.lock().dynamic = dynamic;
        self
    }

    /// Set data-op and net-output offsets of the root model.
    pub fn with_io_offsets(self, data_ops: Vec<OpOffsets>, net_output: Option<OpOffsets>) -> Self {
        {
            let mut template = self.template.lock();
            template.data_ops = data_ops;
            template.net_output = net_output;
        }
        self
    }

    /// Set the stream allocation of the root model.
    pub fn with_streams(self, streams: Vec<StreamInfo>) -> Self {
        self.template.lock().streams = streams;
        self
    }

    /// Append a submodel.
    pub fn with_submodel(self, model: GeModel) -> Self {
        self.template.lock().submodels.push(model);
        self
    }

    /// Replace the root attributes for later compiles.
    pub fn set_attrs(&self, attrs: ModelAttrs) {
        self.template.lock().attrs = attrs;
    }

    /// Fail the next run of `stage`.
    pub fn fail_next(&self, stage: CompileStage, cause: impl Into<String>) {
        self.failures
            .lock()
            .entry(stage)
            .or_default()
            .push_back(cause.into());
    }

    /// Models built so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn scripted(&self, stage: CompileStage) -> Result<(), CompileError> {
        match self
            .failures
            .lock()
            .get_mut(&stage)
            .and_then(VecDeque::pop_front)
        {
            Some(cause) => Err(CompileError::new(stage, cause)),
            None => Ok(()),
        }
    }
}

impl GraphCompiler for StubCompiler {
    fn partition(
        &self,
        graph: &ComputeGraph,
        _inputs: &[Tensor],
        _options: &GraphOptions,
    ) -> Result<Vec<Subgraph>, CompileError> {
        self.scripted(CompileStage::Partition)?;
        Ok(vec![Subgraph::new(
            format!("{}_partition_0", graph.name()),
            "AIcoreEngine",
            graph.inputs().len() + graph.outputs().len(),
        )])
    }

    fn optimize(
        &self,
        _subgraph: &mut Subgraph,
        _options: &GraphOptions,
    ) -> Result<(), CompileError> {
        self.scripted(CompileStage::Optimize)
    }

    fn select_kernels(
        &self,
        subgraphs: &mut [Subgraph],
        _options: &GraphOptions,
    ) -> Result<(), CompileError> {
        self.scripted(CompileStage::KernelSelect)?;
        for subgraph in subgraphs {
            subgraph.kernels_selected = true;
        }
        Ok(())
    }

    fn build_model(
        &self,
        graph: &ComputeGraph,
        subgraphs: Vec<Subgraph>,
        _options: &GraphOptions,
    ) -> Result<GeRootModel, CompileError> {
        self.scripted(CompileStage::ModelBuild)?;
        if let Some(pending) = subgraphs.iter().find(|s| !s.kernels_selected) {
            return Err(CompileError::new(
                CompileStage::ModelBuild,
                format!("subgraph {} has no kernels selected", pending.name),
            ));
        }

        let template = self.template.lock().clone();
        let mut root = GeModel::new(graph.name(), template.attrs);
        root.outputs = graph.outputs().to_vec();
        root.data_ops = template.data_ops;
        root.net_output = template.net_output;
        root.streams = template.streams;

        let model = template
            .submodels
            .into_iter()
            .fold(GeRootModel::new(root), GeRootModel::with_submodel)
            .with_dynamic_shape(template.dynamic);

        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(model)
    }
}
