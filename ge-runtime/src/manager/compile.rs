//! Compile, build and load.

use super::GraphManager;
use ge_core::error::{GeError, Result};
use ge_core::options::LoadOptions;
use ge_core::types::{GraphId, StreamHandle, Tensor};
use std::collections::HashMap;
use tracing::instrument;

impl GraphManager {
    /// Compile a graph.
    ///
    /// A compiled, unchanged graph compiles to a cheap success. A graph whose
    /// tracked resources changed is recompiled, unless it was built, in which
    /// case it must be removed and added again.
    #[instrument(skip_all, fields(graph_id = %graph_id, inputs = inputs.len()))]
    pub fn compile_graph(&self, graph_id: GraphId, inputs: &[Tensor]) -> Result<()> {
        self.shared.ensure_initialized()?;
        let node = self.shared.node(graph_id)?;
        let mut inner = node.lock();
        if node.is_running() {
            return Err(GeError::GraphIsRunning {
                graph_id,
                operation: "compile",
            });
        }
        self.shared.compile_locked(&node, &mut inner, inputs)
    }

    /// Compile a graph and, unless `async_run` is set, load it.
    ///
    /// Graphs built for async runs are loaded by the run worker on their first
    /// request.
    #[instrument(skip_all, fields(graph_id = %graph_id))]
    pub fn build_graph(&self, graph_id: GraphId, inputs: &[Tensor], async_run: bool) -> Result<()> {
        self.build(graph_id, inputs, !async_run)
    }

    /// Compile a graph and mark it built without loading it.
    #[instrument(skip_all, fields(graph_id = %graph_id))]
    pub fn build_graph_without_load(&self, graph_id: GraphId, inputs: &[Tensor]) -> Result<()> {
        self.build(graph_id, inputs, false)
    }

    fn build(&self, graph_id: GraphId, inputs: &[Tensor], load: bool) -> Result<()> {
        self.shared.ensure_initialized()?;
        let node = self.shared.node(graph_id)?;
        let mut inner = node.lock();
        if node.is_running() {
            self.shared.metrics.record_already_running();
            return Err(GeError::AlreadyRunning { graph_id });
        }

        self.shared.compile_locked(&node, &mut inner, inputs)?;
        if load {
            self.shared
                .load_locked(&node, &mut inner, &LoadOptions::default(), None)?;
        }
        inner.build_flag = true;

        tracing::info!(graph_id = %graph_id, loaded = inner.load_flag, "Graph built");
        Ok(())
    }

    /// Load a compiled graph, optionally onto a caller-owned stream.
    ///
    /// Accepts `ge.exec.frozenInputIndexes` in `options`: each referenced
    /// input must exist and have a static shape.
    #[instrument(skip_all, fields(graph_id = %graph_id, stream = ?stream))]
    pub fn load_graph(
        &self,
        graph_id: GraphId,
        options: &HashMap<String, String>,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        self.shared.ensure_initialized()?;
        let options = LoadOptions::parse(options)?;
        let node = self.shared.node(graph_id)?;
        let mut inner = node.lock();
        if node.is_running() {
            return Err(GeError::GraphIsRunning {
                graph_id,
                operation: "load",
            });
        }
        self.shared.load_locked(&node, &mut inner, &options, stream)
    }
}
