//! State shared between caller threads and the run worker.

use super::node::{GraphNode, NodeInner, RunGuard, RunKind};
use super::registry::GraphRegistry;
use crate::config::ManagerConfig;
use crate::metrics::ManagerMetrics;
use crate::pipeline::RunQueue;
use crate::rebuild::RebuildStateController;
use ge_core::error::{GeError, Result, ResultExt};
use ge_core::model::GeRootModel;
use ge_core::options::LoadOptions;
use ge_core::traits::{Executor, ExecutorError, GraphCompiler, LoadRequest, RunContext};
use ge_core::types::{GraphId, SessionId, StreamHandle, Tensor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Slice the worker waits for an earlier async run of the same graph before
/// rechecking shutdown.
const ASYNC_RUN_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Load requirement of a synchronous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunMode {
    /// Host-tensor run; an unloaded graph is loaded first.
    Batch,
    /// Stream run; the graph must already be loaded.
    Stream,
}

pub(crate) struct ManagerShared {
    pub(crate) config: ManagerConfig,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) compiler: Arc<dyn GraphCompiler>,
    pub(crate) registry: GraphRegistry,
    pub(crate) rebuild: RebuildStateController,
    pub(crate) metrics: Arc<ManagerMetrics>,
    pub(crate) queue: RunQueue,
    pub(crate) initialized: AtomicBool,
}

impl ManagerShared {
    pub(crate) fn new(
        config: ManagerConfig,
        executor: Arc<dyn Executor>,
        compiler: Arc<dyn GraphCompiler>,
    ) -> Self {
        let queue = RunQueue::new(config.run_queue_capacity);
        Self {
            config,
            executor,
            compiler,
            registry: GraphRegistry::new(),
            rebuild: RebuildStateController::new(),
            metrics: Arc::new(ManagerMetrics::default()),
            queue,
            initialized: AtomicBool::new(false),
        }
    }

    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(GeError::NotInitialized)
        }
    }

    pub(crate) fn node(&self, graph_id: GraphId) -> Result<Arc<GraphNode>> {
        self.registry
            .get(graph_id)
            .ok_or(GeError::GraphNotExist { graph_id })
    }

    pub(crate) fn timeout_for(&self, node: &GraphNode) -> Option<Duration> {
        node.options()
            .exec_timeout
            .or_else(|| self.config.default_exec_timeout())
    }

    /// Compile `node` unless it is compiled and unchanged.
    ///
    /// A failed compile leaves the node uncompiled.
    pub(crate) fn compile_locked(
        &self,
        node: &GraphNode,
        inner: &mut NodeInner,
        inputs: &[Tensor],
    ) -> Result<()> {
        let graph_id = node.id();
        let needs_rebuild = self.rebuild.needs_rebuild(graph_id);

        if inner.compiled_flag && !needs_rebuild {
            tracing::debug!(graph_id = %graph_id, "Graph already compiled");
            return Ok(());
        }

        if inner.compiled_flag {
            if inner.build_flag {
                tracing::warn!(
                    graph_id = %graph_id,
                    changed = ?self.rebuild.changed_resources(graph_id),
                    "Resources changed after build, graph must be removed and added again"
                );
                return Err(GeError::NeedsRebuild { graph_id });
            }
            tracing::info!(
                graph_id = %graph_id,
                changed = ?self.rebuild.changed_resources(graph_id),
                "Recompiling graph with changed resources"
            );
            if inner.load_flag {
                self.unload_locked(node, inner);
            }
            if !inner.memory.is_empty() {
                tracing::info!(
                    graph_id = %graph_id,
                    "Dropping memory bases recorded for the replaced artifact"
                );
            }
            inner.reset_compiled();
            self.metrics.record_rebuild();
        }

        match self.run_compile_stages(node, inputs) {
            Ok(model) => {
                inner.set_compiled(Arc::new(model));
                self.rebuild.clear(graph_id);
                self.metrics.record_compile(true);
                tracing::info!(graph_id = %graph_id, "Graph compiled");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_compile(false);
                tracing::error!(graph_id = %graph_id, error = %e, "Graph compile failed");
                Err(e)
            }
        }
    }

    fn run_compile_stages(&self, node: &GraphNode, inputs: &[Tensor]) -> Result<GeRootModel> {
        let graph_id = node.id();
        let graph = node.graph();
        let options = node.options();

        let mut subgraphs = self
            .compiler
            .partition(graph, inputs, options)
            .for_graph(graph_id)?;
        tracing::debug!(graph_id = %graph_id, subgraphs = subgraphs.len(), "Graph partitioned");

        for subgraph in &mut subgraphs {
            self.compiler
                .optimize(subgraph, options)
                .for_graph(graph_id)?;
        }
        self.compiler
            .select_kernels(&mut subgraphs, options)
            .for_graph(graph_id)?;

        let mut model = self
            .compiler
            .build_model(graph, subgraphs, options)
            .for_graph(graph_id)?;
        if options.has_dynamic_hint() || !graph.is_static_shape() {
            model.is_dynamic_shape = true;
        }
        Ok(model)
    }

    /// Load a compiled node onto the executor. Loaded nodes are left as is.
    pub(crate) fn load_locked(
        &self,
        node: &GraphNode,
        inner: &mut NodeInner,
        options: &LoadOptions,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        let graph_id = node.id();
        let model = inner.model(graph_id, "load")?;
        if inner.load_flag {
            tracing::debug!(graph_id = %graph_id, "Graph already loaded");
            return Ok(());
        }

        let graph = node.graph();
        for frozen in &options.frozen_inputs {
            let Some(input) = graph.input(frozen.index) else {
                return Err(GeError::InvalidParam {
                    graph_id,
                    cause: format!(
                        "frozen input index {} out of range, graph has {} inputs",
                        frozen.index,
                        graph.inputs().len()
                    ),
                });
            };
            if !input.desc.shape.is_static() {
                return Err(GeError::InvalidParam {
                    graph_id,
                    cause: format!(
                        "frozen input {} has dynamic shape {}",
                        frozen.index, input.desc.shape
                    ),
                });
            }
        }

        let request = LoadRequest {
            graph_id,
            const_memory: inner.memory.const_base(),
            feature_memory: inner.memory.bindings(),
            frozen_inputs: options.frozen_inputs.clone(),
            input_reuse_indexes: node.options().input_reuse_indexes.clone(),
            output_reuse_indexes: node.options().output_reuse_indexes.clone(),
        };
        self.executor
            .load_graph(&model, &request, stream)
            .for_graph(graph_id)?;

        inner.frozen_inputs = request.frozen_inputs;
        inner.stream = stream;
        inner.load_flag = true;
        tracing::info!(
            graph_id = %graph_id,
            stream = ?stream,
            frozen_inputs = inner.frozen_inputs.len(),
            "Graph loaded"
        );
        Ok(())
    }

    /// Unload a loaded node. Failures are logged.
    pub(crate) fn unload_locked(&self, node: &GraphNode, inner: &mut NodeInner) {
        let graph_id = node.id();
        if let Some(model) = inner.model.as_ref().filter(|_| inner.load_flag) {
            match self.executor.unload_graph(model, graph_id) {
                Ok(()) => tracing::debug!(graph_id = %graph_id, "Graph unloaded"),
                Err(e) => tracing::warn!(graph_id = %graph_id, error = %e, "Graph unload failed"),
            }
        }
        inner.load_flag = false;
        inner.stream = None;
    }

    /// Validate state and mark a node running for a synchronous run.
    pub(crate) fn begin_sync_run(
        &self,
        graph_id: GraphId,
        session_id: SessionId,
        mode: RunMode,
    ) -> Result<(RunContext, RunGuard)> {
        let node = self.node(graph_id)?;
        let mut inner = node.lock();

        if node.is_running() {
            self.metrics.record_already_running();
            return Err(GeError::AlreadyRunning { graph_id });
        }
        if !inner.compiled_flag {
            return Err(GeError::NotBuilt {
                graph_id,
                operation: "run",
            });
        }
        if !inner.load_flag {
            match mode {
                RunMode::Batch => {
                    self.load_locked(&node, &mut inner, &LoadOptions::default(), None)?
                }
                RunMode::Stream => {
                    return Err(GeError::NotLoaded {
                        graph_id,
                        operation: "run with stream",
                    });
                }
            }
        }

        let model = inner.model(graph_id, "run")?;
        let guard = node.begin_run(RunKind::Sync)?;
        let ctx = node.run_context(model, session_id, self.timeout_for(&node));
        Ok((ctx, guard))
    }

    /// Resolve, rebuild or load as needed and mark a node running for an async run.
    ///
    /// An earlier async run of the same graph is waited for; a synchronous run
    /// in flight rejects the request. A graph that was loaded before a rebuild
    /// is reloaded with the same stream and frozen inputs.
    pub(crate) fn prepare_async_run(
        &self,
        graph_id: GraphId,
        session_id: SessionId,
        inputs: &[Tensor],
    ) -> Result<(RunContext, RunGuard)> {
        let node = self
            .registry
            .get(graph_id)
            .ok_or(GeError::GraphNodeNull { graph_id })?;

        while !node.wait_async_run(ASYNC_RUN_WAIT_SLICE) {
            if !self.initialized.load(Ordering::Acquire) {
                break;
            }
            tracing::trace!(graph_id = %graph_id, "Waiting for previous async run");
        }
        if node.is_running() {
            self.metrics.record_already_running();
            return Err(GeError::AlreadyRunning { graph_id });
        }

        let mut inner = node.lock();
        let mut reload = None;
        if !inner.compiled_flag || self.rebuild.needs_rebuild(graph_id) {
            if inner.compiled_flag && !inner.build_flag && !inner.memory.is_empty() {
                tracing::warn!(
                    graph_id = %graph_id,
                    "Memory bases are set for the stale artifact, compile explicitly and set them again"
                );
                return Err(GeError::InvalidParam {
                    graph_id,
                    cause: "memory bases were set for an artifact that must be recompiled"
                        .to_string(),
                });
            }
            if inner.load_flag {
                reload = Some((
                    LoadOptions {
                        frozen_inputs: inner.frozen_inputs.clone(),
                    },
                    inner.stream,
                ));
            }
            self.compile_locked(&node, &mut inner, inputs)?;
        }
        if !inner.load_flag {
            let (options, stream) = reload.unwrap_or_default();
            self.load_locked(&node, &mut inner, &options, stream)?;
        }

        let model = inner.model(graph_id, "run")?;
        let guard = node
            .begin_run(RunKind::Async)
            .inspect_err(|_| self.metrics.record_already_running())?;
        let ctx = node.run_context(model, session_id, self.timeout_for(&node));
        Ok((ctx, guard))
    }
}

/// Map an executor run failure onto the manager error.
///
/// A device "queue empty" signal becomes an execution timeout only when the
/// caller set a non-zero timeout.
pub(crate) fn translate_run_error(
    graph_id: GraphId,
    timeout: Option<Duration>,
    source: ExecutorError,
) -> GeError {
    match (source, timeout) {
        (ExecutorError::QueueEmpty, Some(timeout)) if !timeout.is_zero() => {
            GeError::ExecutionTimeout {
                graph_id,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
        }
        (source, _) => GeError::Executor { graph_id, source },
    }
}
