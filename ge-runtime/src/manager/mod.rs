//! Graph lifecycle and execution manager.
//!
//! [`GraphManager`] owns every registered graph's state machine:
//!
//! ```text
//! Added -> Compiled -> Built -> Loaded
//! ```
//!
//! with a transient running overlay entered only from a compiled state.
//! Per-graph state is serialized by a lock on the graph's node; operations on
//! different graphs proceed independently.
//!
//! # Example
//!
//! ```ignore
//! let manager = GraphManager::new(ManagerConfig::from_env(), executor, compiler);
//! manager.initialize()?;
//! manager.add_graph(GraphId::new(1), graph, &HashMap::new())?;
//! manager.build_graph(GraphId::new(1), &[], false)?;
//! let outputs = manager.run_graph(GraphId::new(1), SessionId::new(0), &inputs)?;
//! manager.finalize()?;
//! ```

mod compile;
mod execute;
mod memory;
mod node;
mod registry;
pub(crate) mod shared;

pub use node::{GraphNode, GraphState, GraphStatus, RunGuard};

use crate::config::ManagerConfig;
use crate::metrics::ManagerMetrics;
use crate::pipeline::worker;
use crate::summary::CompiledGraphSummary;
use ge_core::error::{GeError, Result};
use ge_core::graph::ComputeGraph;
use ge_core::options::GraphOptions;
use ge_core::traits::{Executor, GraphCompiler};
use ge_core::types::GraphId;
use parking_lot::Mutex;
use registry::RemoveOutcome;
use shared::ManagerShared;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::instrument;

/// How long `finalize` waits for an in-flight run before leaving its graph loaded.
const FINALIZE_RUN_WAIT: Duration = Duration::from_secs(1);

/// Owns the registered graphs and the async run worker.
pub struct GraphManager {
    shared: Arc<ManagerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GraphManager {
    /// Create an uninitialized manager.
    pub fn new(
        config: ManagerConfig,
        executor: Arc<dyn Executor>,
        compiler: Arc<dyn GraphCompiler>,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared::new(config, executor, compiler)),
            worker: Mutex::new(None),
        }
    }

    /// Start the async run worker. Calling it again is a no-op.
    pub fn initialize(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if self.shared.initialized.load(Ordering::Acquire) {
            tracing::debug!("Graph manager already initialized");
            return Ok(());
        }

        self.shared.queue.reopen();
        *worker = Some(worker::spawn(Arc::clone(&self.shared))?);
        self.shared.initialized.store(true, Ordering::Release);

        tracing::info!(
            queue_capacity = self.shared.queue.capacity(),
            legacy_run_args = self.shared.config.use_legacy_run_args,
            "Graph manager initialized"
        );
        Ok(())
    }

    /// Stop the worker, fail queued requests, unload and forget every graph.
    ///
    /// A graph whose run does not finish within a short grace period is
    /// forgotten without being unloaded.
    pub fn finalize(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if !self.shared.initialized.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.shared.queue.stop();
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::error!("Run worker panicked");
            }
        }

        let pending = self.shared.queue.drain();
        if !pending.is_empty() {
            tracing::warn!(pending = pending.len(), "Discarding queued run requests");
        }
        for request in pending {
            let graph_id = request.graph_id;
            request
                .completion
                .resolve(Err(GeError::Finalized { graph_id }));
        }

        let nodes = self.shared.registry.drain();
        for node in &nodes {
            let idle = node.wait_idle(FINALIZE_RUN_WAIT);
            let mut inner = node.lock();
            if !idle || node.is_running() {
                tracing::warn!(
                    graph_id = %node.id(),
                    "Graph still running at finalize, leaving it loaded"
                );
                continue;
            }
            if inner.load_flag {
                self.shared.unload_locked(node, &mut inner);
            }
        }
        self.shared.rebuild.reset();

        tracing::info!(graphs = nodes.len(), "Graph manager finalized");
        Ok(())
    }

    /// Whether `initialize` has run and `finalize` has not.
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    /// The manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Manager counters.
    pub fn metrics(&self) -> &ManagerMetrics {
        &self.shared.metrics
    }

    /// Register a graph under `graph_id`.
    ///
    /// Options are parsed once here; an unparsable option rejects the graph.
    #[instrument(skip_all, fields(graph_id = %graph_id))]
    pub fn add_graph(
        &self,
        graph_id: GraphId,
        graph: ComputeGraph,
        options: &HashMap<String, String>,
    ) -> Result<()> {
        self.shared.ensure_initialized()?;
        let options = GraphOptions::parse(options)?;
        self.add_graph_with_options(graph_id, graph, options)
    }

    /// Register a graph with already parsed options.
    pub fn add_graph_with_options(
        &self,
        graph_id: GraphId,
        graph: ComputeGraph,
        options: GraphOptions,
    ) -> Result<()> {
        self.shared.ensure_initialized()?;
        let variables = graph.variables().to_vec();
        let name = graph.name().to_string();

        self.shared
            .registry
            .insert(GraphNode::new(graph_id, graph, options))
            .inspect_err(|e| tracing::warn!(graph_id = %graph_id, error = %e, "Add rejected"))?;
        self.shared.rebuild.track(graph_id, variables);
        self.shared.metrics.record_graph_added();

        tracing::info!(graph_id = %graph_id, graph = %name, "Graph added");
        Ok(())
    }

    /// Remove a graph, unloading it if loaded.
    ///
    /// Forks of the graph are unaffected.
    #[instrument(skip_all, fields(graph_id = %graph_id))]
    pub fn remove_graph(&self, graph_id: GraphId) -> Result<()> {
        self.shared.ensure_initialized()?;
        let allow_running = self.shared.config.allow_remove_while_running;

        let node = match self.shared.registry.remove(graph_id, allow_running) {
            RemoveOutcome::Removed(node) => node,
            RemoveOutcome::Running => {
                tracing::warn!(graph_id = %graph_id, "Cannot remove running graph");
                return Err(GeError::GraphIsRunning {
                    graph_id,
                    operation: "remove",
                });
            }
            RemoveOutcome::Missing => return Err(GeError::GraphNotExist { graph_id }),
        };

        if node.is_running() {
            tracing::warn!(graph_id = %graph_id, "Removing graph while it is running");
        }
        self.shared.rebuild.remove_graph(graph_id);
        {
            let mut inner = node.lock();
            if inner.load_flag {
                self.shared.unload_locked(&node, &mut inner);
            }
        }
        self.shared.metrics.record_graph_removed();

        tracing::info!(graph_id = %graph_id, "Graph removed");
        Ok(())
    }

    /// Register `new_id` sharing the compiled artifact of `origin`.
    #[instrument(skip_all, fields(origin = %origin, graph_id = %new_id))]
    pub fn fork_graph(&self, origin: GraphId, new_id: GraphId) -> Result<()> {
        self.shared.ensure_initialized()?;
        let origin_node = self.shared.node(origin)?;
        let node = GraphNode::fork(new_id, &origin_node)?;
        let variables = node.graph().variables().to_vec();

        self.shared.registry.insert(node)?;
        self.shared.rebuild.track(new_id, variables);
        self.shared.metrics.record_graph_added();

        tracing::info!(origin = %origin, graph_id = %new_id, "Graph forked");
        Ok(())
    }

    /// Summary of a compiled graph, computed on first query.
    pub fn compiled_graph_summary(&self, graph_id: GraphId) -> Result<Arc<CompiledGraphSummary>> {
        self.shared.ensure_initialized()?;
        let node = self.shared.node(graph_id)?;
        let refreshable = node.options().feature_base_refreshable;
        node.lock().summary(graph_id, refreshable)
    }

    /// Record an external write to `resource`.
    ///
    /// Returns the graphs that now need rebuilding.
    pub fn mark_resource_changed(&self, resource: &str) -> Vec<GraphId> {
        self.shared.rebuild.mark_changed(resource)
    }

    /// Whether `graph_id` has pending resource changes.
    pub fn needs_rebuild(&self, graph_id: GraphId) -> bool {
        self.shared.rebuild.needs_rebuild(graph_id)
    }

    /// Lifecycle state of a graph.
    pub fn graph_state(&self, graph_id: GraphId) -> Result<GraphStatus> {
        Ok(self.shared.node(graph_id)?.status())
    }

    /// Registered graph ids, sorted.
    pub fn graph_ids(&self) -> Vec<GraphId> {
        self.shared.registry.ids()
    }

    /// Whether `graph_id` is registered.
    pub fn contains(&self, graph_id: GraphId) -> bool {
        self.shared.registry.contains(graph_id)
    }

    /// Number of registered graphs.
    pub fn graph_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Pending async run requests.
    pub fn pending_runs(&self) -> usize {
        self.shared.queue.len()
    }
}

impl Drop for GraphManager {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::error!(error = %e, "Graph manager finalize failed on drop");
        }
    }
}

impl std::fmt::Debug for GraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphManager")
            .field("initialized", &self.is_initialized())
            .field("graphs", &self.graph_count())
            .field("queue", &self.shared.queue)
            .finish()
    }
}
