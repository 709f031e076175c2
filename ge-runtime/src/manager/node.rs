//! Per-graph state record.

use crate::memory::MemoryBaseTable;
use crate::summary::CompiledGraphSummary;
use ge_core::error::{GeError, Result};
use ge_core::graph::ComputeGraph;
use ge_core::model::GeRootModel;
use ge_core::options::{FrozenInput, GraphOptions};
use ge_core::traits::RunContext;
use ge_core::types::{GraphId, SessionId, StreamHandle};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Visible lifecycle state of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphState {
    /// Registered, not compiled.
    Added,
    /// Compiled.
    Compiled,
    /// Compiled through a build call.
    Built,
    /// Loaded onto the device.
    Loaded,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Compiled => write!(f, "compiled"),
            Self::Built => write!(f, "built"),
            Self::Loaded => write!(f, "loaded"),
        }
    }
}

/// Lifecycle state plus the transient running overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStatus {
    /// Lifecycle state.
    pub state: GraphState,
    /// Whether an execution is in flight.
    pub running: bool,
    /// Origin graph, for forks.
    pub origin_graph_id: Option<GraphId>,
}

/// Mutable state guarded by the node lock.
#[derive(Debug, Default)]
pub(crate) struct NodeInner {
    pub(crate) compiled_flag: bool,
    pub(crate) build_flag: bool,
    pub(crate) load_flag: bool,
    pub(crate) model: Option<Arc<GeRootModel>>,
    pub(crate) summary: Option<Arc<CompiledGraphSummary>>,
    pub(crate) memory: MemoryBaseTable,
    pub(crate) frozen_inputs: Vec<FrozenInput>,
    pub(crate) stream: Option<StreamHandle>,
}

impl NodeInner {
    pub(crate) fn state(&self) -> GraphState {
        if self.load_flag {
            GraphState::Loaded
        } else if self.build_flag {
            GraphState::Built
        } else if self.compiled_flag {
            GraphState::Compiled
        } else {
            GraphState::Added
        }
    }

    /// Install a freshly compiled artifact.
    pub(crate) fn set_compiled(&mut self, model: Arc<GeRootModel>) {
        self.model = Some(model);
        self.compiled_flag = true;
        self.summary = None;
    }

    /// Drop the compiled artifact and everything derived from it.
    ///
    /// Memory bases and load bindings were sized for the old artifact and go
    /// with it.
    pub(crate) fn reset_compiled(&mut self) {
        self.model = None;
        self.compiled_flag = false;
        self.build_flag = false;
        self.load_flag = false;
        self.summary = None;
        self.memory = MemoryBaseTable::default();
        self.frozen_inputs.clear();
        self.stream = None;
    }

    pub(crate) fn model(&self, graph_id: GraphId, operation: &'static str) -> Result<Arc<GeRootModel>> {
        match (&self.model, self.compiled_flag) {
            (Some(model), true) => Ok(Arc::clone(model)),
            _ => Err(GeError::NotBuilt {
                graph_id,
                operation,
            }),
        }
    }

    /// Summary of the compiled artifact, computed on first use.
    pub(crate) fn summary(
        &mut self,
        graph_id: GraphId,
        refreshable: bool,
    ) -> Result<Arc<CompiledGraphSummary>> {
        if let Some(summary) = &self.summary {
            return Ok(Arc::clone(summary));
        }
        let model = self.model(graph_id, "query compiled summary")?;
        let summary = Arc::new(CompiledGraphSummary::new(graph_id, model, refreshable));
        self.summary = Some(Arc::clone(&summary));
        Ok(summary)
    }
}

/// How a run was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunKind {
    /// A caller thread waits for the outcome.
    Sync,
    /// Dispatched by the run worker; finishes when the executor calls back.
    Async,
}

/// One registered graph.
pub struct GraphNode {
    id: GraphId,
    graph: Arc<ComputeGraph>,
    options: GraphOptions,
    origin_graph_id: Option<GraphId>,
    inner: Mutex<NodeInner>,
    running: AtomicBool,
    async_running: AtomicBool,
    // Flags are cleared under this lock so waiters cannot miss the wakeup.
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl GraphNode {
    pub(crate) fn new(id: GraphId, graph: ComputeGraph, options: GraphOptions) -> Self {
        Self {
            id,
            graph: Arc::new(graph),
            options,
            origin_graph_id: None,
            inner: Mutex::new(NodeInner::default()),
            running: AtomicBool::new(false),
            async_running: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        }
    }

    /// A node sharing `origin`'s graph and compiled artifact.
    ///
    /// The fork starts compiled, unloaded, with no memory bases.
    pub(crate) fn fork(id: GraphId, origin: &GraphNode) -> Result<Self> {
        let model = origin.lock().model(origin.id, "fork")?;
        let inner = NodeInner {
            compiled_flag: true,
            model: Some(model),
            ..NodeInner::default()
        };
        Ok(Self {
            id,
            graph: Arc::clone(&origin.graph),
            options: origin.options.clone(),
            origin_graph_id: Some(origin.id),
            inner: Mutex::new(inner),
            running: AtomicBool::new(false),
            async_running: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        })
    }

    /// Graph identifier.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// The graph IR handle.
    pub fn graph(&self) -> &Arc<ComputeGraph> {
        &self.graph
    }

    /// Options parsed at add time.
    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Origin graph, for forks.
    pub fn origin_graph_id(&self) -> Option<GraphId> {
        self.origin_graph_id
    }

    /// Whether an execution is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Current status.
    pub fn status(&self) -> GraphStatus {
        let state = self.lock().state();
        GraphStatus {
            state,
            running: self.is_running(),
            origin_graph_id: self.origin_graph_id,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.inner.lock()
    }

    /// Mark the node running. Call with the node lock held.
    pub(crate) fn begin_run(self: &Arc<Self>, kind: RunKind) -> Result<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GeError::AlreadyRunning { graph_id: self.id })?;
        if kind == RunKind::Async {
            self.async_running.store(true, Ordering::Release);
        }
        tracing::trace!(graph_id = %self.id, kind = ?kind, "Run started");
        Ok(RunGuard {
            node: Arc::clone(self),
            kind,
        })
    }

    /// Wait for an in-flight async run to complete.
    ///
    /// Returns `false` if it is still running after `timeout`.
    pub(crate) fn wait_async_run(&self, timeout: Duration) -> bool {
        self.wait_while(&self.async_running, timeout)
    }

    /// Wait for any in-flight run to complete.
    ///
    /// Returns `false` if one is still running after `timeout`.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        self.wait_while(&self.running, timeout)
    }

    fn wait_while(&self, flag: &AtomicBool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut lock = self.idle_lock.lock();
        while flag.load(Ordering::Acquire) {
            if self.idle.wait_until(&mut lock, deadline).timed_out() {
                return !flag.load(Ordering::Acquire);
            }
        }
        true
    }

    pub(crate) fn run_context(
        &self,
        model: Arc<GeRootModel>,
        session_id: SessionId,
        timeout: Option<Duration>,
    ) -> RunContext {
        RunContext {
            graph_id: self.id,
            session_id,
            model,
            timeout,
        }
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("graph", &self.graph.name())
            .field("origin_graph_id", &self.origin_graph_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Clears the running flag of a node on drop.
#[must_use]
pub struct RunGuard {
    node: Arc<GraphNode>,
    kind: RunKind,
}

impl RunGuard {
    /// The running graph.
    pub fn graph_id(&self) -> GraphId {
        self.node.id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        {
            let _idle = self.node.idle_lock.lock();
            if self.kind == RunKind::Async {
                self.node.async_running.store(false, Ordering::Release);
            }
            self.node.running.store(false, Ordering::Release);
        }
        self.node.idle.notify_all();
        tracing::trace!(graph_id = %self.node.id, "Run finished");
    }
}

impl fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunGuard")
            .field("graph_id", &self.node.id)
            .field("kind", &self.kind)
            .finish()
    }
}
