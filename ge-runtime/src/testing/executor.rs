//! Mock executor.

use ge_core::model::GeRootModel;
use ge_core::traits::{
    Executor, ExecutorError, ExecutorResult, LoadRequest, RunArgs, RunContext, RunDone,
};
use ge_core::types::{DeviceAddr, GraphId, StreamHandle, Tensor, TensorView};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Executor entry points, for scripting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorOp {
    /// `load_graph`.
    Load,
    /// `unload_graph`.
    Unload,
    /// `push_run_args` returning an error.
    PushRunArgs,
    /// The completion of an async run.
    AsyncRun,
    /// `run_graph`.
    RunGraph,
    /// `run_graph_with_stream`.
    RunWithStream,
    /// `execute_graph_with_stream_async`.
    ExecuteAsync,
    /// `update_feature_memory_base`.
    UpdateFeatureMemoryBase,
    /// `pa_remapped`.
    PaRemapped,
}

/// A recorded executor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    /// `load_graph`.
    Load {
        /// Target graph.
        graph_id: GraphId,
        /// Caller stream.
        stream: Option<StreamHandle>,
        /// The full load request.
        request: LoadRequest,
    },
    /// `unload_graph`.
    Unload {
        /// Target graph.
        graph_id: GraphId,
    },
    /// `push_run_args`.
    PushRunArgs {
        /// Target graph.
        graph_id: GraphId,
        /// Whether the legacy shape was used.
        legacy: bool,
    },
    /// `run_graph`.
    RunGraph {
        /// Target graph.
        graph_id: GraphId,
    },
    /// `run_graph_with_stream`.
    RunWithStream {
        /// Target graph.
        graph_id: GraphId,
        /// Caller stream.
        stream: StreamHandle,
    },
    /// `execute_graph_with_stream_async`.
    ExecuteAsync {
        /// Target graph.
        graph_id: GraphId,
        /// Caller stream.
        stream: StreamHandle,
    },
    /// `update_feature_memory_base`.
    UpdateFeatureMemoryBase {
        /// Target graph.
        graph_id: GraphId,
        /// New base address.
        addr: DeviceAddr,
        /// New base size.
        size: u64,
    },
    /// `pa_remapped`.
    PaRemapped {
        /// Target graph.
        graph_id: GraphId,
        /// Old address.
        old_addr: DeviceAddr,
        /// New address.
        new_addr: DeviceAddr,
        /// Remapped length.
        len: u64,
    },
}

impl ExecutorCall {
    /// The graph the call targeted.
    pub fn graph_id(&self) -> GraphId {
        match self {
            Self::Load { graph_id, .. }
            | Self::Unload { graph_id }
            | Self::PushRunArgs { graph_id, .. }
            | Self::RunGraph { graph_id }
            | Self::RunWithStream { graph_id, .. }
            | Self::ExecuteAsync { graph_id, .. }
            | Self::UpdateFeatureMemoryBase { graph_id, .. }
            | Self::PaRemapped { graph_id, .. } => *graph_id,
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    entered: usize,
}

/// Holds runs in flight until opened.
#[derive(Debug, Default)]
pub struct RunGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl RunGate {
    /// A closed gate.
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Release every held and future run.
    pub fn open(&self) {
        self.state.lock().open = true;
        self.cond.notify_all();
    }

    /// Runs that reached the gate so far.
    pub fn entered(&self) -> usize {
        self.state.lock().entered
    }

    /// Wait until `count` runs reached the gate. Returns `false` on timeout.
    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.entered < count {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.entered >= count;
            }
        }
        true
    }

    fn pass(&self) {
        let mut state = self.state.lock();
        state.entered += 1;
        self.cond.notify_all();
        while !state.open {
            self.cond.wait(&mut state);
        }
    }
}

/// Executor double that records calls and replays scripted failures.
///
/// Async runs complete on a separate thread, as a device callback would.
/// A configured [`RunGate`] holds loads, runs and async completions.
#[derive(Debug, Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<ExecutorCall>>,
    loaded: Mutex<HashMap<GraphId, Arc<GeRootModel>>>,
    failures: Mutex<HashMap<ExecutorOp, VecDeque<ExecutorError>>>,
    gate: Mutex<Option<Arc<RunGate>>>,
    drop_completions: AtomicBool,
}

impl MockExecutor {
    /// Create an executor that succeeds at everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: ExecutorOp, error: ExecutorError) {
        self.failures.lock().entry(op).or_default().push_back(error);
    }

    /// Report "queue empty" from the next call of `op`.
    pub fn queue_empty_next(&self, op: ExecutorOp) {
        self.fail_next(op, ExecutorError::QueueEmpty);
    }

    /// Hold runs at `gate` until it opens.
    pub fn set_gate(&self, gate: Arc<RunGate>) {
        *self.gate.lock() = Some(gate);
    }

    /// Drop async completions without invoking them.
    pub fn set_drop_completions(&self, drop: bool) {
        self.drop_completions.store(drop, Ordering::SeqCst);
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().clone()
    }

    /// Calls that targeted `graph_id`.
    pub fn calls_for(&self, graph_id: GraphId) -> Vec<ExecutorCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.graph_id() == graph_id)
            .cloned()
            .collect()
    }

    /// Whether `graph_id` is currently loaded.
    pub fn is_loaded(&self, graph_id: GraphId) -> bool {
        self.loaded.lock().contains_key(&graph_id)
    }

    /// The last load request for `graph_id`.
    pub fn last_load_request(&self, graph_id: GraphId) -> Option<LoadRequest> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            ExecutorCall::Load {
                graph_id: id,
                request,
                ..
            } if *id == graph_id => Some(request.clone()),
            _ => None,
        })
    }

    fn record(&self, call: ExecutorCall) {
        self.calls.lock().push(call);
    }

    fn scripted(&self, op: ExecutorOp) -> ExecutorResult<()> {
        match self.failures.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn hold(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.pass();
        }
    }

    fn outputs(model: &GeRootModel) -> Vec<Tensor> {
        model.root.outputs.iter().cloned().map(Tensor::zeroed).collect()
    }
}

impl Executor for MockExecutor {
    fn load_graph(
        &self,
        model: &Arc<GeRootModel>,
        request: &LoadRequest,
        stream: Option<StreamHandle>,
    ) -> ExecutorResult<()> {
        self.record(ExecutorCall::Load {
            graph_id: request.graph_id,
            stream,
            request: request.clone(),
        });
        self.hold();
        self.scripted(ExecutorOp::Load)?;
        self.loaded
            .lock()
            .insert(request.graph_id, Arc::clone(model));
        Ok(())
    }

    fn unload_graph(&self, _model: &Arc<GeRootModel>, graph_id: GraphId) -> ExecutorResult<()> {
        self.record(ExecutorCall::Unload { graph_id });
        self.scripted(ExecutorOp::Unload)?;
        self.loaded.lock().remove(&graph_id);
        Ok(())
    }

    fn push_run_args(&self, args: RunArgs) -> ExecutorResult<()> {
        let graph_id = args.graph_id();
        let legacy = matches!(args, RunArgs::Legacy { .. });
        self.record(ExecutorCall::PushRunArgs { graph_id, legacy });
        self.scripted(ExecutorOp::PushRunArgs)?;

        let model = match &args {
            RunArgs::Legacy { graph_id, .. } => self
                .loaded
                .lock()
                .get(graph_id)
                .cloned()
                .ok_or(ExecutorError::ModelNotLoaded {
                    graph_id: *graph_id,
                })?,
            RunArgs::Current { ctx, .. } => Arc::clone(&ctx.model),
        };
        let (_inputs, done): (Vec<Tensor>, RunDone) = args.into_parts();

        if self.drop_completions.load(Ordering::SeqCst) {
            drop(done);
            return Ok(());
        }

        let outcome = self.scripted(ExecutorOp::AsyncRun);
        let gate = self.gate.lock().clone();
        std::thread::spawn(move || {
            if let Some(gate) = gate {
                gate.pass();
            }
            done(outcome.map(|()| Self::outputs(&model)));
        });
        Ok(())
    }

    fn run_graph(&self, ctx: &RunContext, _inputs: &[Tensor]) -> ExecutorResult<Vec<Tensor>> {
        self.record(ExecutorCall::RunGraph {
            graph_id: ctx.graph_id,
        });
        self.hold();
        self.scripted(ExecutorOp::RunGraph)?;
        Ok(Self::outputs(&ctx.model))
    }

    fn run_graph_with_stream(
        &self,
        ctx: &RunContext,
        stream: StreamHandle,
        _inputs: &[Tensor],
    ) -> ExecutorResult<Vec<Tensor>> {
        self.record(ExecutorCall::RunWithStream {
            graph_id: ctx.graph_id,
            stream,
        });
        self.hold();
        self.scripted(ExecutorOp::RunWithStream)?;
        Ok(Self::outputs(&ctx.model))
    }

    fn execute_graph_with_stream_async(
        &self,
        ctx: &RunContext,
        stream: StreamHandle,
        _inputs: &[TensorView],
        _outputs: &[TensorView],
    ) -> ExecutorResult<()> {
        self.record(ExecutorCall::ExecuteAsync {
            graph_id: ctx.graph_id,
            stream,
        });
        self.hold();
        self.scripted(ExecutorOp::ExecuteAsync)
    }

    fn update_feature_memory_base(
        &self,
        ctx: &RunContext,
        addr: DeviceAddr,
        size: u64,
    ) -> ExecutorResult<()> {
        self.record(ExecutorCall::UpdateFeatureMemoryBase {
            graph_id: ctx.graph_id,
            addr,
            size,
        });
        self.scripted(ExecutorOp::UpdateFeatureMemoryBase)
    }

    fn pa_remapped(
        &self,
        ctx: &RunContext,
        old_addr: DeviceAddr,
        new_addr: DeviceAddr,
        len: u64,
    ) -> ExecutorResult<()> {
        self.record(ExecutorCall::PaRemapped {
            graph_id: ctx.graph_id,
            old_addr,
            new_addr,
            len,
        });
        self.scripted(ExecutorOp::PaRemapped)
    }
}
