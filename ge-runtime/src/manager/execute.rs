//! Synchronous runs and async submission.

use super::GraphManager;
use super::shared::{RunMode, translate_run_error};
use crate::pipeline::{RunCompletion, RunRequest};
use ge_core::error::{GeError, Result, ResultExt};
use ge_core::types::{DeviceAddr, GraphId, SessionId, StreamHandle, Tensor, TensorView};
use tracing::instrument;

impl GraphManager {
    /// Run with host tensors and wait for the outputs.
    ///
    /// A compiled graph that is not loaded yet is loaded first.
    #[instrument(skip_all, fields(graph_id = %graph_id, session_id = %session_id))]
    pub fn run_graph(
        &self,
        graph_id: GraphId,
        session_id: SessionId,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>> {
        self.shared.ensure_initialized()?;
        let (ctx, _guard) = self
            .shared
            .begin_sync_run(graph_id, session_id, RunMode::Batch)?;

        self.shared.metrics.record_run_start();
        let result = self
            .shared
            .executor
            .run_graph(&ctx, inputs)
            .map_err(|e| translate_run_error(graph_id, ctx.timeout, e));
        self.finish_run(graph_id, result)
    }

    /// Run a loaded graph on a caller stream and wait for the outputs.
    #[instrument(skip_all, fields(graph_id = %graph_id, session_id = %session_id, stream = %stream))]
    pub fn run_graph_with_stream(
        &self,
        graph_id: GraphId,
        session_id: SessionId,
        stream: StreamHandle,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>> {
        self.shared.ensure_initialized()?;
        let (ctx, _guard) = self
            .shared
            .begin_sync_run(graph_id, session_id, RunMode::Stream)?;

        self.shared.metrics.record_run_start();
        let result = self
            .shared
            .executor
            .run_graph_with_stream(&ctx, stream, inputs)
            .map_err(|e| translate_run_error(graph_id, ctx.timeout, e));
        self.finish_run(graph_id, result)
    }

    /// Enqueue a run of a loaded graph on a caller stream.
    ///
    /// Returns once the executor accepted the work; the graph is marked
    /// running only for the duration of that call.
    #[instrument(
        skip_all,
        fields(graph_id = %graph_id, session_id = %session_id, stream = %stream)
    )]
    pub fn execute_graph_with_stream_async(
        &self,
        graph_id: GraphId,
        session_id: SessionId,
        stream: StreamHandle,
        inputs: &[TensorView],
        outputs: &[TensorView],
    ) -> Result<()> {
        self.shared.ensure_initialized()?;
        let (ctx, _guard) = self
            .shared
            .begin_sync_run(graph_id, session_id, RunMode::Stream)?;

        self.shared.metrics.record_run_start();
        let result = self
            .shared
            .executor
            .execute_graph_with_stream_async(&ctx, stream, inputs, outputs)
            .map_err(|e| translate_run_error(graph_id, ctx.timeout, e));
        self.finish_run(graph_id, result)
    }

    /// Submit a run to the background worker.
    ///
    /// `completion` is resolved exactly once. If the request cannot be
    /// queued it is resolved with the same error this call returns.
    #[instrument(skip_all, fields(graph_id = %graph_id, session_id = %session_id))]
    pub fn run_graph_async(
        &self,
        graph_id: GraphId,
        session_id: SessionId,
        inputs: Vec<Tensor>,
        completion: RunCompletion,
    ) -> Result<()> {
        if !self.is_initialized() {
            completion.resolve(Err(GeError::NotInitialized));
            return Err(GeError::NotInitialized);
        }

        let request = RunRequest::new(graph_id, session_id, inputs, completion);
        match self.shared.queue.push(request) {
            Ok(()) => {
                self.shared.metrics.record_enqueued();
                tracing::debug!(
                    graph_id = %graph_id,
                    pending = self.shared.queue.len(),
                    "Run request queued"
                );
                Ok(())
            }
            Err((rejection, request)) => {
                tracing::warn!(graph_id = %graph_id, rejection = ?rejection, "Run request refused");
                request.completion.resolve(Err(rejection.to_error()));
                Err(rejection.to_error())
            }
        }
    }

    /// Notify the executor that a physical range backing a loaded graph moved.
    #[instrument(skip_all, fields(graph_id = %graph_id))]
    pub fn pa_remapped(
        &self,
        graph_id: GraphId,
        old_addr: DeviceAddr,
        new_addr: DeviceAddr,
        len: u64,
    ) -> Result<()> {
        self.shared.ensure_initialized()?;
        let node = self.shared.node(graph_id)?;
        let inner = node.lock();
        if node.is_running() {
            return Err(GeError::GraphIsRunning {
                graph_id,
                operation: "remap physical address",
            });
        }
        if !inner.load_flag {
            return Err(GeError::NotLoaded {
                graph_id,
                operation: "remap physical address",
            });
        }

        let model = inner.model(graph_id, "remap physical address")?;
        let ctx = node.run_context(model, SessionId::default(), None);
        self.shared
            .executor
            .pa_remapped(&ctx, old_addr, new_addr, len)
            .for_graph(graph_id)?;

        tracing::debug!(graph_id = %graph_id, old = %old_addr, new = %new_addr, len, "Physical address remapped");
        Ok(())
    }

    fn finish_run<T>(&self, graph_id: GraphId, result: Result<T>) -> Result<T> {
        self.shared.metrics.record_run_finished(result.is_ok());
        if let Err(e) = &result {
            tracing::error!(graph_id = %graph_id, error = %e, "Run failed");
        }
        result
    }
}
