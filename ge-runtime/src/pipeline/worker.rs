//! The async run worker.

use super::request::{RunCompletion, RunRequest};
use crate::manager::shared::{ManagerShared, translate_run_error};
use ge_core::error::{GeError, Result};
use ge_core::traits::{RunArgs, RunDone};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Spawn the single consumer of the run queue.
pub(crate) fn spawn(shared: Arc<ManagerShared>) -> Result<JoinHandle<()>> {
    let name = shared.config.worker_thread_name.clone();
    std::thread::Builder::new()
        .name(name)
        .spawn(move || run_loop(&shared))
        .map_err(|e| GeError::Internal {
            cause: format!("failed to spawn run worker: {e}"),
        })
}

fn run_loop(shared: &Arc<ManagerShared>) {
    tracing::info!("Run worker started");
    while let Some(request) = shared.queue.pop() {
        process(shared, request);
    }
    tracing::info!("Run worker stopped");
}

/// Run one request. Every path resolves the request's completion.
fn process(shared: &Arc<ManagerShared>, request: RunRequest) {
    let RunRequest {
        graph_id,
        session_id,
        inputs,
        mut completion,
        diagnostics,
        span,
    } = request;

    let span = tracing::info_span!(
        parent: &span,
        "async_run",
        graph_id = %graph_id,
        session_id = %session_id,
        work_stream_id = ?diagnostics.work_stream_id,
        tags = %diagnostics.tags_field(),
    );
    let _entered = span.enter();
    let _diagnostics = diagnostics.enter();

    let (ctx, guard) = match shared.prepare_async_run(graph_id, session_id, &inputs) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::warn!(error = %e, "Async run rejected");
            completion.resolve(Err(e));
            return;
        }
    };
    completion.attach_guard(guard);
    shared.metrics.record_run_start();

    // Shared between the executor's completion and the dispatch-failure path;
    // whichever runs first resolves it.
    let slot = Arc::new(Mutex::new(Some(completion)));
    let timeout = ctx.timeout;
    let done: RunDone = {
        let slot = Arc::clone(&slot);
        let metrics = Arc::clone(&shared.metrics);
        Box::new(move |result| {
            let result = result.map_err(|e| translate_run_error(graph_id, timeout, e));
            metrics.record_run_finished(result.is_ok());
            let completion = slot.lock().take();
            if let Some(completion) = completion {
                completion.resolve(result);
            }
        })
    };

    let args = if shared.config.use_legacy_run_args {
        RunArgs::Legacy {
            graph_id,
            session_id,
            inputs,
            done,
        }
    } else {
        RunArgs::Current { ctx, inputs, done }
    };

    tracing::debug!(args = ?args, "Dispatching async run");
    if let Err(e) = shared.executor.push_run_args(args) {
        tracing::error!(error = %e, "Async run dispatch failed");
        let completion: Option<RunCompletion> = slot.lock().take();
        if let Some(completion) = completion {
            shared.metrics.record_run_finished(false);
            completion.resolve(Err(translate_run_error(graph_id, timeout, e)));
        }
    }
}
