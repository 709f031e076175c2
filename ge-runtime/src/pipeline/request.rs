//! Run requests and their completion sinks.

use crate::diagnostics::DiagnosticContext;
use crate::manager::RunGuard;
use ge_core::error::{GeError, Result};
use ge_core::types::{GraphId, SessionId, Tensor};
use std::fmt;
use tokio::sync::oneshot;

/// Callback invoked with the outcome of an async run.
pub type RunCallback = Box<dyn FnOnce(Result<Vec<Tensor>>) + Send + 'static>;

/// Completion sink of one async run request.
///
/// Resolved exactly once: either explicitly through [`resolve`](Self::resolve)
/// or, if dropped unresolved, with a `CallbackDropped` failure.
pub struct RunCompletion {
    graph_id: GraphId,
    callback: Option<RunCallback>,
    guard: Option<RunGuard>,
}

impl RunCompletion {
    /// A sink invoking `callback`.
    pub fn new<F>(graph_id: GraphId, callback: F) -> Self
    where
        F: FnOnce(Result<Vec<Tensor>>) + Send + 'static,
    {
        Self {
            graph_id,
            callback: Some(Box::new(callback)),
            guard: None,
        }
    }

    /// A sink paired with a receiver for its outcome.
    pub fn channel(graph_id: GraphId) -> (Self, oneshot::Receiver<Result<Vec<Tensor>>>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self::new(graph_id, move |result| {
            // The receiver may have given up waiting.
            let _ = tx.send(result);
        });
        (sink, rx)
    }

    /// The graph the request targets.
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// Hold the run guard until the outcome is delivered.
    pub(crate) fn attach_guard(&mut self, guard: RunGuard) {
        self.guard = Some(guard);
    }

    /// Deliver the outcome.
    pub fn resolve(mut self, result: Result<Vec<Tensor>>) {
        self.fire(result);
    }

    fn fire(&mut self, result: Result<Vec<Tensor>>) {
        // The graph must be runnable again by the time the caller observes the outcome.
        drop(self.guard.take());
        if let Some(callback) = self.callback.take() {
            if let Err(e) = &result {
                tracing::debug!(graph_id = %self.graph_id, error = %e, "Async run failed");
            }
            callback(result);
        }
    }
}

impl Drop for RunCompletion {
    fn drop(&mut self) {
        if self.callback.is_some() {
            tracing::error!(graph_id = %self.graph_id, "Run completion dropped unresolved");
            let graph_id = self.graph_id;
            self.fire(Err(GeError::CallbackDropped { graph_id }));
        }
    }
}

impl fmt::Debug for RunCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunCompletion")
            .field("graph_id", &self.graph_id)
            .field("resolved", &self.callback.is_none())
            .finish()
    }
}

/// An async run request.
#[derive(Debug)]
pub struct RunRequest {
    /// Target graph.
    pub graph_id: GraphId,
    /// Issuing session.
    pub session_id: SessionId,
    /// Host inputs.
    pub inputs: Vec<Tensor>,
    /// Completion sink.
    pub completion: RunCompletion,
    /// Caller diagnostic context captured at enqueue.
    pub diagnostics: DiagnosticContext,
    /// Caller span captured at enqueue.
    pub span: tracing::Span,
}

impl RunRequest {
    /// Build a request, capturing the calling thread's diagnostic context and span.
    pub fn new(
        graph_id: GraphId,
        session_id: SessionId,
        inputs: Vec<Tensor>,
        completion: RunCompletion,
    ) -> Self {
        Self {
            graph_id,
            session_id,
            inputs,
            completion,
            diagnostics: DiagnosticContext::current(),
            span: tracing::Span::current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: &Arc<AtomicUsize>) -> RunCompletion {
        let calls = Arc::clone(calls);
        RunCompletion::new(GraphId::new(1), move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn resolve_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        counting(&calls).resolve(Ok(Vec::new()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_fires_callback_dropped() {
        let (sink, mut rx) = RunCompletion::channel(GraphId::new(5));
        drop(sink);
        let result = rx.try_recv().unwrap();
        assert!(matches!(
            result,
            Err(GeError::CallbackDropped { graph_id }) if graph_id == GraphId::new(5)
        ));
    }

    #[test]
    fn request_captures_diagnostics() {
        DiagnosticContext::set_work_stream_id(Some(42));
        let (sink, _rx) = RunCompletion::channel(GraphId::new(1));
        let request = RunRequest::new(GraphId::new(1), SessionId::new(0), Vec::new(), sink);
        assert_eq!(request.diagnostics.work_stream_id, Some(42));
        DiagnosticContext::clear();
        request.completion.resolve(Ok(Vec::new()));
    }
}
