//! Caller diagnostic context.
//!
//! Callers attach a work-stream id and free-form tags to their thread. The
//! async pipeline captures the context at enqueue and reinstates it on the
//! worker thread while the request is processed, so log lines emitted on the
//! worker carry the submitting caller's identity.

use std::cell::RefCell;
use std::collections::BTreeMap;

thread_local! {
    static CONTEXT: RefCell<DiagnosticContext> = RefCell::new(DiagnosticContext::default());
}

/// Per-thread diagnostic context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticContext {
    /// Caller work-stream identifier.
    pub work_stream_id: Option<u64>,
    /// Free-form tags.
    pub tags: BTreeMap<String, String>,
}

impl DiagnosticContext {
    /// Snapshot the calling thread's context.
    pub fn current() -> Self {
        CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Replace the calling thread's context.
    pub fn set_current(ctx: DiagnosticContext) {
        CONTEXT.with(|cell| *cell.borrow_mut() = ctx);
    }

    /// Set the work-stream id on the calling thread.
    pub fn set_work_stream_id(id: Option<u64>) {
        CONTEXT.with(|ctx| ctx.borrow_mut().work_stream_id = id);
    }

    /// Add a tag on the calling thread.
    pub fn set_tag(key: impl Into<String>, value: impl Into<String>) {
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().tags.insert(key.into(), value.into());
        });
    }

    /// Clear the calling thread's context.
    pub fn clear() {
        Self::set_current(Self::default());
    }

    /// Install this context on the calling thread until the guard drops.
    ///
    /// The previous context is restored on drop.
    pub fn enter(self) -> DiagnosticGuard {
        let previous = CONTEXT.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), self));
        DiagnosticGuard {
            previous: Some(previous),
        }
    }

    /// Tags rendered as `k=v` pairs for log fields.
    pub fn tags_field(&self) -> String {
        self.tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Restores the previous diagnostic context on drop.
#[must_use]
pub struct DiagnosticGuard {
    previous: Option<DiagnosticContext>,
}

impl Drop for DiagnosticGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            DiagnosticContext::set_current(previous);
        }
    }
}
