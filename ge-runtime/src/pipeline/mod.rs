//! Asynchronous execution pipeline.
//!
//! Callers enqueue [`RunRequest`]s; a single background worker pops them in
//! submission order, prepares the graph (rebuild, compile and load as needed),
//! marks it running and dispatches the run to the executor. Each request's
//! [`RunCompletion`] is resolved exactly once on every path, including
//! rejections before dispatch and shutdown.

mod queue;
mod request;
pub(crate) mod worker;

pub use queue::{QueueRejection, RunQueue};
pub use request::{RunCallback, RunCompletion, RunRequest};
