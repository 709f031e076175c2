//! GE Core Library
//!
//! Foundational types and collaborator contracts for the GE graph lifecycle
//! and execution manager.
//!
//! # Key Components
//!
//! - **Types**: graph/session identifiers, device handles, tensors, memory classes
//! - **Graph**: the opaque computation-graph handle the manager operates on
//! - **Model**: the compiled artifact and the attributes the manager reads from it
//! - **Options**: typed parsing of caller option maps
//! - **Traits**: the `Executor` and `GraphCompiler` collaborators
//! - **Error**: the error taxonomy and external status vocabulary

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod graph;
pub mod model;
pub mod options;
pub mod prelude;
pub mod traits;
pub mod types;

// Re-export key types at crate root for convenience
pub use error::{GeError, Result, Status};
pub use graph::ComputeGraph;
pub use model::{GeModel, GeRootModel, ModelAttrs};
pub use options::{GraphOptions, LoadOptions};
pub use traits::{Executor, GraphCompiler};
pub use types::{GraphId, SessionId, StreamHandle};
