//! Scriptable collaborator doubles for exercising the manager without a
//! device or a real compiler.
//!
//! # Example
//!
//! ```ignore
//! use ge_runtime::testing::{MockExecutor, StubCompiler};
//!
//! let executor = Arc::new(MockExecutor::new());
//! let compiler = Arc::new(StubCompiler::new().with_attrs(
//!     ModelAttrs::new().with_weight_size(512).with_memory_size(1024),
//! ));
//! let manager = GraphManager::new(ManagerConfig::default(), executor.clone(), compiler);
//! ```

mod compiler;
mod executor;

pub use compiler::StubCompiler;
pub use executor::{ExecutorCall, ExecutorOp, MockExecutor, RunGate};
