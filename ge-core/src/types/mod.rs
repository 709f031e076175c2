//! Core types for GE.
//!
//! - `GraphId`, `SessionId`: caller-facing identifiers
//! - `StreamHandle`, `DeviceAddr`: opaque device resources, never owned here
//! - `Tensor`, `TensorView`: host and device tensors passed to the executor
//! - `MemoryClass`, `MemoryBase`: feature/const memory descriptors

mod ids;
mod memory;
mod tensor;

pub use ids::{DeviceAddr, GraphId, SessionId, StreamHandle};
pub use memory::{MemoryBase, MemoryClass, MemoryKind, Mutability};
pub use tensor::{DataType, Shape, Tensor, TensorDesc, TensorView};
