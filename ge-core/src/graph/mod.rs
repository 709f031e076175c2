//! Opaque handle to a caller's computation graph.
//!
//! The graph IR itself (node and edge storage, attribute maps) belongs to the
//! model importers. The manager only needs what its lifecycle rules consult:
//! the graph inputs and their declared shapes, the declared outputs, and the
//! names of the variable resources the graph reads.

use crate::types::TensorDesc;
use serde::{Deserialize, Serialize};

/// A graph input (`Data` node) with its declared descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDesc {
    /// Node name.
    pub name: String,
    /// Position of the input in the graph signature.
    pub index: usize,
    /// Declared shape and type.
    pub desc: TensorDesc,
}

/// The caller's computation graph, as seen by the lifecycle manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeGraph {
    name: String,
    inputs: Vec<InputDesc>,
    outputs: Vec<TensorDesc>,
    variables: Vec<String>,
}

impl ComputeGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append an input; its index is its position.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, desc: TensorDesc) -> Self {
        let index = self.inputs.len();
        self.inputs.push(InputDesc {
            name: name.into(),
            index,
            desc,
        });
        self
    }

    /// Append a declared output.
    #[must_use]
    pub fn with_output(mut self, desc: TensorDesc) -> Self {
        self.outputs.push(desc);
        self
    }

    /// Declare a variable resource read by the graph.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(name.into());
        self
    }

    /// Graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Graph inputs in index order.
    #[must_use]
    pub fn inputs(&self) -> &[InputDesc] {
        &self.inputs
    }

    /// Look up an input by index.
    #[must_use]
    pub fn input(&self, index: usize) -> Option<&InputDesc> {
        self.inputs.get(index)
    }

    /// Declared outputs.
    #[must_use]
    pub fn outputs(&self) -> &[TensorDesc] {
        &self.outputs
    }

    /// Variable resources the graph depends on.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Whether every input shape is fully static.
    #[must_use]
    pub fn is_static_shape(&self) -> bool {
        self.inputs.iter().all(|i| i.desc.shape.is_static())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn inputs_are_indexed_in_order() {
        let graph = ComputeGraph::new("g")
            .with_input("x", TensorDesc::new(vec![1, 4], DataType::Float32))
            .with_input("y", TensorDesc::new(vec![-1, 4], DataType::Float32));

        assert_eq!(graph.input(1).map(|i| i.name.as_str()), Some("y"));
        assert_eq!(graph.input(1).map(|i| i.index), Some(1));
        assert!(!graph.is_static_shape());
    }
}
