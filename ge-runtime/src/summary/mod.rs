//! Compiled graph summary.
//!
//! A read-only view over a compiled artifact. Size and address fields are only
//! meaningful for statically shaped models and fail otherwise; structural
//! fields (stream and event counts, stream allocation) always answer.

use ge_core::error::{GeError, Result};
use ge_core::model::{GeRootModel, StreamInfo};
use ge_core::types::{DataType, GraphId, MemoryClass, Shape};
use std::sync::Arc;

/// Stream allocation of one model in the compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStreams {
    /// Model name.
    pub model_name: String,
    /// Streams allocated to the model.
    pub streams: Vec<StreamInfo>,
}

/// Feature-memory requirement of one memory class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMemoryInfo {
    /// Memory class.
    pub class: MemoryClass,
    /// Total feature-memory size.
    pub size: u64,
    /// Whether the class is bound through a refreshable base.
    pub refreshable: bool,
}

/// Summary of a compiled graph.
#[derive(Debug, Clone)]
pub struct CompiledGraphSummary {
    graph_id: GraphId,
    model: Arc<GeRootModel>,
    refreshable: bool,
}

impl CompiledGraphSummary {
    /// Build a summary over `model`.
    ///
    /// `refreshable` reflects the graph's feature-base refreshability option.
    pub fn new(graph_id: GraphId, model: Arc<GeRootModel>, refreshable: bool) -> Self {
        Self {
            graph_id,
            model,
            refreshable,
        }
    }

    /// The summarized graph.
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// Whether the model is statically shaped.
    pub fn is_static(&self) -> bool {
        !self.model.is_dynamic_shape
    }

    fn require_static(&self, field: &'static str) -> Result<()> {
        if self.is_static() {
            Ok(())
        } else {
            Err(GeError::SummaryUnavailable {
                graph_id: self.graph_id,
                field,
            })
        }
    }

    /// Constant-weight memory size.
    pub fn const_memory_size(&self) -> Result<u64> {
        self.require_static("const memory size")?;
        Ok(self.model.root.attrs.weight_size)
    }

    /// Feature-memory size of the default class.
    pub fn feature_memory_size(&self) -> Result<u64> {
        self.feature_memory_size_of(MemoryClass::Default)
    }

    /// Feature-memory size of `class`.
    pub fn feature_memory_size_of(&self, class: MemoryClass) -> Result<u64> {
        self.require_static("feature memory size")?;
        Ok(self.model.root.attrs.feature_memory(class).size)
    }

    /// Fixed portion of the feature memory of `class`.
    pub fn fixed_feature_memory_size(&self, class: MemoryClass) -> Result<u64> {
        self.require_static("fixed feature memory size")?;
        Ok(self.model.root.attrs.feature_memory(class).fixed_size)
    }

    /// Refreshable portion of the default-class feature memory.
    pub fn refreshable_feature_memory_size(&self) -> Result<u64> {
        self.require_static("refreshable feature memory size")?;
        Ok(self
            .model
            .root
            .attrs
            .feature_memory(MemoryClass::Default)
            .refreshable_size())
    }

    /// Per-class feature-memory sizes and refreshability.
    pub fn feature_memory_info(&self) -> Result<Vec<FeatureMemoryInfo>> {
        self.require_static("feature memory info")?;
        Ok(MemoryClass::ALL
            .iter()
            .map(|&class| FeatureMemoryInfo {
                class,
                size: self.model.root.attrs.feature_memory(class).size,
                refreshable: self.refreshable && class == MemoryClass::Default,
            })
            .collect())
    }

    /// Whether the default-class feature base may be refreshed.
    pub fn is_feature_memory_base_refreshable(&self) -> Result<bool> {
        self.require_static("feature memory refreshability")?;
        Ok(self.refreshable)
    }

    /// Streams over the root model and every submodel.
    pub fn stream_num(&self) -> u32 {
        self.model.models().map(|m| m.attrs.stream_num).sum()
    }

    /// Events over the root model and every submodel.
    pub fn event_num(&self) -> u32 {
        self.model.models().map(|m| m.attrs.event_num).sum()
    }

    /// Stream allocation per model, root first.
    pub fn stream_allocation(&self) -> Vec<ModelStreams> {
        self.model
            .models()
            .map(|m| ModelStreams {
                model_name: m.name.clone(),
                streams: m.streams.clone(),
            })
            .collect()
    }

    /// Output shapes of the root model.
    pub fn output_shapes(&self) -> Result<Vec<Shape>> {
        self.require_static("output shapes")?;
        Ok(self
            .model
            .root
            .outputs
            .iter()
            .map(|d| d.shape.clone())
            .collect())
    }

    /// Output data types of the root model.
    pub fn output_dtypes(&self) -> Result<Vec<DataType>> {
        self.require_static("output data types")?;
        Ok(self.model.root.outputs.iter().map(|d| d.dtype).collect())
    }

    /// `(input_index, output_index)` pairs sharing a device address.
    ///
    /// Compares each data op's output offset with the matching input offset
    /// of the net output. A missing net output or empty or misaligned offset
    /// lists yield an empty list.
    pub fn io_indexes_with_same_addr(&self) -> Result<Vec<(usize, usize)>> {
        self.require_static("io addresses")?;

        let root = &self.model.root;
        let Some(net_output) = &root.net_output else {
            tracing::debug!(graph_id = %self.graph_id, "No net output, no shared io addresses");
            return Ok(Vec::new());
        };
        if net_output.input_offsets.is_empty() {
            return Ok(Vec::new());
        }
        if net_output.input_offsets.len() != root.outputs.len() && !root.outputs.is_empty() {
            tracing::debug!(
                graph_id = %self.graph_id,
                offsets = net_output.input_offsets.len(),
                outputs = root.outputs.len(),
                "Net output offsets do not match outputs"
            );
            return Ok(Vec::new());
        }

        let mut pairs = Vec::new();
        for data in &root.data_ops {
            let Some(&offset) = data.output_offsets.first() else {
                continue;
            };
            for (output_index, &input_offset) in net_output.input_offsets.iter().enumerate() {
                if input_offset == offset {
                    pairs.push((data.index, output_index));
                }
            }
        }
        pairs.sort_unstable();
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ge_core::model::{GeModel, ModelAttrs, OpOffsets};
    use ge_core::types::TensorDesc;

    fn model(dynamic: bool) -> GeRootModel {
        let attrs = ModelAttrs::new()
            .with_weight_size(512)
            .with_memory_size(1024)
            .with_streams(2, 1);
        let mut root = GeModel::new("root", attrs);
        root.outputs = vec![TensorDesc::new(vec![1, 3], DataType::Float32)];
        root.data_ops = vec![OpOffsets::data("x", 0, 128)];
        root.net_output = Some(OpOffsets::net_output(vec![128]));

        let sub = GeModel::new("sub", ModelAttrs::new().with_streams(1, 3));
        GeRootModel::new(root)
            .with_submodel(sub)
            .with_dynamic_shape(dynamic)
    }

    fn summary(dynamic: bool) -> CompiledGraphSummary {
        CompiledGraphSummary::new(GraphId::new(1), Arc::new(model(dynamic)), true)
    }

    #[test]
    fn static_sizes() {
        let s = summary(false);
        assert_eq!(s.const_memory_size().unwrap(), 512);
        assert_eq!(s.feature_memory_size().unwrap(), 1024);
        assert_eq!(s.refreshable_feature_memory_size().unwrap(), 1024);
        assert_eq!(s.fixed_feature_memory_size(MemoryClass::P2p).unwrap(), 0);
        assert!(s.is_feature_memory_base_refreshable().unwrap());
    }

    #[test]
    fn dynamic_sizes_fail_but_counts_answer() {
        let s = summary(true);
        assert!(matches!(
            s.const_memory_size(),
            Err(GeError::SummaryUnavailable { .. })
        ));
        assert!(s.feature_memory_size().is_err());
        assert!(s.output_shapes().is_err());
        assert_eq!(s.stream_num(), 3);
        assert_eq!(s.event_num(), 4);
        assert_eq!(s.stream_allocation().len(), 2);
    }

    #[test]
    fn same_addr_detection() {
        assert_eq!(summary(false).io_indexes_with_same_addr().unwrap(), vec![(0, 0)]);

        let mut m = model(false);
        m.root.net_output = Some(OpOffsets::net_output(vec![256]));
        let s = CompiledGraphSummary::new(GraphId::new(1), Arc::new(m), true);
        assert!(s.io_indexes_with_same_addr().unwrap().is_empty());

        let mut m = model(false);
        m.root.net_output = Some(OpOffsets::net_output(Vec::new()));
        let s = CompiledGraphSummary::new(GraphId::new(1), Arc::new(m), true);
        assert!(s.io_indexes_with_same_addr().unwrap().is_empty());

        let mut m = model(false);
        m.root.net_output = None;
        let s = CompiledGraphSummary::new(GraphId::new(1), Arc::new(m), true);
        assert!(s.io_indexes_with_same_addr().unwrap().is_empty());
    }

    #[test]
    fn output_descriptors() {
        let s = summary(false);
        assert_eq!(s.output_shapes().unwrap(), vec![Shape::new(vec![1, 3])]);
        assert_eq!(s.output_dtypes().unwrap(), vec![DataType::Float32]);
    }
}
