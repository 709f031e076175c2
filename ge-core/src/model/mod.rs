//! The compiled artifact produced by a successful compile.
//!
//! A `GeRootModel` wraps the root `GeModel` plus one sub-model per partitioned
//! subgraph. The container's wire format is out of scope; only the attributes
//! the lifecycle manager reads are modelled here.

use crate::types::{MemoryClass, TensorDesc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature-memory requirement for one memory class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureMemoryAttr {
    /// Total feature memory of this class, in bytes.
    pub size: u64,
    /// Portion that must stay at a fixed address across runs.
    pub fixed_size: u64,
}

impl FeatureMemoryAttr {
    /// Portion that may be rebound between runs.
    #[must_use]
    pub fn refreshable_size(&self) -> u64 {
        self.size.saturating_sub(self.fixed_size)
    }
}

/// Model-level attributes recorded by the model builder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelAttrs {
    /// Constant-weight memory size.
    pub weight_size: u64,
    /// Feature memory per class.
    pub feature_memory: BTreeMap<MemoryClass, FeatureMemoryAttr>,
    /// Number of device streams the model uses.
    pub stream_num: u32,
    /// Number of device events the model uses.
    pub event_num: u32,
}

impl ModelAttrs {
    /// Empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight size.
    #[must_use]
    pub fn with_weight_size(mut self, size: u64) -> Self {
        self.weight_size = size;
        self
    }

    /// Set the default-class feature memory size.
    #[must_use]
    pub fn with_memory_size(self, size: u64) -> Self {
        self.with_feature_memory(MemoryClass::Default, size, 0)
    }

    /// Set the feature memory of a class.
    #[must_use]
    pub fn with_feature_memory(mut self, class: MemoryClass, size: u64, fixed_size: u64) -> Self {
        self.feature_memory
            .insert(class, FeatureMemoryAttr { size, fixed_size });
        self
    }

    /// Set stream and event counts.
    #[must_use]
    pub fn with_streams(mut self, stream_num: u32, event_num: u32) -> Self {
        self.stream_num = stream_num;
        self.event_num = event_num;
        self
    }

    /// Feature memory of a class; classes the model does not use report zero.
    #[must_use]
    pub fn feature_memory(&self, class: MemoryClass) -> FeatureMemoryAttr {
        self.feature_memory.get(&class).copied().unwrap_or_default()
    }
}

/// Address offsets assigned to one op's inputs and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpOffsets {
    /// Op name.
    pub name: String,
    /// For `Data` ops, the graph input index.
    pub index: usize,
    /// Input offsets in feature memory.
    pub input_offsets: Vec<i64>,
    /// Output offsets in feature memory.
    pub output_offsets: Vec<i64>,
}

impl OpOffsets {
    /// A `Data` op producing graph input `index` at `offset`.
    #[must_use]
    pub fn data(name: impl Into<String>, index: usize, offset: i64) -> Self {
        Self {
            name: name.into(),
            index,
            input_offsets: Vec::new(),
            output_offsets: vec![offset],
        }
    }

    /// A `NetOutput` op consuming graph outputs at `offsets`.
    #[must_use]
    pub fn net_output(offsets: Vec<i64>) -> Self {
        Self {
            name: "NetOutput".to_string(),
            index: 0,
            input_offsets: offsets,
            output_offsets: Vec::new(),
        }
    }
}

/// Stream allocation of one logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Logical stream id inside the model.
    pub logical_stream_id: i64,
    /// Physical streams attached to the logical stream.
    pub physical_stream_ids: Vec<i64>,
    /// Whether the stream-assignment pass assigned this stream.
    pub assigned_by_stream_pass: bool,
    /// Number of HCCL streams that follow this stream.
    pub hccl_followed_stream_num: usize,
}

/// One compiled (sub)model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeModel {
    /// Model (subgraph) name.
    pub name: String,
    /// Builder attributes.
    pub attrs: ModelAttrs,
    /// Offsets of the `Data` ops.
    pub data_ops: Vec<OpOffsets>,
    /// Offsets of the `NetOutput` op, if the model has one.
    pub net_output: Option<OpOffsets>,
    /// Stream allocation detail.
    pub streams: Vec<StreamInfo>,
    /// Output descriptors, in output order.
    pub outputs: Vec<TensorDesc>,
}

impl GeModel {
    /// Create a model with attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, attrs: ModelAttrs) -> Self {
        Self {
            name: name.into(),
            attrs,
            ..Self::default()
        }
    }
}

/// The device-executable result of a successful compile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeRootModel {
    /// Root model.
    pub root: GeModel,
    /// Sub-models of partitioned subgraphs.
    pub submodels: Vec<GeModel>,
    /// Whether any shape was unknown at compile time.
    pub is_dynamic_shape: bool,
}

impl GeRootModel {
    /// Wrap a root model.
    #[must_use]
    pub fn new(root: GeModel) -> Self {
        Self {
            root,
            submodels: Vec::new(),
            is_dynamic_shape: false,
        }
    }

    /// Add a sub-model.
    #[must_use]
    pub fn with_submodel(mut self, model: GeModel) -> Self {
        self.submodels.push(model);
        self
    }

    /// Mark the model as dynamic-shaped.
    #[must_use]
    pub fn with_dynamic_shape(mut self, dynamic: bool) -> Self {
        self.is_dynamic_shape = dynamic;
        self
    }

    /// Root model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// Root followed by every sub-model.
    pub fn models(&self) -> impl Iterator<Item = &GeModel> {
        std::iter::once(&self.root).chain(self.submodels.iter())
    }
}
