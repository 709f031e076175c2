//! Common test utilities for integration tests.

#![allow(dead_code)]

use ge_core::prelude::*;
use ge_runtime::config::ManagerConfig;
use ge_runtime::manager::GraphManager;
use ge_runtime::testing::{MockExecutor, StubCompiler};
use std::collections::HashMap;
use std::sync::Arc;

pub const SESSION: SessionId = SessionId::new(0);

/// A manager wired to mock collaborators.
pub struct Harness {
    pub manager: GraphManager,
    pub executor: Arc<MockExecutor>,
    pub compiler: Arc<StubCompiler>,
}

impl Harness {
    /// Add `simple_graph` under `id`.
    pub fn add(&self, id: u32) {
        self.manager
            .add_graph(GraphId::new(id), simple_graph(&format!("g{id}")), &no_options())
            .unwrap();
    }

    /// Add and compile.
    pub fn compiled(&self, id: u32) {
        self.add(id);
        self.manager.compile_graph(GraphId::new(id), &[]).unwrap();
    }

    /// Add, compile and load.
    pub fn loaded(&self, id: u32) {
        self.compiled(id);
        self.manager
            .load_graph(GraphId::new(id), &no_options(), None)
            .unwrap();
    }
}

/// Attributes of the default test model.
pub fn static_attrs() -> ModelAttrs {
    ModelAttrs::new()
        .with_weight_size(512)
        .with_memory_size(1024)
        .with_streams(2, 1)
}

/// Initialized manager with default config and a static model.
pub fn harness() -> Harness {
    harness_with(
        ManagerConfig::default(),
        StubCompiler::new().with_attrs(static_attrs()),
    )
}

/// Initialized manager with the given config and compiler.
pub fn harness_with(config: ManagerConfig, compiler: StubCompiler) -> Harness {
    let executor = Arc::new(MockExecutor::new());
    let compiler = Arc::new(compiler);
    let manager = GraphManager::new(config, executor.clone(), compiler.clone());
    manager.initialize().unwrap();
    Harness {
        manager,
        executor,
        compiler,
    }
}

/// One static input, one output.
pub fn simple_graph(name: &str) -> ComputeGraph {
    ComputeGraph::new(name)
        .with_input("x", TensorDesc::new(vec![1, 4], DataType::Float32))
        .with_output(TensorDesc::new(vec![1, 4], DataType::Float32))
}

pub fn no_options() -> HashMap<String, String> {
    HashMap::new()
}

pub fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn gid(id: u32) -> GraphId {
    GraphId::new(id)
}

pub fn addr(a: u64) -> DeviceAddr {
    DeviceAddr::new(a)
}

pub fn input() -> Tensor {
    Tensor::zeroed(TensorDesc::new(vec![1, 4], DataType::Float32))
}
