//! Integration tests for compiled graph summaries.

mod common;

use common::{gid, harness, harness_with, options, simple_graph, static_attrs};
use ge_core::options::keys;
use ge_core::prelude::*;
use ge_runtime::config::ManagerConfig;
use ge_runtime::testing::StubCompiler;
use std::sync::Arc;

fn stream(logical: i64, physical: Vec<i64>) -> StreamInfo {
    StreamInfo {
        logical_stream_id: logical,
        physical_stream_ids: physical,
        assigned_by_stream_pass: true,
        hccl_followed_stream_num: 0,
    }
}

#[test]
fn static_summary_reports_model_sizes() {
    let h = harness();
    h.compiled(1);

    let summary = h.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(summary.is_static());
    assert_eq!(summary.const_memory_size().unwrap(), 512);
    assert_eq!(summary.feature_memory_size().unwrap(), 1024);
    assert_eq!(summary.refreshable_feature_memory_size().unwrap(), 1024);
    assert_eq!(
        summary.fixed_feature_memory_size(MemoryClass::Default).unwrap(),
        0
    );
    assert!(summary.is_feature_memory_base_refreshable().unwrap());
    assert_eq!(summary.stream_num(), 2);
    assert_eq!(summary.event_num(), 1);
    assert_eq!(
        summary.output_shapes().unwrap(),
        vec![Shape::new(vec![1, 4])]
    );
    assert_eq!(summary.output_dtypes().unwrap(), vec![DataType::Float32]);
}

#[test]
fn summary_reflects_refreshability_option() {
    let h = harness();
    h.manager
        .add_graph(
            gid(1),
            simple_graph("pinned"),
            &options(&[(keys::FEATURE_BASE_REFRESHABLE, "0")]),
        )
        .unwrap();
    h.manager.compile_graph(gid(1), &[]).unwrap();

    let summary = h.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(!summary.is_feature_memory_base_refreshable().unwrap());
    assert!(
        summary
            .feature_memory_info()
            .unwrap()
            .iter()
            .all(|info| !info.refreshable)
    );
}

#[test]
fn summary_requires_compiled_graph() {
    let h = harness();
    h.add(1);

    let err = h.manager.compiled_graph_summary(gid(1)).unwrap_err();
    assert_eq!(err.status(), Status::NotBuilt);
}

#[test]
fn dynamic_summary_refuses_sizes_but_counts_streams() {
    let h = harness_with(
        ManagerConfig::default(),
        StubCompiler::new()
            .with_attrs(static_attrs())
            .with_submodel(GeModel::new(
                "sub",
                ModelAttrs::new().with_streams(3, 2),
            )),
    );
    h.manager
        .add_graph(
            gid(1),
            simple_graph("dyn"),
            &options(&[(keys::DYNAMIC_BATCH_SIZE, "1,2,4")]),
        )
        .unwrap();
    h.manager.compile_graph(gid(1), &[]).unwrap();

    let summary = h.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(!summary.is_static());
    let err = summary.const_memory_size().unwrap_err();
    assert!(matches!(err, GeError::SummaryUnavailable { .. }));
    assert!(summary.feature_memory_size().is_err());
    assert!(summary.io_indexes_with_same_addr().is_err());

    assert_eq!(summary.stream_num(), 5);
    assert_eq!(summary.event_num(), 3);
}

#[test]
fn dynamic_input_shape_makes_model_dynamic() {
    let h = harness();
    let graph = ComputeGraph::new("dyn")
        .with_input("x", TensorDesc::new(vec![-1, 4], DataType::Float32))
        .with_output(TensorDesc::new(vec![-1, 4], DataType::Float32));
    h.manager
        .add_graph(gid(1), graph, &common::no_options())
        .unwrap();
    h.manager.compile_graph(gid(1), &[]).unwrap();

    let summary = h.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(!summary.is_static());
    assert!(summary.output_shapes().is_err());
}

#[test]
fn stream_allocation_lists_root_first() {
    let h = harness_with(
        ManagerConfig::default(),
        StubCompiler::new()
            .with_attrs(static_attrs())
            .with_streams(vec![stream(0, vec![10]), stream(1, vec![11, 12])])
            .with_submodel(GeModel::new("sub", ModelAttrs::new())),
    );
    h.compiled(1);

    let allocation = h
        .manager
        .compiled_graph_summary(gid(1))
        .unwrap()
        .stream_allocation();
    assert_eq!(allocation.len(), 2);
    assert_eq!(allocation[0].model_name, "g1");
    assert_eq!(allocation[0].streams.len(), 2);
    assert_eq!(allocation[0].streams[1].physical_stream_ids, vec![11, 12]);
    assert_eq!(allocation[1].model_name, "sub");
    assert!(allocation[1].streams.is_empty());
}

#[test]
fn io_indexes_sharing_an_address() {
    let h = harness_with(
        ManagerConfig::default(),
        StubCompiler::new().with_attrs(static_attrs()).with_io_offsets(
            vec![OpOffsets::data("x", 0, 4096)],
            Some(OpOffsets::net_output(vec![4096])),
        ),
    );
    h.compiled(1);

    let summary = h.manager.compiled_graph_summary(gid(1)).unwrap();
    assert_eq!(summary.io_indexes_with_same_addr().unwrap(), vec![(0, 0)]);
}

#[test]
fn io_indexes_empty_without_match() {
    let distinct = harness_with(
        ManagerConfig::default(),
        StubCompiler::new().with_attrs(static_attrs()).with_io_offsets(
            vec![OpOffsets::data("x", 0, 4096)],
            Some(OpOffsets::net_output(vec![8192])),
        ),
    );
    distinct.compiled(1);
    let summary = distinct.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(summary.io_indexes_with_same_addr().unwrap().is_empty());

    let no_net_output = harness();
    no_net_output.compiled(1);
    let summary = no_net_output.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(summary.io_indexes_with_same_addr().unwrap().is_empty());
}

#[test]
fn summary_is_cached_until_recompile() {
    let h = harness();
    h.manager
        .add_graph(
            gid(1),
            simple_graph("g").with_variable("w"),
            &common::no_options(),
        )
        .unwrap();
    h.manager.compile_graph(gid(1), &[]).unwrap();

    let first = h.manager.compiled_graph_summary(gid(1)).unwrap();
    let second = h.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    h.compiler
        .set_attrs(ModelAttrs::new().with_weight_size(2048).with_memory_size(1024));
    h.manager.mark_resource_changed("w");
    h.manager.compile_graph(gid(1), &[]).unwrap();

    let third = h.manager.compiled_graph_summary(gid(1)).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.const_memory_size().unwrap(), 2048);
    assert_eq!(first.const_memory_size().unwrap(), 512);
}

#[test]
fn fork_summarizes_shared_artifact() {
    let h = harness();
    h.compiled(1);
    h.manager.fork_graph(gid(1), gid(2)).unwrap();

    let summary = h.manager.compiled_graph_summary(gid(2)).unwrap();
    assert_eq!(summary.graph_id(), gid(2));
    assert_eq!(summary.const_memory_size().unwrap(), 512);
}
