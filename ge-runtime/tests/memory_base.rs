//! Integration tests for memory-base setters.

mod common;

use common::{addr, gid, harness, harness_with, no_options, options, simple_graph};
use ge_core::options::keys;
use ge_core::prelude::*;
use ge_core::traits::FeatureMemoryBinding;
use ge_runtime::config::ManagerConfig;
use ge_runtime::testing::{ExecutorCall, ExecutorOp, StubCompiler};

fn device_error() -> ExecutorError {
    ExecutorError::Device {
        call: "rtMemcpy",
        code: 507899,
        message: "invalid address".to_string(),
    }
}

// =============================================================================
// Preconditions
// =============================================================================

#[test]
fn setters_require_compiled_graph() {
    let h = harness();
    h.add(1);

    let results = [
        h.manager.set_const_memory_base(gid(1), addr(0x1000), 512),
        h.manager
            .set_fixed_feature_memory_base(gid(1), MemoryClass::Default, addr(0x2000), 1024),
        h.manager.update_feature_memory_base(gid(1), addr(0x3000), 1024),
        h.manager
            .update_refreshable_feature_memory_base(gid(1), addr(0x3000), 1024),
    ];
    for result in results {
        assert_eq!(result.unwrap_err().status(), Status::NotBuilt);
    }
}

#[test]
fn address_and_size_must_agree_about_nullness() {
    let h = harness();
    h.compiled(1);

    let err = h
        .manager
        .set_const_memory_base(gid(1), DeviceAddr::NULL, 512)
        .unwrap_err();
    assert!(matches!(err, GeError::InvalidMemoryBase { .. }));
    assert_eq!(err.status(), Status::ParamInvalid);

    let err = h
        .manager
        .update_feature_memory_base(gid(1), addr(0x3000), 0)
        .unwrap_err();
    assert_eq!(err.status(), Status::ParamInvalid);

    // A null base with zero size is accepted and skips the size check.
    h.manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::P2p, DeviceAddr::NULL, 0)
        .unwrap();
}

#[test]
fn base_smaller_than_model_requirement_is_rejected() {
    let h = harness();
    h.compiled(1);

    let err = h
        .manager
        .set_const_memory_base(gid(1), addr(0x1000), 256)
        .unwrap_err();
    assert!(matches!(
        err,
        GeError::MemoryTooSmall {
            required: 512,
            provided: 256,
            ..
        }
    ));

    let err = h
        .manager
        .update_feature_memory_base(gid(1), addr(0x3000), 1000)
        .unwrap_err();
    assert_eq!(err.status(), Status::ParamInvalid);

    // Nothing was recorded; a correctly sized base still goes through.
    h.manager
        .set_const_memory_base(gid(1), addr(0x1000), 512)
        .unwrap();
}

#[test]
fn dynamic_model_skips_size_check() {
    let h = harness_with(
        ManagerConfig::default(),
        StubCompiler::new()
            .with_attrs(common::static_attrs())
            .with_dynamic_shape(true),
    );
    h.compiled(1);

    h.manager
        .set_const_memory_base(gid(1), addr(0x1000), 8)
        .unwrap();
    h.manager
        .update_feature_memory_base(gid(1), addr(0x3000), 8)
        .unwrap();
}

// =============================================================================
// Constant and fixed bases
// =============================================================================

#[test]
fn const_base_is_set_once() {
    let h = harness();
    h.compiled(1);

    h.manager
        .set_const_memory_base(gid(1), addr(0x1000), 512)
        .unwrap();
    let err = h
        .manager
        .set_const_memory_base(gid(1), addr(0x1000), 512)
        .unwrap_err();
    assert_eq!(err.status(), Status::RepeatOperation);
}

#[test]
fn const_base_after_load_is_unsupported() {
    let h = harness();
    h.loaded(1);

    let err = h
        .manager
        .set_const_memory_base(gid(1), addr(0x1000), 512)
        .unwrap_err();
    assert_eq!(err.status(), Status::Unsupported);

    let err = h
        .manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::Default, addr(0x2000), 1024)
        .unwrap_err();
    assert_eq!(err.status(), Status::Unsupported);
}

#[test]
fn fixed_base_is_once_per_class() {
    let h = harness();
    h.compiled(1);

    h.manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::Default, addr(0x2000), 1024)
        .unwrap();
    h.manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::P2p, addr(0x6000), 64)
        .unwrap();

    let err = h
        .manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::Default, addr(0x2000), 1024)
        .unwrap_err();
    assert_eq!(err.status(), Status::RepeatOperation);
}

#[test]
fn fixed_then_refreshable_is_unsupported() {
    let h = harness();
    h.compiled(1);

    h.manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::Default, addr(0x2000), 1024)
        .unwrap();
    let err = h
        .manager
        .update_feature_memory_base(gid(1), addr(0x3000), 1024)
        .unwrap_err();
    assert!(matches!(err, GeError::MemoryUnsupported { .. }));
}

#[test]
fn refreshable_then_fixed_is_unsupported() {
    let h = harness();
    h.compiled(1);

    h.manager
        .update_feature_memory_base(gid(1), addr(0x3000), 1024)
        .unwrap();
    let err = h
        .manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::Default, addr(0x2000), 1024)
        .unwrap_err();
    assert_eq!(err.status(), Status::Unsupported);

    // Other classes are unaffected.
    h.manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::P2p, addr(0x6000), 64)
        .unwrap();
}

// =============================================================================
// Refreshable bases
// =============================================================================

#[test]
fn refreshable_base_may_be_updated_repeatedly() {
    let h = harness();
    h.compiled(1);

    for base in [0x3000, 0x4000, 0x5000] {
        h.manager
            .update_feature_memory_base(gid(1), addr(base), 1024)
            .unwrap();
    }

    h.manager.load_graph(gid(1), &no_options(), None).unwrap();
    let request = h.executor.last_load_request(gid(1)).unwrap();
    assert_eq!(
        request.feature_memory,
        vec![FeatureMemoryBinding {
            class: MemoryClass::Default,
            mutability: Mutability::Refreshable,
            base: MemoryBase::new(addr(0x5000), 1024),
        }]
    );
}

#[test]
fn second_update_refused_when_refreshability_disabled() {
    let h = harness();
    h.manager
        .add_graph(
            gid(1),
            simple_graph("pinned"),
            &options(&[(keys::FEATURE_BASE_REFRESHABLE, "0")]),
        )
        .unwrap();
    h.manager.compile_graph(gid(1), &[]).unwrap();

    h.manager
        .update_feature_memory_base(gid(1), addr(0x3000), 1024)
        .unwrap();
    let err = h
        .manager
        .update_feature_memory_base(gid(1), addr(0x4000), 1024)
        .unwrap_err();
    assert_eq!(err.status(), Status::RepeatOperation);
}

#[test]
fn refreshable_part_checks_refreshable_size() {
    let h = harness_with(
        ManagerConfig::default(),
        StubCompiler::new().with_attrs(
            ModelAttrs::new()
                .with_weight_size(512)
                .with_feature_memory(MemoryClass::Default, 1024, 768),
        ),
    );
    h.compiled(1);

    // Only the 256-byte refreshable portion is required.
    h.manager
        .update_refreshable_feature_memory_base(gid(1), addr(0x3000), 256)
        .unwrap();

    let err = h
        .manager
        .update_feature_memory_base(gid(1), addr(0x4000), 1024)
        .unwrap_err();
    assert_eq!(err.status(), Status::Unsupported);
}

#[test]
fn update_on_loaded_graph_reaches_executor() {
    let h = harness();
    h.loaded(1);

    h.manager
        .update_feature_memory_base(gid(1), addr(0x3000), 1024)
        .unwrap();
    assert!(
        h.executor
            .calls_for(gid(1))
            .contains(&ExecutorCall::UpdateFeatureMemoryBase {
                graph_id: gid(1),
                addr: addr(0x3000),
                size: 1024,
            })
    );
}

#[test]
fn executor_rejection_is_not_recorded() {
    let h = harness();
    h.manager
        .add_graph(
            gid(1),
            simple_graph("pinned"),
            &options(&[(keys::FEATURE_BASE_REFRESHABLE, "false")]),
        )
        .unwrap();
    h.manager.compile_graph(gid(1), &[]).unwrap();
    h.manager.load_graph(gid(1), &no_options(), None).unwrap();

    h.executor
        .fail_next(ExecutorOp::UpdateFeatureMemoryBase, device_error());
    let err = h
        .manager
        .update_feature_memory_base(gid(1), addr(0x3000), 1024)
        .unwrap_err();
    assert!(matches!(err, GeError::Executor { .. }));

    // The rejected update did not count as the one allowed update.
    h.manager
        .update_feature_memory_base(gid(1), addr(0x4000), 1024)
        .unwrap();
}

#[test]
fn bases_travel_with_load_request() {
    let h = harness();
    h.compiled(1);

    h.manager
        .set_const_memory_base(gid(1), addr(0x1000), 512)
        .unwrap();
    h.manager
        .set_fixed_feature_memory_base(gid(1), MemoryClass::P2p, addr(0x6000), 64)
        .unwrap();
    h.manager.load_graph(gid(1), &no_options(), None).unwrap();

    let request = h.executor.last_load_request(gid(1)).unwrap();
    assert_eq!(
        request.const_memory,
        Some(MemoryBase::new(addr(0x1000), 512))
    );
    assert_eq!(request.feature_memory.len(), 1);
    assert_eq!(request.feature_memory[0].class, MemoryClass::P2p);
    assert_eq!(request.feature_memory[0].mutability, Mutability::Fixed);
}
