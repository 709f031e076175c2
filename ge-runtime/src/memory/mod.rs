//! Memory-base accounting.
//!
//! A graph owns one constant-weight slot and, per memory class, at most one
//! feature-memory record. A record is either fixed (set once) or refreshable
//! (rebindable); once a class has a record of one mutability the other is
//! refused for that class.
//!
//! Checks and writes are split so the manager can forward a refreshable update
//! to the executor between them and only record it once the device accepted it.

use ge_core::error::{GeError, Result};
use ge_core::traits::FeatureMemoryBinding;
use ge_core::types::{GraphId, MemoryBase, MemoryClass, MemoryKind, Mutability};
use std::collections::BTreeMap;

/// Which part of the default-class feature memory a refreshable base covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// The whole feature memory (`update_feature_memory_base`).
    Whole,
    /// Only the refreshable portion (`update_refreshable_feature_memory_base`).
    RefreshablePart,
}

impl RefreshScope {
    fn as_str(self) -> &'static str {
        match self {
            Self::Whole => "whole feature memory",
            Self::RefreshablePart => "refreshable feature memory",
        }
    }
}

/// A feature-memory record for one memory class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRecord {
    /// Fixed or refreshable.
    pub mutability: Mutability,
    /// Current base.
    pub base: MemoryBase,
    /// Coverage of a refreshable base; `Whole` for fixed records.
    pub scope: RefreshScope,
}

/// Node state the memory rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct MemoryGate {
    /// The graph the table belongs to.
    pub graph_id: GraphId,
    /// Whether the graph is loaded.
    pub loaded: bool,
    /// Whether refreshable updates may repeat.
    pub refreshable: bool,
}

/// Memory-base records of one graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryBaseTable {
    const_base: Option<MemoryBase>,
    feature: BTreeMap<MemoryClass, FeatureRecord>,
}

impl MemoryBaseTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The constant-weight base, if set.
    pub fn const_base(&self) -> Option<MemoryBase> {
        self.const_base
    }

    /// The feature record for `class`, if any.
    pub fn feature(&self, class: MemoryClass) -> Option<&FeatureRecord> {
        self.feature.get(&class)
    }

    /// Whether no record has been written.
    pub fn is_empty(&self) -> bool {
        self.const_base.is_none() && self.feature.is_empty()
    }

    /// Feature records in load-request form.
    pub fn bindings(&self) -> Vec<FeatureMemoryBinding> {
        self.feature
            .iter()
            .map(|(class, record)| FeatureMemoryBinding {
                class: *class,
                mutability: record.mutability,
                base: record.base,
            })
            .collect()
    }

    /// Validate a constant-weight base.
    pub fn check_const(
        &self,
        gate: MemoryGate,
        base: MemoryBase,
        required: Option<u64>,
    ) -> Result<()> {
        let memory = MemoryKind::Const;
        if gate.loaded {
            return Err(unsupported(gate.graph_id, memory, "graph is already loaded"));
        }
        if self.const_base.is_some() {
            return Err(GeError::RepeatOperation {
                graph_id: gate.graph_id,
                memory,
            });
        }
        check_size(gate.graph_id, memory, base, required)
    }

    /// Record a constant-weight base. Call after [`check_const`](Self::check_const).
    pub fn record_const(&mut self, base: MemoryBase) {
        self.const_base = Some(base);
    }

    /// Validate a fixed feature base for `class`.
    pub fn check_fixed(
        &self,
        gate: MemoryGate,
        class: MemoryClass,
        base: MemoryBase,
        required: Option<u64>,
    ) -> Result<()> {
        let memory = MemoryKind::Feature(class, Mutability::Fixed);
        if gate.loaded {
            return Err(unsupported(gate.graph_id, memory, "graph is already loaded"));
        }
        match self.feature.get(&class) {
            Some(record) if record.mutability == Mutability::Refreshable => Err(unsupported(
                gate.graph_id,
                memory,
                "a refreshable base is already in use for this class",
            )),
            Some(_) => Err(GeError::RepeatOperation {
                graph_id: gate.graph_id,
                memory,
            }),
            None => check_size(gate.graph_id, memory, base, required),
        }
    }

    /// Record a fixed feature base. Call after [`check_fixed`](Self::check_fixed).
    pub fn record_fixed(&mut self, class: MemoryClass, base: MemoryBase) {
        self.feature.insert(
            class,
            FeatureRecord {
                mutability: Mutability::Fixed,
                base,
                scope: RefreshScope::Whole,
            },
        );
    }

    /// Validate a refreshable update of the default class.
    pub fn check_refreshable(
        &self,
        gate: MemoryGate,
        scope: RefreshScope,
        base: MemoryBase,
        required: Option<u64>,
    ) -> Result<()> {
        let memory = MemoryKind::Feature(MemoryClass::Default, Mutability::Refreshable);
        match self.feature.get(&MemoryClass::Default) {
            Some(record) if record.mutability == Mutability::Fixed => {
                return Err(unsupported(
                    gate.graph_id,
                    memory,
                    "a fixed base is already set for this class",
                ));
            }
            Some(_) if !gate.refreshable => {
                return Err(GeError::RepeatOperation {
                    graph_id: gate.graph_id,
                    memory,
                });
            }
            Some(record) if record.scope != scope => {
                return Err(unsupported(
                    gate.graph_id,
                    memory,
                    format!(
                        "previous updates covered the {}, not the {}",
                        record.scope.as_str(),
                        scope.as_str()
                    ),
                ));
            }
            _ => {}
        }
        check_size(gate.graph_id, memory, base, required)
    }

    /// Record a refreshable update, replacing any previous base.
    ///
    /// Returns `true` for the first update.
    pub fn record_refreshable(&mut self, scope: RefreshScope, base: MemoryBase) -> bool {
        self.feature
            .insert(
                MemoryClass::Default,
                FeatureRecord {
                    mutability: Mutability::Refreshable,
                    base,
                    scope,
                },
            )
            .is_none()
    }
}

fn unsupported(graph_id: GraphId, memory: MemoryKind, cause: impl Into<String>) -> GeError {
    GeError::MemoryUnsupported {
        graph_id,
        memory,
        cause: cause.into(),
    }
}

fn check_size(
    graph_id: GraphId,
    memory: MemoryKind,
    base: MemoryBase,
    required: Option<u64>,
) -> Result<()> {
    match required {
        Some(required) if !base.is_null() && base.size < required => Err(GeError::MemoryTooSmall {
            graph_id,
            memory,
            required,
            provided: base.size,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ge_core::error::Status;
    use ge_core::types::DeviceAddr;

    fn gate() -> MemoryGate {
        MemoryGate {
            graph_id: GraphId::new(1),
            loaded: false,
            refreshable: true,
        }
    }

    fn base(addr: u64, size: u64) -> MemoryBase {
        MemoryBase::new(DeviceAddr::new(addr), size)
    }

    #[test]
    fn const_is_one_shot() {
        let mut table = MemoryBaseTable::new();
        let b = base(0x1000, 512);
        table.check_const(gate(), b, None).unwrap();
        table.record_const(b);

        let err = table.check_const(gate(), b, None).unwrap_err();
        assert_eq!(err.status(), Status::RepeatOperation);
        assert_eq!(table.const_base(), Some(b));
    }

    #[test]
    fn const_rejected_once_loaded() {
        let table = MemoryBaseTable::new();
        let loaded = MemoryGate {
            loaded: true,
            ..gate()
        };
        let err = table.check_const(loaded, base(0x1000, 8), None).unwrap_err();
        assert_eq!(err.status(), Status::Unsupported);
    }

    #[test]
    fn fixed_is_per_class() {
        let mut table = MemoryBaseTable::new();
        table.record_fixed(MemoryClass::Default, base(0x1000, 64));

        let err = table
            .check_fixed(gate(), MemoryClass::Default, base(0x2000, 64), None)
            .unwrap_err();
        assert_eq!(err.status(), Status::RepeatOperation);

        table
            .check_fixed(gate(), MemoryClass::P2p, base(0x2000, 64), None)
            .unwrap();
    }

    #[test]
    fn fixed_and_refreshable_exclude_each_other() {
        let mut table = MemoryBaseTable::new();
        table.record_refreshable(RefreshScope::Whole, base(0x1000, 64));
        let err = table
            .check_fixed(gate(), MemoryClass::Default, base(0x2000, 64), None)
            .unwrap_err();
        assert_eq!(err.status(), Status::Unsupported);

        let mut table = MemoryBaseTable::new();
        table.record_fixed(MemoryClass::Default, base(0x1000, 64));
        let err = table
            .check_refreshable(gate(), RefreshScope::Whole, base(0x2000, 64), None)
            .unwrap_err();
        assert_eq!(err.status(), Status::Unsupported);
    }

    #[test]
    fn refreshable_repeats_unless_disabled() {
        let mut table = MemoryBaseTable::new();
        assert!(table.record_refreshable(RefreshScope::Whole, base(0x1000, 64)));
        table
            .check_refreshable(gate(), RefreshScope::Whole, base(0x3000, 64), None)
            .unwrap();
        assert!(!table.record_refreshable(RefreshScope::Whole, base(0x3000, 64)));
        assert_eq!(
            table.feature(MemoryClass::Default).map(|r| r.base.addr),
            Some(DeviceAddr::new(0x3000))
        );

        let disabled = MemoryGate {
            refreshable: false,
            ..gate()
        };
        let err = table
            .check_refreshable(disabled, RefreshScope::Whole, base(0x4000, 64), None)
            .unwrap_err();
        assert_eq!(err.status(), Status::RepeatOperation);
    }

    #[test]
    fn refreshable_scope_cannot_switch() {
        let mut table = MemoryBaseTable::new();
        table.record_refreshable(RefreshScope::RefreshablePart, base(0x1000, 64));
        let err = table
            .check_refreshable(gate(), RefreshScope::Whole, base(0x1000, 64), None)
            .unwrap_err();
        assert_eq!(err.status(), Status::Unsupported);
    }

    #[test]
    fn size_check_skips_null_base() {
        let table = MemoryBaseTable::new();
        let err = table
            .check_const(gate(), base(0x1000, 100), Some(512))
            .unwrap_err();
        assert_eq!(err.status(), Status::ParamInvalid);

        table
            .check_const(gate(), MemoryBase::new(DeviceAddr::NULL, 0), Some(512))
            .unwrap();
    }

    #[test]
    fn bindings_follow_records() {
        let mut table = MemoryBaseTable::new();
        assert!(table.is_empty());
        table.record_fixed(MemoryClass::P2p, base(0x1000, 64));
        table.record_refreshable(RefreshScope::Whole, base(0x2000, 64));

        let bindings = table.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].class, MemoryClass::Default);
        assert_eq!(bindings[0].mutability, Mutability::Refreshable);
        assert_eq!(bindings[1].class, MemoryClass::P2p);
    }
}
