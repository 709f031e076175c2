//! Memory-base setters.
//!
//! Every setter requires a compiled graph, a base whose address and size
//! agree about nullness and a graph that is not running, in that order. An
//! unknown graph reports `NotBuilt`.

use super::GraphManager;
use super::node::{GraphNode, NodeInner};
use crate::memory::{MemoryGate, RefreshScope};
use crate::summary::CompiledGraphSummary;
use ge_core::error::{GeError, Result, ResultExt};
use ge_core::types::{
    DeviceAddr, GraphId, MemoryBase, MemoryClass, MemoryKind, Mutability, SessionId,
};
use tracing::instrument;

impl GraphManager {
    /// Set the constant-weight memory base. Allowed once, before load.
    #[instrument(skip_all, fields(graph_id = %graph_id, addr = %addr, size = size))]
    pub fn set_const_memory_base(&self, graph_id: GraphId, addr: DeviceAddr, size: u64) -> Result<()> {
        let base = MemoryBase::new(addr, size);
        self.with_memory(
            graph_id,
            MemoryKind::Const,
            base,
            |_, inner, gate, summary| {
                inner
                    .memory
                    .check_const(gate, base, summary.const_memory_size().ok())?;
                inner.memory.record_const(base);
                Ok(())
            },
        )
    }

    /// Set the fixed feature-memory base of `class`. Allowed once per class, before load.
    #[instrument(skip_all, fields(graph_id = %graph_id, class = %class, addr = %addr, size = size))]
    pub fn set_fixed_feature_memory_base(
        &self,
        graph_id: GraphId,
        class: MemoryClass,
        addr: DeviceAddr,
        size: u64,
    ) -> Result<()> {
        let base = MemoryBase::new(addr, size);
        self.with_memory(
            graph_id,
            MemoryKind::Feature(class, Mutability::Fixed),
            base,
            |_, inner, gate, summary| {
                inner.memory.check_fixed(
                    gate,
                    class,
                    base,
                    summary.feature_memory_size_of(class).ok(),
                )?;
                inner.memory.record_fixed(class, base);
                Ok(())
            },
        )
    }

    /// Rebind the whole default-class feature memory.
    #[instrument(skip_all, fields(graph_id = %graph_id, addr = %addr, size = size))]
    pub fn update_feature_memory_base(
        &self,
        graph_id: GraphId,
        addr: DeviceAddr,
        size: u64,
    ) -> Result<()> {
        self.update_refreshable(graph_id, RefreshScope::Whole, MemoryBase::new(addr, size))
    }

    /// Rebind only the refreshable portion of the default-class feature memory.
    #[instrument(skip_all, fields(graph_id = %graph_id, addr = %addr, size = size))]
    pub fn update_refreshable_feature_memory_base(
        &self,
        graph_id: GraphId,
        addr: DeviceAddr,
        size: u64,
    ) -> Result<()> {
        self.update_refreshable(
            graph_id,
            RefreshScope::RefreshablePart,
            MemoryBase::new(addr, size),
        )
    }

    fn update_refreshable(
        &self,
        graph_id: GraphId,
        scope: RefreshScope,
        base: MemoryBase,
    ) -> Result<()> {
        self.with_memory(
            graph_id,
            MemoryKind::Feature(MemoryClass::Default, Mutability::Refreshable),
            base,
            |node, inner, gate, summary| {
                let required = match scope {
                    RefreshScope::Whole => summary.feature_memory_size().ok(),
                    RefreshScope::RefreshablePart => summary.refreshable_feature_memory_size().ok(),
                };
                inner
                    .memory
                    .check_refreshable(gate, scope, base, required)?;

                if gate.loaded {
                    let model = inner.model(graph_id, "update feature memory base")?;
                    let ctx = node.run_context(model, SessionId::default(), None);
                    self.shared
                        .executor
                        .update_feature_memory_base(&ctx, base.addr, base.size)
                        .for_graph(graph_id)?;
                }

                let first = inner.memory.record_refreshable(scope, base);
                tracing::debug!(graph_id = %graph_id, first, scope = ?scope, "Feature memory base updated");
                Ok(())
            },
        )
    }

    fn with_memory<F>(
        &self,
        graph_id: GraphId,
        memory: MemoryKind,
        base: MemoryBase,
        apply: F,
    ) -> Result<()>
    where
        F: FnOnce(&GraphNode, &mut NodeInner, MemoryGate, &CompiledGraphSummary) -> Result<()>,
    {
        let operation = match memory {
            MemoryKind::Const => "set const memory base",
            MemoryKind::Feature(_, Mutability::Fixed) => "set fixed feature memory base",
            MemoryKind::Feature(_, Mutability::Refreshable) => "update feature memory base",
        };

        self.shared.ensure_initialized()?;
        let node = self
            .shared
            .registry
            .get(graph_id)
            .ok_or(GeError::NotBuilt {
                graph_id,
                operation,
            })?;
        let mut inner = node.lock();

        if !inner.compiled_flag {
            return Err(GeError::NotBuilt {
                graph_id,
                operation,
            });
        }
        if !base.is_consistent() {
            return Err(GeError::InvalidMemoryBase {
                graph_id,
                memory,
                addr: base.addr,
                size: base.size,
            });
        }
        if node.is_running() {
            return Err(GeError::GraphIsRunning {
                graph_id,
                operation,
            });
        }

        let refreshable = node.options().feature_base_refreshable;
        let gate = MemoryGate {
            graph_id,
            loaded: inner.load_flag,
            refreshable,
        };
        let summary = inner.summary(graph_id, refreshable)?;

        apply(&*node, &mut *inner, gate, summary.as_ref())
            .inspect_err(|e| tracing::warn!(graph_id = %graph_id, error = %e, "Memory base rejected"))?;
        tracing::info!(graph_id = %graph_id, memory = %memory, addr = %base.addr, size = base.size, "Memory base set");
        Ok(())
    }
}
