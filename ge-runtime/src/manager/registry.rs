//! Graph registry.

use super::node::GraphNode;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ge_core::error::{GeError, Result};
use ge_core::types::GraphId;
use std::sync::Arc;

/// Outcome of a conditional removal.
#[derive(Debug)]
pub(crate) enum RemoveOutcome {
    Removed(Arc<GraphNode>),
    Running,
    Missing,
}

/// Concurrent map from graph id to node.
#[derive(Debug, Default)]
pub(crate) struct GraphRegistry {
    graphs: DashMap<GraphId, Arc<GraphNode>>,
}

impl GraphRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a node; the first caller for an id wins.
    pub(crate) fn insert(&self, node: GraphNode) -> Result<Arc<GraphNode>> {
        match self.graphs.entry(node.id()) {
            Entry::Occupied(_) => Err(GeError::GraphAlreadyExists {
                graph_id: node.id(),
            }),
            Entry::Vacant(slot) => {
                let node = Arc::new(node);
                slot.insert(Arc::clone(&node));
                Ok(node)
            }
        }
    }

    pub(crate) fn get(&self, graph_id: GraphId) -> Option<Arc<GraphNode>> {
        self.graphs.get(&graph_id).map(|n| Arc::clone(n.value()))
    }

    /// Remove a node unless it is running and `allow_running` is false.
    pub(crate) fn remove(&self, graph_id: GraphId, allow_running: bool) -> RemoveOutcome {
        match self
            .graphs
            .remove_if(&graph_id, |_, node| allow_running || !node.is_running())
        {
            Some((_, node)) => RemoveOutcome::Removed(node),
            None if self.graphs.contains_key(&graph_id) => RemoveOutcome::Running,
            None => RemoveOutcome::Missing,
        }
    }

    pub(crate) fn contains(&self, graph_id: GraphId) -> bool {
        self.graphs.contains_key(&graph_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.graphs.len()
    }

    pub(crate) fn ids(&self) -> Vec<GraphId> {
        let mut ids: Vec<GraphId> = self.graphs.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Remove every node.
    pub(crate) fn drain(&self) -> Vec<Arc<GraphNode>> {
        let ids = self.ids();
        ids.into_iter()
            .filter_map(|id| self.graphs.remove(&id).map(|(_, node)| node))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::node::RunKind;
    use ge_core::graph::ComputeGraph;
    use ge_core::options::GraphOptions;

    fn node(id: u32) -> GraphNode {
        GraphNode::new(
            GraphId::new(id),
            ComputeGraph::new(format!("g{id}")),
            GraphOptions::default(),
        )
    }

    #[test]
    fn duplicate_insert_rejected() {
        let registry = GraphRegistry::new();
        registry.insert(node(1)).unwrap();
        assert!(matches!(
            registry.insert(node(1)),
            Err(GeError::GraphAlreadyExists { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_respects_running() {
        let registry = GraphRegistry::new();
        let n = registry.insert(node(1)).unwrap();
        let guard = n.begin_run(RunKind::Sync).unwrap();

        assert!(matches!(
            registry.remove(GraphId::new(1), false),
            RemoveOutcome::Running
        ));
        assert!(matches!(
            registry.remove(GraphId::new(1), true),
            RemoveOutcome::Removed(_)
        ));
        assert!(matches!(
            registry.remove(GraphId::new(1), false),
            RemoveOutcome::Missing
        ));
        drop(guard);
    }

    #[test]
    fn ids_are_sorted_and_drain_empties() {
        let registry = GraphRegistry::new();
        for id in [3, 1, 2] {
            registry.insert(node(id)).unwrap();
        }
        assert_eq!(
            registry.ids(),
            vec![GraphId::new(1), GraphId::new(2), GraphId::new(3)]
        );
        assert_eq!(registry.drain().len(), 3);
        assert!(!registry.contains(GraphId::new(1)));
    }
}
