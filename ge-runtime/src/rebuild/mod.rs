//! Rebuild state controller.
//!
//! Tracks, per graph, the externally mutable resources (variables) it was
//! compiled against and which of them changed since its last successful
//! compile. A graph with pending changes must be recompiled before it runs.

use ge_core::types::GraphId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct TrackedGraph {
    resources: BTreeSet<String>,
    changed: BTreeSet<String>,
}

/// Maps graphs to changed resource names.
#[derive(Debug, Default)]
pub struct RebuildStateController {
    graphs: Mutex<HashMap<GraphId, TrackedGraph>>,
}

impl RebuildStateController {
    /// Create an empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `graph_id` against `resources`.
    ///
    /// Replaces any previous tracking for the id.
    pub fn track<I, S>(&self, graph_id: GraphId, resources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let resources: BTreeSet<String> = resources.into_iter().map(Into::into).collect();
        tracing::trace!(graph_id = %graph_id, resources = resources.len(), "Tracking graph resources");
        self.graphs.lock().insert(
            graph_id,
            TrackedGraph {
                resources,
                changed: BTreeSet::new(),
            },
        );
    }

    /// Record that `resource` was written outside any compiled graph.
    ///
    /// Returns the graphs now needing a rebuild.
    pub fn mark_changed(&self, resource: &str) -> Vec<GraphId> {
        let mut graphs = self.graphs.lock();
        let mut affected: Vec<GraphId> = graphs
            .iter_mut()
            .filter(|(_, g)| g.resources.contains(resource))
            .map(|(id, g)| {
                g.changed.insert(resource.to_string());
                *id
            })
            .collect();
        affected.sort_unstable();

        if !affected.is_empty() {
            tracing::debug!(resource = %resource, graphs = ?affected, "Resource changed");
        }
        affected
    }

    /// Whether `graph_id` has changed resources since its last compile.
    pub fn needs_rebuild(&self, graph_id: GraphId) -> bool {
        self.graphs
            .lock()
            .get(&graph_id)
            .is_some_and(|g| !g.changed.is_empty())
    }

    /// Changed resources of `graph_id`.
    pub fn changed_resources(&self, graph_id: GraphId) -> Vec<String> {
        self.graphs
            .lock()
            .get(&graph_id)
            .map(|g| g.changed.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Clear pending changes after a successful compile.
    pub fn clear(&self, graph_id: GraphId) {
        if let Some(g) = self.graphs.lock().get_mut(&graph_id) {
            g.changed.clear();
        }
    }

    /// Forget `graph_id`.
    pub fn remove_graph(&self, graph_id: GraphId) {
        self.graphs.lock().remove(&graph_id);
    }

    /// Forget every graph.
    pub fn reset(&self) {
        self.graphs.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_changed_flags_tracking_graphs() {
        let ctl = RebuildStateController::new();
        ctl.track(GraphId::new(1), ["w1", "w2"]);
        ctl.track(GraphId::new(2), ["w2"]);
        ctl.track(GraphId::new(3), Vec::<String>::new());

        assert_eq!(
            ctl.mark_changed("w2"),
            vec![GraphId::new(1), GraphId::new(2)]
        );
        assert!(ctl.needs_rebuild(GraphId::new(1)));
        assert!(ctl.needs_rebuild(GraphId::new(2)));
        assert!(!ctl.needs_rebuild(GraphId::new(3)));
        assert_eq!(ctl.changed_resources(GraphId::new(1)), vec!["w2".to_string()]);
    }

    #[test]
    fn clear_and_remove() {
        let ctl = RebuildStateController::new();
        ctl.track(GraphId::new(1), ["w"]);
        ctl.mark_changed("w");
        ctl.clear(GraphId::new(1));
        assert!(!ctl.needs_rebuild(GraphId::new(1)));

        ctl.mark_changed("w");
        ctl.remove_graph(GraphId::new(1));
        assert!(!ctl.needs_rebuild(GraphId::new(1)));
        assert!(ctl.mark_changed("w").is_empty());
    }

    #[test]
    fn unknown_resource_is_noop() {
        let ctl = RebuildStateController::new();
        ctl.track(GraphId::new(1), ["w"]);
        assert!(ctl.mark_changed("other").is_empty());
        assert!(!ctl.needs_rebuild(GraphId::new(1)));
    }
}
