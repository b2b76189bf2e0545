//! Shared-to-private graph merging.
//!
//! Runs once per cycle, only when the producer has flagged new content. The
//! merge is pure structural copying under the shared graph lock: no I/O and
//! no external calls, so a mid-merge failure cannot leave a partially merged
//! graph behind anything but a panic.

use crate::graph::{LayerId, SceneGraphLayer};
use crate::io::status_log::GraphLog;
use crate::state::{GraphState, SharedSceneGraph};

/// Merges the front-end's shared graph into the private working graph and
/// maintains the places-layer copy used for deformation anchors.
#[derive(Debug)]
pub struct GraphMerger {
    places_copy: SceneGraphLayer,
    graph_log: Option<GraphLog>,
}

impl Default for GraphMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphMerger {
    /// Create a merger with an empty places copy.
    pub fn new() -> Self {
        Self {
            places_copy: SceneGraphLayer::new(LayerId::Places),
            graph_log: None,
        }
    }

    /// Log per-layer graph sizes after every merge.
    pub fn set_graph_log(&mut self, graph_log: GraphLog) {
        self.graph_log = Some(graph_log);
    }

    /// The places-layer copy synchronized by the last merge.
    pub fn places_copy(&self) -> &SceneGraphLayer {
        &self.places_copy
    }

    /// Merge pending front-end changes into the private graph state.
    ///
    /// No-op unless the shared updated flag is set. The caller holds the
    /// private graph lock; the shared graph lock is taken for the duration
    /// of the copy and the flag is cleared after it is released, so the
    /// private graph is never observed partially merged.
    ///
    /// Returns whether a merge happened.
    pub fn merge_frontend(&mut self, shared: &SharedSceneGraph, private: &mut GraphState) -> bool {
        if !shared.is_updated() {
            return false;
        }

        {
            let shared_state = shared.lock();
            private.graph.merge_from(&shared_state.graph);
            private.latest_places = shared_state.latest_places.clone();

            let shared_places = shared_state.graph.layer(LayerId::Places);
            self.places_copy.merge_layer(shared_places);
            for removed in shared_places.removed_nodes() {
                self.places_copy.remove_node(*removed);
            }

            if let Some(graph_log) = &mut self.graph_log
                && let Err(e) = graph_log.append(&private.graph)
            {
                log::error!("Failed to append graph log record: {}", e);
            }
        }
        shared.clear_updated();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeAttributes, NodeId};
    use nalgebra::Point3;

    fn seed_shared(shared: &SharedSceneGraph, positions: &[(u64, f64)]) {
        let mut state = shared.lock();
        for (index, x) in positions {
            let id = NodeId::new('p', *index);
            state.graph.emplace_node(
                LayerId::Places,
                id,
                NodeAttributes::at(Point3::new(*x, 0.0, 0.0), LayerId::Places),
            );
            state.latest_places.insert(id);
        }
        drop(state);
        shared.mark_updated();
    }

    #[test]
    fn test_merge_noop_without_updates() {
        let shared = SharedSceneGraph::new();
        let mut merger = GraphMerger::new();
        let mut private = GraphState::default();

        assert!(!merger.merge_frontend(&shared, &mut private));
        assert_eq!(private.graph.num_nodes(), 0);
    }

    #[test]
    fn test_merge_copies_nodes_and_clears_flag() {
        let shared = SharedSceneGraph::new();
        seed_shared(&shared, &[(0, 0.0), (1, 1.0)]);
        let mut merger = GraphMerger::new();
        let mut private = GraphState::default();

        assert!(merger.merge_frontend(&shared, &mut private));
        assert_eq!(private.graph.layer(LayerId::Places).num_nodes(), 2);
        assert_eq!(private.latest_places.len(), 2);
        assert_eq!(merger.places_copy().num_nodes(), 2);
        assert!(!shared.is_updated());
    }

    #[test]
    fn test_merge_idempotent_without_new_updates() {
        let shared = SharedSceneGraph::new();
        seed_shared(&shared, &[(0, 0.0)]);
        let mut merger = GraphMerger::new();
        let mut private = GraphState::default();

        assert!(merger.merge_frontend(&shared, &mut private));
        let snapshot = format!("{:?}", private.graph);

        // Flag is clear: second call must not touch the private graph.
        assert!(!merger.merge_frontend(&shared, &mut private));
        assert_eq!(format!("{:?}", private.graph), snapshot);
    }

    #[test]
    fn test_places_copy_applies_removals() {
        let shared = SharedSceneGraph::new();
        seed_shared(&shared, &[(0, 0.0), (1, 1.0)]);
        let mut merger = GraphMerger::new();
        let mut private = GraphState::default();
        merger.merge_frontend(&shared, &mut private);

        {
            let mut state = shared.lock();
            state.graph.remove_node(NodeId::new('p', 1));
        }
        shared.mark_updated();
        merger.merge_frontend(&shared, &mut private);

        assert!(!merger.places_copy().has_node(NodeId::new('p', 1)));
        assert!(!private.graph.has_node(NodeId::new('p', 1)));
        assert_eq!(merger.places_copy().num_nodes(), 1);
    }
}
