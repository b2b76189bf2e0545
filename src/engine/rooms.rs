//! Room and building maintenance.
//!
//! Rooms are produced by an external detector; this module decides which
//! place nodes the detector should look at each cycle and keeps the
//! singleton building node consistent with the rooms layer. Both steps take
//! the private graph lock internally so they never extend the optimization
//! critical section.

use std::collections::HashSet;

use nalgebra::Point3;

use crate::graph::{LayerId, NodeAttributes, NodeId, SceneGraph};
use crate::state::SharedSceneGraph;

/// External room clustering over the places layer.
///
/// Implementations mutate the graph's rooms layer in place: create/remove
/// room nodes and parent place nodes to them.
pub trait RoomDetector: Send {
    /// Detect rooms over the active place set.
    fn find_rooms(&mut self, graph: &mut SceneGraph, active_places: &HashSet<NodeId>);
}

/// Fixed identifier of the singleton building node.
pub const BUILDING_NODE: NodeId = NodeId::new('B', 0);

/// Incrementally maintains the rooms and buildings layers.
pub struct StructureMaintainer {
    detector: Option<Box<dyn RoomDetector>>,
    unlabeled_places: HashSet<NodeId>,
    building_color: [u8; 3],
    building_semantic_label: u8,
}

impl StructureMaintainer {
    /// Create a maintainer; `detector` may be `None` to disable room
    /// detection entirely.
    pub fn new(
        detector: Option<Box<dyn RoomDetector>>,
        building_color: [u8; 3],
        building_semantic_label: u8,
    ) -> Self {
        Self {
            detector,
            unlabeled_places: HashSet::new(),
            building_color,
            building_semantic_label,
        }
    }

    /// Places that ended the last detection pass without a parent room.
    pub fn unlabeled_places(&self) -> &HashSet<NodeId> {
        &self.unlabeled_places
    }

    /// Install (or replace) the room detector.
    pub fn set_detector(&mut self, detector: Box<dyn RoomDetector>) {
        self.detector = Some(detector);
    }

    /// Run room detection over the active place set.
    ///
    /// The active set is the union of places updated since the last merge,
    /// the children of all existing rooms (re-validating membership), and
    /// previously unlabeled places that still exist. Afterwards the
    /// unlabeled set is recomputed from the active set for next cycle's
    /// seeding. Skipped when no detector is configured.
    pub fn update_rooms(&mut self, private: &SharedSceneGraph) {
        if self.detector.is_none() {
            return;
        }

        let mut state = private.lock();
        let active = gather_active_places(&state.graph, &state.latest_places, &self.unlabeled_places);
        log::debug!("Detecting rooms over {} active places", active.len());

        if let Some(detector) = &mut self.detector {
            detector.find_rooms(&mut state.graph, &active);
        }

        self.unlabeled_places = active
            .into_iter()
            .filter(|id| {
                state
                    .graph
                    .layer(LayerId::Places)
                    .node(*id)
                    .is_some_and(|n| !n.has_parent())
            })
            .collect();
    }

    /// Keep the building node consistent with the rooms layer.
    ///
    /// The building exists iff at least one room exists; its position is the
    /// unweighted centroid of room positions, recomputed every cycle, and it
    /// is re-attached to every current room (idempotent edges).
    pub fn update_building(&self, private: &SharedSceneGraph) {
        let mut state = private.lock();
        let graph = &mut state.graph;

        let rooms = graph.layer(LayerId::Rooms);
        if rooms.is_empty() {
            if graph.has_node(BUILDING_NODE) {
                graph.remove_node(BUILDING_NODE);
            }
            return;
        }

        let mut sum = nalgebra::Vector3::zeros();
        let room_ids: Vec<NodeId> = rooms.node_ids().collect();
        for room in rooms.nodes() {
            sum += room.attributes.position.coords;
        }
        let centroid = Point3::from(sum / room_ids.len() as f64);

        if !graph.has_node(BUILDING_NODE) {
            let mut attrs = NodeAttributes::at(centroid, LayerId::Buildings);
            attrs.color = self.building_color;
            attrs.semantic_label = self.building_semantic_label;
            attrs.name = BUILDING_NODE.to_string();
            graph.emplace_node(LayerId::Buildings, BUILDING_NODE, attrs);
        } else if let Some(node) = graph.node_mut(BUILDING_NODE) {
            node.attributes.position = centroid;
        }

        for room in room_ids {
            graph.insert_edge(BUILDING_NODE, room);
        }
    }
}

/// Gather the place set handed to the room detector.
fn gather_active_places(
    graph: &SceneGraph,
    latest_places: &HashSet<NodeId>,
    unlabeled: &HashSet<NodeId>,
) -> HashSet<NodeId> {
    let mut active: HashSet<NodeId> = latest_places.clone();

    for room in graph.layer(LayerId::Rooms).nodes() {
        active.extend(room.children.iter().copied());
    }

    let places = graph.layer(LayerId::Places);
    for id in unlabeled {
        if places.has_node(*id) {
            active.insert(*id);
        }
    }
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PURPLE: [u8; 3] = [168, 7, 193];

    fn private_with_rooms(positions: &[(f64, f64, f64)]) -> SharedSceneGraph {
        let private = SharedSceneGraph::new();
        {
            let mut state = private.lock();
            for (i, (x, y, z)) in positions.iter().enumerate() {
                state.graph.emplace_node(
                    LayerId::Rooms,
                    NodeId::new('R', i as u64),
                    NodeAttributes::at(Point3::new(*x, *y, *z), LayerId::Rooms),
                );
            }
        }
        private
    }

    #[test]
    fn test_building_absent_without_rooms() {
        let private = SharedSceneGraph::new();
        let maintainer = StructureMaintainer::new(None, PURPLE, 22);

        maintainer.update_building(&private);

        assert!(!private.lock().graph.has_node(BUILDING_NODE));
    }

    #[test]
    fn test_building_created_at_centroid() {
        let private = private_with_rooms(&[(0.0, 0.0, 0.0), (2.0, 4.0, 0.0)]);
        let maintainer = StructureMaintainer::new(None, PURPLE, 22);

        maintainer.update_building(&private);

        let state = private.lock();
        let building = state.graph.node(BUILDING_NODE).expect("building exists");
        assert_relative_eq!(building.attributes.position.x, 1.0);
        assert_relative_eq!(building.attributes.position.y, 2.0);
        assert_eq!(building.attributes.color, PURPLE);
        assert_eq!(building.children.len(), 2);
    }

    #[test]
    fn test_building_position_tracks_rooms() {
        let private = private_with_rooms(&[(0.0, 0.0, 0.0)]);
        let maintainer = StructureMaintainer::new(None, PURPLE, 22);
        maintainer.update_building(&private);

        {
            let mut state = private.lock();
            state
                .graph
                .node_mut(NodeId::new('R', 0))
                .unwrap()
                .attributes
                .position = Point3::new(6.0, 0.0, 0.0);
        }
        maintainer.update_building(&private);

        let state = private.lock();
        let building = state.graph.node(BUILDING_NODE).unwrap();
        assert_relative_eq!(building.attributes.position.x, 6.0);
    }

    #[test]
    fn test_building_removed_with_last_room() {
        let private = private_with_rooms(&[(1.0, 0.0, 0.0)]);
        let maintainer = StructureMaintainer::new(None, PURPLE, 22);
        maintainer.update_building(&private);
        assert!(private.lock().graph.has_node(BUILDING_NODE));

        {
            let mut state = private.lock();
            state.graph.remove_node(NodeId::new('R', 0));
        }
        maintainer.update_building(&private);

        assert!(!private.lock().graph.has_node(BUILDING_NODE));
    }

    #[test]
    fn test_building_edges_idempotent() {
        let private = private_with_rooms(&[(0.0, 0.0, 0.0), (2.0, 0.0, 0.0)]);
        let maintainer = StructureMaintainer::new(None, PURPLE, 22);

        maintainer.update_building(&private);
        maintainer.update_building(&private);

        let state = private.lock();
        assert_eq!(state.graph.node(BUILDING_NODE).unwrap().children.len(), 2);
    }

    struct CountingDetector {
        calls: usize,
        last_active: usize,
    }

    impl RoomDetector for CountingDetector {
        fn find_rooms(&mut self, _graph: &mut SceneGraph, active: &HashSet<NodeId>) {
            self.calls += 1;
            self.last_active = active.len();
        }
    }

    #[test]
    fn test_update_rooms_skipped_without_detector() {
        let private = SharedSceneGraph::new();
        let mut maintainer = StructureMaintainer::new(None, PURPLE, 22);
        maintainer.update_rooms(&private);
        assert!(maintainer.unlabeled_places().is_empty());
    }

    #[test]
    fn test_update_rooms_tracks_unlabeled_places() {
        let private = SharedSceneGraph::new();
        {
            let mut state = private.lock();
            for i in 0..3u64 {
                let id = NodeId::new('p', i);
                state.graph.emplace_node(
                    LayerId::Places,
                    id,
                    NodeAttributes::at(Point3::new(i as f64, 0.0, 0.0), LayerId::Places),
                );
                state.latest_places.insert(id);
            }
        }

        let mut maintainer = StructureMaintainer::new(
            Some(Box::new(CountingDetector {
                calls: 0,
                last_active: 0,
            })),
            PURPLE,
            22,
        );
        maintainer.update_rooms(&private);

        // Detector labeled nothing, so every active place is unlabeled.
        assert_eq!(maintainer.unlabeled_places().len(), 3);
    }
}
