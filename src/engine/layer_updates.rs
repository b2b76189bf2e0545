//! Per-layer update functions applied after each correction pass.
//!
//! The backend invokes these in a fixed order (agents, objects, places,
//! rooms, buildings), handing each the corrected anchor values and corrected
//! pose values. Functions may merge semantically-equivalent nodes when the
//! merging policy allows it; merging never crosses layers.

use std::collections::HashMap;

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;

use crate::core::types::{Pose3, position_of};
use crate::graph::{LayerId, LayerPayload, NodeId, SceneGraph};

/// Corrected values keyed by pose-graph key or anchor id.
pub type CorrectedValues = HashMap<u64, Pose3>;

/// A layer update step over the private graph.
pub type LayerUpdateFn =
    Box<dyn Fn(&mut SceneGraph, &CorrectedValues, &CorrectedValues, bool) + Send>;

/// Build the fixed-order update function list.
pub fn default_update_functions(
    places_merge_pos_threshold_m: f64,
    places_merge_distance_tolerance_m: f64,
) -> Vec<LayerUpdateFn> {
    vec![
        Box::new(update_agents),
        Box::new(update_objects),
        Box::new(move |graph, anchors, poses, merge| {
            update_places(
                graph,
                anchors,
                poses,
                merge,
                places_merge_pos_threshold_m,
                places_merge_distance_tolerance_m,
            )
        }),
        Box::new(update_rooms),
        Box::new(update_buildings),
    ]
}

/// Move agent nodes to their corrected external poses.
pub fn update_agents(
    graph: &mut SceneGraph,
    _anchor_values: &CorrectedValues,
    pose_values: &CorrectedValues,
    _allow_merging: bool,
) {
    for node in graph.layer_mut(LayerId::Agents).nodes_mut() {
        let LayerPayload::Agent { external_key, .. } = &node.attributes.payload else {
            continue;
        };
        if let Some(pose) = pose_values.get(external_key) {
            node.attributes.position = position_of(pose);
        }
    }
}

/// Recompute object positions as the centroid of their mesh vertices.
///
/// Vertices with non-finite coordinates are skipped; an object whose
/// correspondences are all invalid keeps its previous position.
pub fn update_objects(
    graph: &mut SceneGraph,
    _anchor_values: &CorrectedValues,
    _pose_values: &CorrectedValues,
    _allow_merging: bool,
) {
    let Some(mesh) = graph.mesh() else {
        return;
    };

    let mut centroids: Vec<(NodeId, Point3<f64>)> = Vec::new();
    for node in graph.layer(LayerId::Objects).nodes() {
        let LayerPayload::Object { mesh_connections } = &node.attributes.payload else {
            continue;
        };
        let mut sum = nalgebra::Vector3::zeros();
        let mut count = 0usize;
        for &idx in mesh_connections {
            let Some(vertex) = mesh.vertices.get(idx as usize) else {
                continue;
            };
            if !vertex.x.is_finite() || !vertex.y.is_finite() || !vertex.z.is_finite() {
                log::debug!("Skipping non-finite mesh vertex {} for {}", idx, node.id);
                continue;
            }
            sum += nalgebra::Vector3::new(vertex.x as f64, vertex.y as f64, vertex.z as f64);
            count += 1;
        }
        if count > 0 {
            centroids.push((node.id, Point3::from(sum / count as f64)));
        }
    }

    for (id, centroid) in centroids {
        if let Some(node) = graph.node_mut(id) {
            node.attributes.position = centroid;
        }
    }
}

/// Move place nodes to their corrected anchor values, then merge places that
/// have collapsed onto each other (gated by `allow_merging`).
pub fn update_places(
    graph: &mut SceneGraph,
    anchor_values: &CorrectedValues,
    _pose_values: &CorrectedValues,
    allow_merging: bool,
    pos_threshold_m: f64,
    distance_tolerance_m: f64,
) {
    for node in graph.layer_mut(LayerId::Places).nodes_mut() {
        if let Some(pose) = anchor_values.get(&node.id.value()) {
            node.attributes.position = position_of(pose);
        }
    }

    if !allow_merging {
        return;
    }

    for (from, to) in find_place_merges(graph, pos_threshold_m, distance_tolerance_m) {
        merge_place_nodes(graph, from, to);
    }
}

/// Find pairs of places close enough to merge: positions within the
/// threshold and obstacle distances within the tolerance. The younger node
/// of each pair is absorbed into the older one.
fn find_place_merges(
    graph: &SceneGraph,
    pos_threshold_m: f64,
    distance_tolerance_m: f64,
) -> Vec<(NodeId, NodeId)> {
    let places = graph.layer(LayerId::Places);
    let mut ids: Vec<NodeId> = places.node_ids().collect();
    ids.sort();

    let mut tree: KdTree<f64, 3> = KdTree::new();
    for (i, id) in ids.iter().enumerate() {
        let p = places.node(*id).expect("id from this layer").attributes.position;
        tree.add(&[p.x, p.y, p.z], i as u64);
    }

    let threshold_sq = pos_threshold_m * pos_threshold_m;
    let mut absorbed = vec![false; ids.len()];
    let mut merges = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        if absorbed[i] {
            continue;
        }
        let node = places.node(*id).expect("id from this layer");
        let p = node.attributes.position;
        for neighbor in tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y, p.z], 2) {
            let j = neighbor.item as usize;
            if j == i || absorbed[j] || neighbor.distance > threshold_sq {
                continue;
            }
            // Only absorb younger nodes so the survivor keeps its identity.
            if ids[j] <= ids[i] {
                continue;
            }
            let other = places.node(ids[j]).expect("id from this layer");
            if (place_distance(node) - place_distance(other)).abs() > distance_tolerance_m {
                continue;
            }
            absorbed[j] = true;
            merges.push((ids[j], ids[i]));
        }
    }
    merges
}

fn place_distance(node: &crate::graph::SceneGraphNode) -> f64 {
    match &node.attributes.payload {
        LayerPayload::Place { distance, .. } => *distance,
        _ => 0.0,
    }
}

/// Absorb place `from` into place `to`: children, sibling edges, and mesh
/// correspondences move over, then `from` is removed.
fn merge_place_nodes(graph: &mut SceneGraph, from: NodeId, to: NodeId) {
    let Some(source) = graph.node(from) else {
        return;
    };
    let Some(target) = graph.node(to) else {
        return;
    };
    debug_assert_eq!(source.layer, target.layer, "merging never crosses layers");

    let children: Vec<NodeId> = source.children.iter().copied().collect();
    let siblings: Vec<NodeId> = source.siblings.iter().copied().collect();
    let parent = source.parent;
    let connections = match &source.attributes.payload {
        LayerPayload::Place {
            mesh_connections, ..
        } => mesh_connections.clone(),
        _ => Vec::new(),
    };

    log::debug!("Merging place {} into {}", from, to);
    graph.remove_node(from);

    for child in children {
        graph.insert_edge(to, child);
    }
    for sibling in siblings {
        if sibling != to {
            graph.insert_edge(to, sibling);
        }
    }
    if let Some(parent) = parent {
        graph.insert_edge(parent, to);
    }
    if let Some(node) = graph.node_mut(to)
        && let LayerPayload::Place {
            mesh_connections, ..
        } = &mut node.attributes.payload
    {
        for c in connections {
            if !mesh_connections.contains(&c) {
                mesh_connections.push(c);
            }
        }
    }
}

/// Re-center room nodes on the centroid of their member places.
pub fn update_rooms(
    graph: &mut SceneGraph,
    _anchor_values: &CorrectedValues,
    _pose_values: &CorrectedValues,
    _allow_merging: bool,
) {
    let mut centroids: Vec<(NodeId, Point3<f64>)> = Vec::new();
    for room in graph.layer(LayerId::Rooms).nodes() {
        let mut sum = nalgebra::Vector3::zeros();
        let mut count = 0usize;
        for child in &room.children {
            if let Some(place) = graph.node(*child) {
                sum += place.attributes.position.coords;
                count += 1;
            }
        }
        if count > 0 {
            centroids.push((room.id, Point3::from(sum / count as f64)));
        }
    }

    for (id, centroid) in centroids {
        if let Some(node) = graph.node_mut(id) {
            node.attributes.position = centroid;
        }
    }
}

/// Re-center building nodes on the centroid of the rooms layer.
pub fn update_buildings(
    graph: &mut SceneGraph,
    _anchor_values: &CorrectedValues,
    _pose_values: &CorrectedValues,
    _allow_merging: bool,
) {
    let rooms = graph.layer(LayerId::Rooms);
    if rooms.is_empty() {
        return;
    }
    let mut sum = nalgebra::Vector3::zeros();
    for room in rooms.nodes() {
        sum += room.attributes.position.coords;
    }
    let centroid = Point3::from(sum / rooms.num_nodes() as f64);

    for node in graph.layer_mut(LayerId::Buildings).nodes_mut() {
        node.attributes.position = centroid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{TriMesh, pose_from_position};
    use crate::graph::NodeAttributes;
    use approx::assert_relative_eq;

    fn graph_with_places(positions: &[(f64, f64)]) -> SceneGraph {
        let mut graph = SceneGraph::new();
        for (i, (x, y)) in positions.iter().enumerate() {
            graph.emplace_node(
                LayerId::Places,
                NodeId::new('p', i as u64),
                NodeAttributes::at(Point3::new(*x, *y, 0.0), LayerId::Places),
            );
        }
        graph
    }

    #[test]
    fn test_update_agents_follows_corrected_pose() {
        let mut graph = SceneGraph::new();
        let id = NodeId::new('a', 0);
        let mut attrs = NodeAttributes::at(Point3::new(0.0, 0.0, 0.0), LayerId::Agents);
        attrs.payload = LayerPayload::Agent {
            external_key: 17,
            stamp_us: 0,
        };
        graph.emplace_node(LayerId::Agents, id, attrs);

        let mut poses = CorrectedValues::new();
        poses.insert(17, pose_from_position(Point3::new(2.0, 0.5, 0.0)));

        update_agents(&mut graph, &CorrectedValues::new(), &poses, false);

        assert_relative_eq!(graph.node(id).unwrap().attributes.position.x, 2.0);
    }

    #[test]
    fn test_update_objects_recomputes_centroid() {
        let mut graph = SceneGraph::new();
        let id = NodeId::new('o', 0);
        let mut attrs = NodeAttributes::at(Point3::new(0.0, 0.0, 0.0), LayerId::Objects);
        attrs.payload = LayerPayload::Object {
            mesh_connections: vec![0, 1],
        };
        graph.emplace_node(LayerId::Objects, id, attrs);
        graph.set_mesh(TriMesh {
            vertices: vec![Point3::new(1.0, 0.0, 0.0), Point3::new(3.0, 0.0, 0.0)],
            colors: vec![[0, 0, 0], [0, 0, 0]],
            faces: Vec::new(),
        });

        update_objects(
            &mut graph,
            &CorrectedValues::new(),
            &CorrectedValues::new(),
            false,
        );

        assert_relative_eq!(graph.node(id).unwrap().attributes.position.x, 2.0);
    }

    #[test]
    fn test_update_places_applies_anchor_values() {
        let mut graph = graph_with_places(&[(0.0, 0.0)]);
        let id = NodeId::new('p', 0);

        let mut anchors = CorrectedValues::new();
        anchors.insert(id.value(), pose_from_position(Point3::new(0.0, 4.0, 0.0)));

        update_places(&mut graph, &anchors, &CorrectedValues::new(), false, 0.4, 0.3);

        assert_relative_eq!(graph.node(id).unwrap().attributes.position.y, 4.0);
    }

    #[test]
    fn test_update_places_merges_collapsed_pair() {
        let mut graph = graph_with_places(&[(0.0, 0.0), (0.1, 0.0), (5.0, 0.0)]);

        update_places(
            &mut graph,
            &CorrectedValues::new(),
            &CorrectedValues::new(),
            true,
            0.4,
            0.3,
        );

        let places = graph.layer(LayerId::Places);
        assert_eq!(places.num_nodes(), 2);
        // The older node survives.
        assert!(places.has_node(NodeId::new('p', 0)));
        assert!(!places.has_node(NodeId::new('p', 1)));
        assert!(places.has_node(NodeId::new('p', 2)));
    }

    #[test]
    fn test_update_places_merging_disabled() {
        let mut graph = graph_with_places(&[(0.0, 0.0), (0.1, 0.0)]);

        update_places(
            &mut graph,
            &CorrectedValues::new(),
            &CorrectedValues::new(),
            false,
            0.4,
            0.3,
        );

        assert_eq!(graph.layer(LayerId::Places).num_nodes(), 2);
    }

    #[test]
    fn test_merge_moves_children_to_survivor() {
        let mut graph = graph_with_places(&[(0.0, 0.0), (0.1, 0.0)]);
        let room = NodeId::new('R', 0);
        graph.emplace_node(
            LayerId::Rooms,
            room,
            NodeAttributes::at(Point3::new(0.0, 0.0, 0.0), LayerId::Rooms),
        );
        // Room parents the node that will be absorbed.
        graph.insert_edge(room, NodeId::new('p', 1));

        update_places(
            &mut graph,
            &CorrectedValues::new(),
            &CorrectedValues::new(),
            true,
            0.4,
            0.3,
        );

        let survivor = graph.node(NodeId::new('p', 0)).unwrap();
        assert_eq!(survivor.parent, Some(room));
    }

    #[test]
    fn test_update_rooms_recenters_on_children() {
        let mut graph = graph_with_places(&[(0.0, 0.0), (2.0, 0.0)]);
        let room = NodeId::new('R', 0);
        graph.emplace_node(
            LayerId::Rooms,
            room,
            NodeAttributes::at(Point3::new(9.0, 9.0, 9.0), LayerId::Rooms),
        );
        graph.insert_edge(room, NodeId::new('p', 0));
        graph.insert_edge(room, NodeId::new('p', 1));

        update_rooms(
            &mut graph,
            &CorrectedValues::new(),
            &CorrectedValues::new(),
            false,
        );

        let pos = graph.node(room).unwrap().attributes.position;
        assert_relative_eq!(pos.x, 1.0);
        assert_relative_eq!(pos.y, 0.0);
    }

    #[test]
    fn test_default_function_order() {
        let funcs = default_update_functions(0.4, 0.3);
        assert_eq!(funcs.len(), 5);
    }
}
