//! Deformation anchor construction.
//!
//! Each optimization pass rebuilds a minimum spanning tree over the places
//! layer copy: every place becomes an anchor, spanning edges become relative
//! constraints, and only spanning-tree leaves contribute their mesh-vertex
//! correspondences. Rebuilt from scratch every pass because its validity
//! depends on the latest place-layer topology.

use std::collections::{HashMap, HashSet};

use crate::core::types::{between, pose_from_position};
use crate::graph::{LayerPayload, NodeId, SceneGraphLayer};

use super::deformation::DeformationSolver;

/// Minimum spanning tree over a layer's intra-layer edges.
#[derive(Debug, Default)]
pub struct SpanningTreeInfo {
    /// Tree edges, weight-ascending.
    pub edges: Vec<(NodeId, NodeId)>,
    /// Nodes with tree degree <= 1.
    pub leaves: HashSet<NodeId>,
}

/// Union-find over node ids.
struct DisjointSet {
    parent: HashMap<NodeId, NodeId>,
}

impl DisjointSet {
    fn new(ids: impl Iterator<Item = NodeId>) -> Self {
        Self {
            parent: ids.map(|id| (id, id)).collect(),
        }
    }

    fn find(&mut self, id: NodeId) -> NodeId {
        let mut root = id;
        while self.parent[&root] != root {
            root = self.parent[&root];
        }
        // Path compression.
        let mut current = id;
        while current != root {
            let next = self.parent[&current];
            self.parent.insert(current, root);
            current = next;
        }
        root
    }

    fn union(&mut self, a: NodeId, b: NodeId) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        self.parent.insert(ra, rb);
        true
    }
}

/// Compute the minimum spanning tree of a layer, weighted by Euclidean edge
/// length. Disconnected components each yield their own tree.
pub fn minimum_spanning_tree(layer: &SceneGraphLayer) -> SpanningTreeInfo {
    let mut weighted: Vec<(f64, NodeId, NodeId)> = layer
        .edges()
        .filter_map(|(a, b)| {
            let pa = layer.node(*a)?.attributes.position;
            let pb = layer.node(*b)?.attributes.position;
            Some(((pa - pb).norm(), *a, *b))
        })
        .collect();
    weighted.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut sets = DisjointSet::new(layer.node_ids());
    let mut degree: HashMap<NodeId, usize> = HashMap::new();
    let mut info = SpanningTreeInfo::default();
    for (_, a, b) in weighted {
        if sets.union(a, b) {
            info.edges.push((a, b));
            *degree.entry(a).or_insert(0) += 1;
            *degree.entry(b).or_insert(0) += 1;
        }
    }

    for id in layer.node_ids() {
        if degree.get(&id).copied().unwrap_or(0) <= 1 {
            info.leaves.insert(id);
        }
    }
    info
}

/// Rebuild the solver's anchor structure from the places layer copy.
///
/// Returns `false` (after a warning) when the layer is empty; that is a
/// benign skip, not an error.
pub fn build_anchor_set(solver: &mut dyn DeformationSolver, places: &SceneGraphLayer) -> bool {
    if places.is_empty() {
        log::warn!("Skipping deformation anchors: places layer is empty");
        return false;
    }

    solver.clear_anchors();

    let tree = minimum_spanning_tree(places);

    for node in places.nodes() {
        solver.add_anchor(node.id.value(), pose_from_position(node.attributes.position));

        if !tree.leaves.contains(&node.id) {
            continue;
        }
        let LayerPayload::Place {
            mesh_connections, ..
        } = &node.attributes.payload
        else {
            continue;
        };
        if mesh_connections.is_empty() {
            continue;
        }
        solver.add_anchor_valence(node.id.value(), mesh_connections);
    }

    for (a, b) in &tree.edges {
        let (Some(source), Some(target)) = (places.node(*a), places.node(*b)) else {
            continue;
        };
        let from = pose_from_position(source.attributes.position);
        let to = pose_from_position(target.attributes.position);
        solver.add_anchor_edge(a.value(), b.value(), between(&from, &to));
    }
    true
}
