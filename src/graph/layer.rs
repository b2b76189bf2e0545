//! Scene graph layers.
//!
//! A layer owns its nodes and undirected intra-layer edges and keeps an
//! append-only tombstone list of removed node ids so downstream copies can
//! apply the same removals instead of inferring them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::node::{NodeAttributes, NodeId};

/// Scene graph layer identifiers, ordered bottom to top.
///
/// Cross-layer (parent/child) edges are only valid between adjacent layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerId {
    /// Robot trajectory nodes.
    Agents,
    /// Segmented objects.
    Objects,
    /// Topological places (free-space skeleton).
    Places,
    /// Rooms grouping places.
    Rooms,
    /// Buildings grouping rooms.
    Buildings,
}

impl LayerId {
    /// All layers, bottom to top.
    pub const ALL: [LayerId; 5] = [
        LayerId::Agents,
        LayerId::Objects,
        LayerId::Places,
        LayerId::Rooms,
        LayerId::Buildings,
    ];

    /// Whether `self` and `other` are adjacent in the layer ordering.
    pub fn is_adjacent(&self, other: &LayerId) -> bool {
        let a = *self as i32;
        let b = *other as i32;
        (a - b).abs() == 1
    }
}

/// A node stored inside a layer, with its relations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneGraphNode {
    /// Unique identifier.
    pub id: NodeId,
    /// Layer this node lives in.
    pub layer: LayerId,
    /// Node attributes.
    pub attributes: NodeAttributes,
    /// Parent node in the layer above, if any.
    pub parent: Option<NodeId>,
    /// Children in the layer below.
    pub children: BTreeSet<NodeId>,
    /// Intra-layer neighbors.
    pub siblings: BTreeSet<NodeId>,
}

impl SceneGraphNode {
    /// Create a node with no relations.
    pub fn new(id: NodeId, layer: LayerId, attributes: NodeAttributes) -> Self {
        Self {
            id,
            layer,
            attributes,
            parent: None,
            children: BTreeSet::new(),
            siblings: BTreeSet::new(),
        }
    }

    /// Whether this node has a parent.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}

/// Normalize an undirected edge so (a, b) and (b, a) compare equal.
fn edge_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// A single layer of the scene graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneGraphLayer {
    /// Layer identifier.
    pub id: LayerId,
    nodes: HashMap<NodeId, SceneGraphNode>,
    edges: HashSet<(NodeId, NodeId)>,
    removed: Vec<NodeId>,
}

impl SceneGraphLayer {
    /// Create an empty layer.
    pub fn new(id: LayerId) -> Self {
        Self {
            id,
            nodes: HashMap::new(),
            edges: HashSet::new(),
            removed: Vec::new(),
        }
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of intra-layer edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Whether the layer has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a node exists.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<&SceneGraphNode> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by id.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneGraphNode> {
        self.nodes.get_mut(&id)
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &SceneGraphNode> {
        self.nodes.values()
    }

    /// Iterate mutably over all nodes.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut SceneGraphNode> {
        self.nodes.values_mut()
    }

    /// Iterate over all node ids.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Iterate over intra-layer edges (normalized order).
    pub fn edges(&self) -> impl Iterator<Item = &(NodeId, NodeId)> {
        self.edges.iter()
    }

    /// Node ids removed from this layer, in removal order.
    pub fn removed_nodes(&self) -> &[NodeId] {
        &self.removed
    }

    /// Insert a node. Returns `false` if the id already exists.
    pub fn insert_node(&mut self, node: SceneGraphNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id, node);
        true
    }

    /// Insert an undirected intra-layer edge. Duplicate insertion is a no-op;
    /// returns `false` if either endpoint is missing or the edge exists.
    pub fn insert_edge(&mut self, a: NodeId, b: NodeId) -> bool {
        if a == b || !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
            return false;
        }
        if !self.edges.insert(edge_key(a, b)) {
            return false;
        }
        if let Some(node) = self.nodes.get_mut(&a) {
            node.siblings.insert(b);
        }
        if let Some(node) = self.nodes.get_mut(&b) {
            node.siblings.insert(a);
        }
        true
    }

    /// Remove a node, its intra-layer edges, and tombstone the id.
    ///
    /// Returns the removed node so the caller can detach cross-layer
    /// relations.
    pub fn remove_node(&mut self, id: NodeId) -> Option<SceneGraphNode> {
        let node = self.nodes.remove(&id)?;
        for sibling in &node.siblings {
            self.edges.remove(&edge_key(id, *sibling));
            if let Some(other) = self.nodes.get_mut(sibling) {
                other.siblings.remove(&id);
            }
        }
        self.removed.push(id);
        Some(node)
    }

    /// Merge another layer into this one.
    ///
    /// Node id is the merge key: attributes of existing nodes are replaced
    /// wholesale by the incoming version, new nodes are inserted without
    /// relations (edges are merged separately), and the other layer's
    /// removal tombstones are applied here. Re-applying the same source is
    /// idempotent.
    pub fn merge_layer(&mut self, other: &SceneGraphLayer) {
        for node in other.nodes.values() {
            match self.nodes.get_mut(&node.id) {
                Some(existing) => {
                    existing.attributes = node.attributes.clone();
                }
                None => {
                    self.insert_node(SceneGraphNode::new(
                        node.id,
                        self.id,
                        node.attributes.clone(),
                    ));
                }
            }
        }
        for (a, b) in &other.edges {
            self.insert_edge(*a, *b);
        }
        for id in &other.removed {
            self.remove_node(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn place_node(index: u64, x: f64) -> SceneGraphNode {
        let id = NodeId::new('p', index);
        SceneGraphNode::new(
            id,
            LayerId::Places,
            NodeAttributes::at(Point3::new(x, 0.0, 0.0), LayerId::Places),
        )
    }

    #[test]
    fn test_layer_ordering() {
        assert!(LayerId::Agents < LayerId::Objects);
        assert!(LayerId::Places < LayerId::Rooms);
        assert!(LayerId::Rooms < LayerId::Buildings);
    }

    #[test]
    fn test_adjacency() {
        assert!(LayerId::Rooms.is_adjacent(&LayerId::Buildings));
        assert!(LayerId::Places.is_adjacent(&LayerId::Rooms));
        assert!(!LayerId::Places.is_adjacent(&LayerId::Buildings));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut layer = SceneGraphLayer::new(LayerId::Places);
        assert!(layer.insert_node(place_node(0, 0.0)));
        assert!(!layer.insert_node(place_node(0, 1.0)));

        let removed = layer.remove_node(NodeId::new('p', 0));
        assert!(removed.is_some());
        assert_eq!(layer.removed_nodes(), &[NodeId::new('p', 0)]);
        assert!(layer.is_empty());
    }

    #[test]
    fn test_edge_idempotent() {
        let mut layer = SceneGraphLayer::new(LayerId::Places);
        layer.insert_node(place_node(0, 0.0));
        layer.insert_node(place_node(1, 1.0));

        assert!(layer.insert_edge(NodeId::new('p', 0), NodeId::new('p', 1)));
        assert!(!layer.insert_edge(NodeId::new('p', 1), NodeId::new('p', 0)));
        assert_eq!(layer.num_edges(), 1);
    }

    #[test]
    fn test_remove_clears_sibling_edges() {
        let mut layer = SceneGraphLayer::new(LayerId::Places);
        layer.insert_node(place_node(0, 0.0));
        layer.insert_node(place_node(1, 1.0));
        layer.insert_edge(NodeId::new('p', 0), NodeId::new('p', 1));

        layer.remove_node(NodeId::new('p', 0));

        assert_eq!(layer.num_edges(), 0);
        let survivor = layer.node(NodeId::new('p', 1)).unwrap();
        assert!(survivor.siblings.is_empty());
    }

    #[test]
    fn test_merge_replaces_attributes_wholesale() {
        let mut dst = SceneGraphLayer::new(LayerId::Places);
        dst.insert_node(place_node(0, 0.0));

        let mut src = SceneGraphLayer::new(LayerId::Places);
        src.insert_node(place_node(0, 5.0));
        src.insert_node(place_node(1, 1.0));

        dst.merge_layer(&src);

        assert_eq!(dst.num_nodes(), 2);
        let moved = dst.node(NodeId::new('p', 0)).unwrap();
        assert_eq!(moved.attributes.position.x, 5.0);
    }

    #[test]
    fn test_merge_applies_removals() {
        let mut dst = SceneGraphLayer::new(LayerId::Places);
        dst.insert_node(place_node(0, 0.0));
        dst.insert_node(place_node(1, 1.0));

        let mut src = SceneGraphLayer::new(LayerId::Places);
        src.insert_node(place_node(1, 1.0));
        src.insert_node(place_node(0, 0.0));
        src.remove_node(NodeId::new('p', 0));

        dst.merge_layer(&src);

        assert!(!dst.has_node(NodeId::new('p', 0)));
        assert!(dst.has_node(NodeId::new('p', 1)));

        // Re-merging the same source changes nothing.
        dst.merge_layer(&src);
        assert_eq!(dst.num_nodes(), 1);
    }
}
