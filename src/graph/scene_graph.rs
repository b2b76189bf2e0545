//! Layered scene graph.
//!
//! The graph owns one [`SceneGraphLayer`] per [`LayerId`] plus the
//! parent/child relations between adjacent layers and the optional display
//! mesh. Node identifiers are globally unique and never remapped: merging
//! another graph matches nodes by id and replaces attributes wholesale.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::layer::{LayerId, SceneGraphLayer, SceneGraphNode};
use super::node::{NodeAttributes, NodeId};
use crate::core::types::TriMesh;

/// A typed, layered, mutable multigraph with an attached display mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneGraph {
    layers: BTreeMap<LayerId, SceneGraphLayer>,
    node_layers: HashMap<NodeId, LayerId>,
    mesh: Option<TriMesh>,
    mesh_version: u64,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Create an empty graph with all layers present.
    pub fn new() -> Self {
        let mut layers = BTreeMap::new();
        for id in LayerId::ALL {
            layers.insert(id, SceneGraphLayer::new(id));
        }
        Self {
            layers,
            node_layers: HashMap::new(),
            mesh: None,
            mesh_version: 0,
        }
    }

    /// Get a layer.
    pub fn layer(&self, id: LayerId) -> &SceneGraphLayer {
        &self.layers[&id]
    }

    /// Get a mutable layer.
    ///
    /// Node insertion/removal must go through the graph so the node index
    /// stays consistent; this is for attribute and edge access.
    pub fn layer_mut(&mut self, id: LayerId) -> &mut SceneGraphLayer {
        self.layers.get_mut(&id).expect("all layers are created in new()")
    }

    /// Whether a node exists anywhere in the graph.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.node_layers.contains_key(&id)
    }

    /// Look up a node anywhere in the graph.
    pub fn node(&self, id: NodeId) -> Option<&SceneGraphNode> {
        let layer = self.node_layers.get(&id)?;
        self.layers[layer].node(id)
    }

    /// Look up a mutable node anywhere in the graph.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneGraphNode> {
        let layer = *self.node_layers.get(&id)?;
        self.layers.get_mut(&layer)?.node_mut(id)
    }

    /// Total node count across layers.
    pub fn num_nodes(&self) -> usize {
        self.node_layers.len()
    }

    /// Insert a new node into a layer. Returns `false` if the id is taken.
    pub fn emplace_node(&mut self, layer: LayerId, id: NodeId, attributes: NodeAttributes) -> bool {
        if self.node_layers.contains_key(&id) {
            return false;
        }
        let inserted = self
            .layers
            .get_mut(&layer)
            .expect("all layers are created in new()")
            .insert_node(SceneGraphNode::new(id, layer, attributes));
        if inserted {
            self.node_layers.insert(id, layer);
        }
        inserted
    }

    /// Insert an edge between two nodes. Idempotent.
    ///
    /// Nodes in the same layer become siblings; nodes in adjacent layers form
    /// a parent/child relation (the higher layer is the parent). Returns
    /// `false` for missing endpoints, non-adjacent cross-layer pairs,
    /// duplicate edges, or a child that already has a different parent.
    pub fn insert_edge(&mut self, a: NodeId, b: NodeId) -> bool {
        let (Some(&layer_a), Some(&layer_b)) =
            (self.node_layers.get(&a), self.node_layers.get(&b))
        else {
            return false;
        };

        if layer_a == layer_b {
            return self
                .layers
                .get_mut(&layer_a)
                .expect("all layers are created in new()")
                .insert_edge(a, b);
        }

        if !layer_a.is_adjacent(&layer_b) {
            return false;
        }

        let (parent, child) = if layer_a > layer_b { (a, b) } else { (b, a) };
        if self.node(child).and_then(|n| n.parent).is_some() {
            return false;
        }

        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.insert(child);
        }
        true
    }

    /// Remove a node and detach all of its relations.
    ///
    /// The id is tombstoned in its layer; children are orphaned (their parent
    /// link is cleared), not removed.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(layer) = self.node_layers.remove(&id) else {
            return false;
        };
        let Some(node) = self
            .layers
            .get_mut(&layer)
            .expect("all layers are created in new()")
            .remove_node(id)
        else {
            return false;
        };

        if let Some(parent) = node.parent
            && let Some(parent_node) = self.node_mut(parent)
        {
            parent_node.children.remove(&id);
        }
        for child in &node.children {
            if let Some(child_node) = self.node_mut(*child) {
                child_node.parent = None;
            }
        }
        true
    }

    /// Merge another graph into this one.
    ///
    /// Node id is the merge key; attributes of matching nodes are replaced
    /// wholesale, new nodes and edges are added, and removal tombstones are
    /// applied so upstream removals propagate instead of orphaning. The
    /// display mesh is not merged (it is owned by the deformation step).
    pub fn merge_from(&mut self, other: &SceneGraph) {
        // Nodes and intra-layer edges, layer by layer.
        for (layer_id, other_layer) in &other.layers {
            for node in other_layer.nodes() {
                match self.node_mut(node.id) {
                    Some(existing) => existing.attributes = node.attributes.clone(),
                    None => {
                        self.emplace_node(*layer_id, node.id, node.attributes.clone());
                    }
                }
            }
            for (a, b) in other_layer.edges() {
                self.insert_edge(*a, *b);
            }
        }

        // Cross-layer relations.
        for other_layer in other.layers.values() {
            for node in other_layer.nodes() {
                if let Some(parent) = node.parent {
                    self.insert_edge(parent, node.id);
                }
            }
        }

        // Upstream removals.
        for other_layer in other.layers.values() {
            for id in other_layer.removed_nodes() {
                self.remove_node(*id);
            }
        }
    }

    /// The display mesh, if one has been installed.
    pub fn mesh(&self) -> Option<&TriMesh> {
        self.mesh.as_ref()
    }

    /// Version counter bumped on every mesh install.
    pub fn mesh_version(&self) -> u64 {
        self.mesh_version
    }

    /// Install a display mesh, bumping the version counter.
    pub fn set_mesh(&mut self, mesh: TriMesh) {
        self.mesh = Some(mesh);
        self.mesh_version += 1;
    }
}
