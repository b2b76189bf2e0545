//! Scene graph node identifiers and attributes.

use std::fmt;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::layer::LayerId;

/// Unique, stable node identifier.
///
/// Packs a one-character category prefix into the top byte and a 56-bit index
/// below it, so identifiers stay compact, orderable, and readable (`p42`,
/// `R0`, `B0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Create an identifier from a category prefix and index.
    pub const fn new(prefix: char, index: u64) -> Self {
        debug_assert!(prefix.is_ascii(), "node prefix must be ASCII");
        debug_assert!(index < (1 << 56), "node index exceeds 56 bits");
        Self(((prefix as u64) << 56) | (index & ((1 << 56) - 1)))
    }

    /// Category prefix character.
    pub fn prefix(&self) -> char {
        ((self.0 >> 56) as u8) as char
    }

    /// Index within the category.
    pub fn index(&self) -> u64 {
        self.0 & ((1 << 56) - 1)
    }

    /// Raw packed value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.index())
    }
}

/// Layer-specific attribute payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerPayload {
    /// Agent (trajectory) node tied to an external pose-graph key.
    Agent {
        /// Key of the corresponding node in the external pose graph.
        external_key: u64,
        /// Capture timestamp in microseconds.
        stamp_us: u64,
    },
    /// Object node with mesh vertex correspondences.
    Object {
        /// Indices of mesh vertices belonging to this object.
        mesh_connections: Vec<u64>,
    },
    /// Place node with mesh vertex correspondences.
    Place {
        /// Indices of mesh vertices anchored to this place.
        mesh_connections: Vec<u64>,
        /// Distance to the nearest obstacle, meters.
        distance: f64,
        /// Whether the front-end still considers this place active.
        is_active: bool,
    },
    /// Room node.
    Room,
    /// Building node.
    Building,
}

impl LayerPayload {
    /// Default payload for a layer.
    pub fn default_for(layer: LayerId) -> Self {
        match layer {
            LayerId::Agents => LayerPayload::Agent {
                external_key: 0,
                stamp_us: 0,
            },
            LayerId::Objects => LayerPayload::Object {
                mesh_connections: Vec::new(),
            },
            LayerId::Places => LayerPayload::Place {
                mesh_connections: Vec::new(),
                distance: 0.0,
                is_active: false,
            },
            LayerId::Rooms => LayerPayload::Room,
            LayerId::Buildings => LayerPayload::Building,
        }
    }
}

/// Attributes carried by every scene graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Position in the world frame, meters.
    pub position: Point3<f64>,
    /// Display color (RGB).
    pub color: [u8; 3],
    /// Semantic class label.
    pub semantic_label: u8,
    /// Human-readable name.
    pub name: String,
    /// Layer-specific payload.
    pub payload: LayerPayload,
}

impl NodeAttributes {
    /// Create attributes at a position with the layer's default payload.
    pub fn at(position: Point3<f64>, layer: LayerId) -> Self {
        Self {
            position,
            color: [128, 128, 128],
            semantic_label: 0,
            name: String::new(),
            payload: LayerPayload::default_for(layer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_roundtrip() {
        let id = NodeId::new('p', 42);
        assert_eq!(id.prefix(), 'p');
        assert_eq!(id.index(), 42);
        assert_eq!(id.to_string(), "p42");
    }

    #[test]
    fn test_node_id_ordering_within_prefix() {
        let a = NodeId::new('p', 1);
        let b = NodeId::new('p', 2);
        assert!(a < b);
    }

    #[test]
    fn test_node_id_distinct_prefixes() {
        let place = NodeId::new('p', 0);
        let room = NodeId::new('R', 0);
        assert_ne!(place, room);
    }

    #[test]
    fn test_default_payload_matches_layer() {
        let payload = LayerPayload::default_for(LayerId::Places);
        assert!(matches!(payload, LayerPayload::Place { .. }));
    }
}
