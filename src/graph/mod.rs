//! Layered scene graph data model.
//!
//! The graph is the central mutable structure of the backend:
//!
//! ```text
//! Buildings   B0
//!              │ parent/child
//! Rooms       R0 ─── R1
//!              │       │
//! Places      p0─p1─p2 p3─p4      (intra-layer sibling edges)
//!
//! Objects     o0  o1
//! Agents      a0─a1─a2─a3         (trajectory)
//! ```
//!
//! Layers are totally ordered; every node lives in exactly one layer and
//! carries a position, color, semantic label, and a layer-specific payload.
//! Node identifiers are globally unique and stable across merges.

mod layer;
mod node;
mod scene_graph;

pub use layer::{LayerId, SceneGraphLayer, SceneGraphNode};
pub use node::{LayerPayload, NodeAttributes, NodeId};
pub use scene_graph::SceneGraph;
