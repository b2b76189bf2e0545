//! Messages exchanged with the front-end producer.
//!
//! Pose-graph and mesh-graph updates arrive as batches of nodes and relative
//! constraints; batches submitted between two processing cycles are
//! concatenated, never replaced.

use serde::{Deserialize, Serialize};

use crate::core::types::Pose3;
use crate::graph::NodeId;

/// Type of constraint carried by an update edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Sequential odometry constraint between consecutive poses.
    Odometry,
    /// Loop closure constraint between non-adjacent poses.
    LoopClosure,
    /// Mesh-to-mesh deformation constraint.
    MeshMesh,
    /// Pose-to-mesh-vertex deformation constraint.
    PoseMesh,
}

/// A pose node inside an update batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseGraphNodeMsg {
    /// External pose-graph key.
    pub key: u64,
    /// Capture timestamp in microseconds.
    pub stamp_us: u64,
    /// Pose estimate.
    pub pose: Pose3,
}

/// A constraint edge inside an update batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseGraphEdgeMsg {
    /// Source key.
    pub from: u64,
    /// Target key.
    pub to: u64,
    /// Relative transform `from^{-1} * to`.
    pub relative: Pose3,
    /// Constraint type.
    pub kind: EdgeKind,
}

impl PoseGraphEdgeMsg {
    /// Create an odometry edge.
    pub fn odometry(from: u64, to: u64, relative: Pose3) -> Self {
        Self {
            from,
            to,
            relative,
            kind: EdgeKind::Odometry,
        }
    }

    /// Create a loop closure edge.
    pub fn loop_closure(from: u64, to: u64, relative: Pose3) -> Self {
        Self {
            from,
            to,
            relative,
            kind: EdgeKind::LoopClosure,
        }
    }
}

/// An incremental pose-graph (or mesh-graph) update batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseGraphUpdate {
    /// New pose nodes.
    pub nodes: Vec<PoseGraphNodeMsg>,
    /// New constraint edges.
    pub edges: Vec<PoseGraphEdgeMsg>,
    /// Batch timestamp in microseconds (latest sensor stamp).
    pub stamp_us: u64,
}

impl PoseGraphUpdate {
    /// Concatenate another batch onto this one, keeping arrival order.
    pub fn merge(&mut self, other: PoseGraphUpdate) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.stamp_us = self.stamp_us.max(other.stamp_us);
    }

    /// Number of loop-closure edges in the batch.
    pub fn num_loop_closures(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| e.kind == EdgeKind::LoopClosure)
            .count()
    }
}

/// A loop closure proposed by the front-end's place recognition.
///
/// References agent nodes in the shared graph; resolved to external
/// pose-graph keys when the proposal queue is drained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopClosureProposal {
    /// Agent node observed earlier.
    pub from_node: NodeId,
    /// Agent node observed later.
    pub to_node: NodeId,
    /// Relative transform from `from_node`'s frame to `to_node`'s frame.
    pub to_t_from: Pose3,
}

/// Archived record of an accepted loop closure. Append-only, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopClosureRecord {
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Relative transform.
    pub relative: Pose3,
    /// Whether the closure came from the scene-graph place recognition
    /// (true) or arrived inside a pose-graph update batch (false).
    pub from_scene_graph: bool,
}
