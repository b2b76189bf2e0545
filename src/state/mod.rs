//! Shared state between the producer, backend, and visualizer threads.
//!
//! This module provides:
//! - `SharedSceneGraph`: the jointly-owned graph container with its updated
//!   flag and separately-locked loop-closure proposal queue
//! - `UpdateBuffer`: the coalescing accumulator for asynchronous pose-graph
//!   and mesh-graph update batches
//! - Front-end message types (`PoseGraphUpdate`, `LoopClosureProposal`, ...)

mod messages;
mod shared;
mod updates;

pub use messages::{
    EdgeKind, LoopClosureProposal, LoopClosureRecord, PoseGraphEdgeMsg, PoseGraphNodeMsg,
    PoseGraphUpdate,
};
pub use shared::{GraphState, SharedSceneGraph, SharedSceneGraphHandle, create_shared_graph};
pub use updates::{PendingUpdates, UpdateBuffer, UpdateBufferHandle, create_update_buffer};
