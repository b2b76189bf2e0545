//! Incremental update buffer between front-end callbacks and the backend
//! cycle.
//!
//! Producer callbacks append under the update lock and return immediately;
//! the backend drains everything in one atomic swap at cycle start. The lock
//! is never held across solver or merge calls.
//!
//! The latest raw mesh is retained across drains: deformation re-reads it,
//! and only the new-mesh flag is consumed, so re-deforming unchanged
//! geometry stays a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::types::RawMeshMsg;

use super::messages::PoseGraphUpdate;

/// Accumulated updates awaiting the next cycle.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    /// Coalesced pose-graph batches.
    pub pose_graph: Option<PoseGraphUpdate>,
    /// Coalesced mesh-graph batches.
    pub mesh_graph: Option<PoseGraphUpdate>,
    /// Latest batch timestamp seen, microseconds.
    pub last_stamp_us: u64,
}

/// State guarded by the update lock.
#[derive(Debug, Default)]
struct BufferState {
    pending: PendingUpdates,
    latest_mesh: Option<Arc<RawMeshMsg>>,
    have_new_mesh: bool,
}

/// Per-update-type accumulator shared with the producer.
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    state: Mutex<BufferState>,
    has_pending: AtomicBool,
}

impl UpdateBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pose-graph update batch (producer context).
    pub fn ingest_pose_graph(&self, update: PoseGraphUpdate) {
        let mut state = self.state.lock().expect("update buffer lock poisoned");
        state.pending.last_stamp_us = state.pending.last_stamp_us.max(update.stamp_us);
        match &mut state.pending.pose_graph {
            Some(pending) => pending.merge(update),
            None => state.pending.pose_graph = Some(update),
        }
        self.has_pending.store(true, Ordering::Release);
    }

    /// Append a mesh-graph update batch (producer context).
    pub fn ingest_mesh_graph(&self, update: PoseGraphUpdate) {
        let mut state = self.state.lock().expect("update buffer lock poisoned");
        state.pending.last_stamp_us = state.pending.last_stamp_us.max(update.stamp_us);
        match &mut state.pending.mesh_graph {
            Some(pending) => pending.merge(update),
            None => state.pending.mesh_graph = Some(update),
        }
        self.has_pending.store(true, Ordering::Release);
    }

    /// Replace the retained raw mesh and flag it as new (producer context).
    pub fn ingest_mesh(&self, mesh: RawMeshMsg) {
        let mut state = self.state.lock().expect("update buffer lock poisoned");
        state.latest_mesh = Some(Arc::new(mesh));
        state.have_new_mesh = true;
    }

    /// Cheap check for pending edge batches, without taking the lock.
    pub fn has_pending(&self) -> bool {
        self.has_pending.load(Ordering::Acquire)
    }

    /// Drain all pending edge batches atomically.
    ///
    /// Every ingested batch appears in exactly one drain. The retained raw
    /// mesh is not part of the drain; see [`UpdateBuffer::take_new_mesh`].
    pub fn drain(&self) -> PendingUpdates {
        let mut state = self.state.lock().expect("update buffer lock poisoned");
        self.has_pending.store(false, Ordering::Release);
        std::mem::take(&mut state.pending)
    }

    /// Consume the new-mesh flag, returning the retained mesh if it has not
    /// been deformed yet. Subsequent calls return `None` until a new mesh
    /// arrives.
    pub fn take_new_mesh(&self) -> Option<Arc<RawMeshMsg>> {
        let mut state = self.state.lock().expect("update buffer lock poisoned");
        if !state.have_new_mesh {
            return None;
        }
        state.have_new_mesh = false;
        state.latest_mesh.clone()
    }
}

/// Handle type for the update buffer.
pub type UpdateBufferHandle = Arc<UpdateBuffer>;

/// Create a new update buffer handle.
pub fn create_update_buffer() -> UpdateBufferHandle {
    Arc::new(UpdateBuffer::new())
}
