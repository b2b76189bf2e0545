//! Jointly-owned scene graph container.
//!
//! `SharedSceneGraph` is used twice: once for the front-end's view (producer
//! writes, merger copies out) and once for the back-end's private copy
//! (backend writes, visualizer reads). Access pattern:
//! - graph + latest-places set: exclusive lock for any read or write
//! - `updated` flag: atomic, checked cheaply without taking the lock
//! - loop-closure proposals: own lock, so proposal ingestion is never
//!   blocked by a long merge holding the graph lock

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::graph::{NodeId, SceneGraph};

use super::messages::LoopClosureProposal;

/// Lock-guarded graph state.
#[derive(Debug, Default)]
pub struct GraphState {
    /// The scene graph.
    pub graph: SceneGraph,
    /// Place nodes touched since the producer's last write ("active" set).
    pub latest_places: HashSet<NodeId>,
}

/// A scene graph shared between threads.
#[derive(Debug, Default)]
pub struct SharedSceneGraph {
    state: Mutex<GraphState>,
    updated: AtomicBool,
    proposals: Mutex<VecDeque<LoopClosureProposal>>,
}

impl SharedSceneGraph {
    /// Create an empty shared graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the graph state.
    pub fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().expect("scene graph lock poisoned")
    }

    /// Set the updated flag (producer side, after writing new content).
    pub fn mark_updated(&self) {
        self.updated.store(true, Ordering::Release);
    }

    /// Read the updated flag without clearing it.
    pub fn is_updated(&self) -> bool {
        self.updated.load(Ordering::Acquire)
    }

    /// Clear the updated flag (consumer side, after absorbing the content).
    pub fn clear_updated(&self) {
        self.updated.store(false, Ordering::Release);
    }

    /// Read and clear the updated flag in one step.
    pub fn take_updated(&self) -> bool {
        self.updated.swap(false, Ordering::AcqRel)
    }

    /// Queue a loop-closure proposal (producer side, FIFO).
    pub fn push_proposal(&self, proposal: LoopClosureProposal) {
        self.proposals
            .lock()
            .expect("proposal queue lock poisoned")
            .push_back(proposal);
    }

    /// Drain all queued proposals in arrival order.
    ///
    /// The queue lock is released before the caller starts resolving
    /// proposals, so new proposals can arrive during resolution.
    pub fn drain_proposals(&self) -> Vec<LoopClosureProposal> {
        let mut queue = self.proposals.lock().expect("proposal queue lock poisoned");
        queue.drain(..).collect()
    }

    /// Number of queued proposals.
    pub fn num_pending_proposals(&self) -> usize {
        self.proposals
            .lock()
            .expect("proposal queue lock poisoned")
            .len()
    }
}

/// Handle type for a shared scene graph.
pub type SharedSceneGraphHandle = Arc<SharedSceneGraph>;

/// Create a new shared scene graph handle.
pub fn create_shared_graph() -> SharedSceneGraphHandle {
    Arc::new(SharedSceneGraph::new())
}
