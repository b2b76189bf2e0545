//! Backend orchestration: merge, correction, structure maintenance.
//!
//! # Cycle data flow
//!
//! ```text
//!  producer callbacks          backend cycle (spin_once)
//!  ──────────────────          ─────────────────────────────────────────
//!  UpdateBuffer  ─────drain──▶ solver factors + trajectory + LC archive
//!  proposal queue ────drain──▶ solver constraints + LC archive
//!  SharedSceneGraph ──merge──▶ PrivateSceneGraph ──▶ optimize / refresh
//!                                      │
//!                                      ▼
//!                              layer update functions
//!                              rooms / building maintenance
//! ```
//!
//! The optimizer, mesh deformer, and room detector are consumed through
//! traits; the backend orchestrates when they run and how their outputs are
//! absorbed.

mod anchors;
mod backend;
mod deformation;
mod layer_updates;
mod merger;
mod rooms;

pub use anchors::{SpanningTreeInfo, build_anchor_set, minimum_spanning_tree};
pub use backend::{BackendConfig, BackendHandle, BackendInitError, SceneGraphBackend};
pub use deformation::{
    DeformationSolver, InterpolatingDeformer, MeshDeformer, PoseCorrections, StoredStateSolver,
    Trajectory,
};
pub use layer_updates::{
    CorrectedValues, LayerUpdateFn, default_update_functions, update_agents, update_buildings,
    update_objects, update_places, update_rooms,
};
pub use merger::GraphMerger;
pub use rooms::{BUILDING_NODE, RoomDetector, StructureMaintainer};
