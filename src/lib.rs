//! VastuDSG - Incremental 3D scene graph backend.
//!
//! Maintains a hierarchical spatial scene graph for a mapping pipeline: a
//! shared, continuously-growing graph produced by a front-end is
//! periodically merged into a private back-end copy, corrected through a
//! deformation-graph optimizer, and annotated with rooms and buildings
//! derived from the corrected geometry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    threads/                         │  ← Backend + visualizer loops
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     engine/                         │  ← Merge, correction, structure
//! │      (merger, deformation, anchors, rooms)          │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   state/   io/                      │  ← Shared containers, exports
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                 graph/   core/                      │  ← Scene graph, foundation types
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Threads
//!
//! Three threads touch the shared state: the external producer (front-end
//! callbacks into [`state::UpdateBuffer`] and [`state::SharedSceneGraph`]),
//! the backend loop, and the visualizer loop. Locking discipline:
//!
//! - the update lock is held only for buffer appends and the cycle-start
//!   drain, never across solver or merge calls
//! - the shared-graph lock covers producer writes and the merge copy-out
//! - the private-graph lock covers merge + correction + structure updates on
//!   the backend side and snapshot/redraw on the visualizer side
//! - loop-closure proposals have their own lock so ingestion is never
//!   blocked by a long merge

// Layer 1: Core foundation (no internal deps)
pub mod core;

// Layer 2: Scene graph data model
pub mod graph;

// Layer 3: Shared state and front-end messages
pub mod state;

// Layer 4: Persistence
pub mod io;

// Layer 5: Backend orchestration
pub mod engine;

// Layer 6: Thread infrastructure
pub mod threads;
