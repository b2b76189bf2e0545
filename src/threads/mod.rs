//! Thread management for the backend daemon.
//!
//! This module provides two threads:
//! - `BackendThread`: runs the correction cycle at a fixed rate
//! - `VisualizerThread`: snapshots the shared or private graph for rendering
//!
//! Both poll the same shutdown flag and finish their current tick before
//! exiting.

mod backend_thread;
mod visualizer_thread;

pub use backend_thread::{BackendThread, BackendThreadConfig};
pub use visualizer_thread::{
    DisplaySource, SceneGraphSink, SnapshotSink, VisualizerConfig, VisualizerHandle,
    VisualizerThread, VizCommand,
};
