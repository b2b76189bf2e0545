//! Persistence: on-demand exports and the per-cycle status log.

pub mod export;
pub mod status_log;

pub use export::{ExportError, save_mesh_ply, save_trajectory_csv};
pub use status_log::{BackendStatus, GraphLog, StatusLog, StatusLogError};
