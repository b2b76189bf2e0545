//! Per-cycle status counters and their append-only CSV log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::graph::{LayerId, SceneGraph};

/// Status logging errors.
#[derive(Error, Debug)]
pub enum StatusLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters collected over a single backend cycle.
///
/// Created fresh every cycle (via [`BackendStatus::reset`]) and consumed by
/// logging at cycle end; never persisted across cycles.
#[derive(Debug, Clone, Default)]
pub struct BackendStatus {
    /// Loop closures recorded over the whole run.
    pub total_loop_closures: usize,
    /// Loop closures recorded this cycle.
    pub new_loop_closures: usize,
    /// Factors accumulated over the whole run.
    pub total_factors: usize,
    /// Values accumulated over the whole run.
    pub total_values: usize,
    /// Factors added this cycle (pose graph + mesh graph).
    pub new_factors: usize,
    /// Mesh-graph factors added this cycle.
    pub new_graph_factors: usize,
    /// Trajectory length in poses.
    pub trajectory_len: usize,
    /// Wall time of the cycle so far, seconds.
    pub spin_time_s: f64,
    /// Wall time of the optimization step, seconds.
    pub optimize_time_s: f64,
    /// Wall time of the mesh deformation step, seconds.
    pub mesh_update_time_s: f64,
}

impl BackendStatus {
    /// Reset all counters for a new cycle.
    pub fn reset(&mut self) {
        *self = BackendStatus::default();
    }
}

/// Append-only CSV status log with a one-time header.
#[derive(Debug)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    /// File name of the status log inside the log directory.
    pub const FILE_NAME: &'static str = "backend_status.csv";

    /// Create the log file and write the header row.
    pub fn create(log_dir: &Path) -> Result<Self, StatusLogError> {
        let path = log_dir.join(Self::FILE_NAME);
        let mut file = File::create(&path)?;
        writeln!(
            file,
            "total_lc,new_lc,total_factors,total_values,new_factors,new_graph_factors,\
             trajectory_len,spin_time_s,optimize_time_s,mesh_update_time_s"
        )?;
        Ok(Self { path })
    }

    /// Append one status record.
    pub fn append(&self, status: &BackendStatus) -> Result<(), StatusLogError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(
            file,
            "{},{},{},{},{},{},{},{:.6},{:.6},{:.6}",
            status.total_loop_closures,
            status.new_loop_closures,
            status.total_factors,
            status.total_values,
            status.new_factors,
            status.new_graph_factors,
            status.trajectory_len,
            status.spin_time_s,
            status.optimize_time_s,
            status.mesh_update_time_s,
        )?;
        Ok(())
    }
}

/// Append-only CSV log of per-layer graph sizes, written once per merge.
#[derive(Debug)]
pub struct GraphLog {
    path: PathBuf,
    merges: u64,
}

impl GraphLog {
    /// File name of the graph log inside the log directory.
    pub const FILE_NAME: &'static str = "backend_graph.csv";

    /// Create the log file and write the header row.
    pub fn create(log_dir: &Path) -> Result<Self, StatusLogError> {
        let path = log_dir.join(Self::FILE_NAME);
        let mut file = File::create(&path)?;
        writeln!(file, "merge,layer,nodes,edges")?;
        Ok(Self { path, merges: 0 })
    }

    /// Append one row per layer for the current merge.
    pub fn append(&mut self, graph: &SceneGraph) -> Result<(), StatusLogError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        for layer_id in LayerId::ALL {
            let layer = graph.layer(layer_id);
            writeln!(
                file,
                "{},{:?},{},{}",
                self.merges,
                layer_id,
                layer.num_nodes(),
                layer.num_edges()
            )?;
        }
        self.merges += 1;
        Ok(())
    }
}
