//! Deformation solver and mesh deformer seams.
//!
//! The backend never implements optimization math itself; it drives a
//! [`DeformationSolver`] (factor accumulation + global correction) and a
//! [`MeshDeformer`] (geometry re-deformation from corrected poses) through
//! these traits. [`StoredStateSolver`] and [`InterpolatingDeformer`] are the
//! built-in reference implementations used by the daemon binary and the test
//! suite; a production deployment substitutes its own solver.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::core::types::{Pose3, StampedPose, TriMesh};
use crate::state::PoseGraphUpdate;

/// Global correction backend for the deformation graph.
///
/// Calls are blocking with no defined timeout; failures inside `optimize` are
/// opaque to the backend and are not retried.
pub trait DeformationSolver: Send {
    /// Absorb an incremental pose-graph batch (nodes become values, edges
    /// become factors).
    fn process_pose_graph(&mut self, update: &PoseGraphUpdate);

    /// Absorb an incremental mesh-graph batch.
    fn process_mesh_graph(&mut self, update: &PoseGraphUpdate);

    /// Add a loop-closure constraint between two pose keys.
    fn add_constraint(&mut self, from: u64, to: u64, relative: Pose3);

    /// Discard the temporary anchor structure from the previous pass.
    fn clear_anchors(&mut self);

    /// Add a deformation anchor with its current pose.
    fn add_anchor(&mut self, id: u64, pose: Pose3);

    /// Attach mesh-vertex correspondences to an anchor.
    fn add_anchor_valence(&mut self, id: u64, mesh_vertices: &[u64]);

    /// Add a relative constraint between two anchors (spanning edge).
    fn add_anchor_edge(&mut self, from: u64, to: u64, relative: Pose3);

    /// Run global optimization over all accumulated factors.
    fn optimize(&mut self);

    /// Corrected pose values, keyed by pose-graph key.
    fn corrected_values(&self) -> HashMap<u64, Pose3>;

    /// Corrected anchor (temporary) values, keyed by anchor id.
    fn corrected_anchor_values(&self) -> HashMap<u64, Pose3>;

    /// Total factor count (for status reporting).
    fn num_factors(&self) -> usize;

    /// Total value count (for status reporting).
    fn num_values(&self) -> usize;
}

/// Store-only solver: accumulates values and factors but never moves them.
///
/// `optimize` leaves every value at its input estimate, so corrections are
/// identities. This mirrors running the real solver in store-only mode and
/// keeps the full cycle exercisable without an optimization backend.
#[derive(Debug, Default)]
pub struct StoredStateSolver {
    values: HashMap<u64, Pose3>,
    anchors: HashMap<u64, Pose3>,
    anchor_valences: HashMap<u64, Vec<u64>>,
    num_factors: usize,
    optimize_calls: usize,
}

impl StoredStateSolver {
    /// Create an empty solver.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `optimize` has run.
    pub fn optimize_calls(&self) -> usize {
        self.optimize_calls
    }
}

impl DeformationSolver for StoredStateSolver {
    fn process_pose_graph(&mut self, update: &PoseGraphUpdate) {
        for node in &update.nodes {
            self.values.entry(node.key).or_insert(node.pose);
        }
        self.num_factors += update.edges.len();
    }

    fn process_mesh_graph(&mut self, update: &PoseGraphUpdate) {
        for node in &update.nodes {
            self.values.entry(node.key).or_insert(node.pose);
        }
        self.num_factors += update.edges.len();
    }

    fn add_constraint(&mut self, _from: u64, _to: u64, _relative: Pose3) {
        self.num_factors += 1;
    }

    fn clear_anchors(&mut self) {
        self.anchors.clear();
        self.anchor_valences.clear();
    }

    fn add_anchor(&mut self, id: u64, pose: Pose3) {
        self.anchors.insert(id, pose);
    }

    fn add_anchor_valence(&mut self, id: u64, mesh_vertices: &[u64]) {
        self.anchor_valences.insert(id, mesh_vertices.to_vec());
    }

    fn add_anchor_edge(&mut self, _from: u64, _to: u64, _relative: Pose3) {
        self.num_factors += 1;
    }

    fn optimize(&mut self) {
        self.optimize_calls += 1;
    }

    fn corrected_values(&self) -> HashMap<u64, Pose3> {
        self.values.clone()
    }

    fn corrected_anchor_values(&self) -> HashMap<u64, Pose3> {
        self.anchors.clone()
    }

    fn num_factors(&self) -> usize {
        self.num_factors
    }

    fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// Pose corrections as time-stamped control points, sorted by stamp.
///
/// Each control point pairs the pose as received with its corrected value;
/// the deformer blends the implied rigid displacements.
#[derive(Debug, Clone, Default)]
pub struct PoseCorrections {
    /// Capture timestamps, ascending.
    pub stamps_us: Vec<u64>,
    /// (received, corrected) pose pairs, parallel to `stamps_us`.
    pub poses: Vec<(Pose3, Pose3)>,
}

impl PoseCorrections {
    /// Whether there are no control points.
    pub fn is_empty(&self) -> bool {
        self.stamps_us.is_empty()
    }
}

/// The received trajectory with per-pose corrections.
///
/// Shared behind a mutex between the backend (writes during drain and after
/// optimization) and on-demand trajectory export (reads).
#[derive(Debug, Default)]
pub struct Trajectory {
    poses: Vec<StampedPose>,
    key_index: HashMap<u64, usize>,
}

impl Trajectory {
    /// Create an empty trajectory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of poses.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Whether the trajectory is empty.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Iterate over the stamped poses in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &StampedPose> {
        self.poses.iter()
    }

    /// Append a pose. A key seen before refreshes the stored estimate
    /// instead of appending a duplicate.
    pub fn push(&mut self, key: u64, stamp_us: u64, pose: Pose3) {
        match self.key_index.get(&key) {
            Some(&idx) => {
                self.poses[idx].pose = pose;
            }
            None => {
                self.key_index.insert(key, self.poses.len());
                self.poses.push(StampedPose::new(key, stamp_us, pose));
            }
        }
    }

    /// Overwrite corrected poses from solver output.
    pub fn apply_corrections(&mut self, values: &HashMap<u64, Pose3>) {
        for stamped in &mut self.poses {
            if let Some(corrected) = values.get(&stamped.key) {
                stamped.corrected = *corrected;
            }
        }
    }

    /// Snapshot the correction control points, sorted by stamp.
    pub fn corrections(&self) -> PoseCorrections {
        let mut indices: Vec<usize> = (0..self.poses.len()).collect();
        indices.sort_by_key(|&i| self.poses[i].stamp_us);

        let mut corrections = PoseCorrections::default();
        for i in indices {
            let stamped = &self.poses[i];
            corrections.stamps_us.push(stamped.stamp_us);
            corrections.poses.push((stamped.pose, stamped.corrected));
        }
        corrections
    }
}

/// Mesh re-deformation from corrected poses.
///
/// Pure function of its inputs; the backend owns when it runs.
pub trait MeshDeformer: Send {
    /// Deform `mesh` using the pose corrections.
    ///
    /// Each vertex is corrected from control points near its capture stamp:
    /// up to `num_interp_points` control points within `horizon_s` seconds
    /// are blended; a stamp outside all control points extrapolates from the
    /// nearest ones.
    fn deform(
        &self,
        mesh: &TriMesh,
        vertex_stamps_us: &[u64],
        corrections: &PoseCorrections,
        num_interp_points: usize,
        horizon_s: f64,
    ) -> TriMesh;
}

/// Reference deformer: blends the rigid displacements of nearby control
/// points, weighted by inverse temporal distance.
#[derive(Debug, Default)]
pub struct InterpolatingDeformer;

impl InterpolatingDeformer {
    /// Create a deformer.
    pub fn new() -> Self {
        Self
    }

    /// Indices of up to `count` control points nearest in time to `stamp`,
    /// preferring points within the horizon but falling back to the nearest
    /// ones when the stamp lies outside all of them.
    fn control_window(
        stamps: &[u64],
        stamp_us: u64,
        count: usize,
        horizon_us: u64,
    ) -> Vec<usize> {
        if stamps.is_empty() || count == 0 {
            return Vec::new();
        }

        // Walk outward from the insertion point, nearest first.
        let split = stamps.partition_point(|&s| s < stamp_us);
        let mut lo = split;
        let mut hi = split;
        let mut window = Vec::with_capacity(count);
        while window.len() < count && (lo > 0 || hi < stamps.len()) {
            let below = lo.checked_sub(1).map(|i| stamp_us.abs_diff(stamps[i]));
            let above = (hi < stamps.len()).then(|| stamp_us.abs_diff(stamps[hi]));
            match (below, above) {
                (Some(b), Some(a)) if b <= a => {
                    lo -= 1;
                    window.push(lo);
                }
                (_, Some(_)) => {
                    window.push(hi);
                    hi += 1;
                }
                (Some(_), None) => {
                    lo -= 1;
                    window.push(lo);
                }
                (None, None) => break,
            }
        }

        // Keep in-horizon points when any exist; otherwise extrapolate from
        // the single nearest point.
        let in_horizon: Vec<usize> = window
            .iter()
            .copied()
            .filter(|&i| stamp_us.abs_diff(stamps[i]) <= horizon_us)
            .collect();
        if !in_horizon.is_empty() {
            in_horizon
        } else {
            window.truncate(1);
            window
        }
    }
}

impl MeshDeformer for InterpolatingDeformer {
    fn deform(
        &self,
        mesh: &TriMesh,
        vertex_stamps_us: &[u64],
        corrections: &PoseCorrections,
        num_interp_points: usize,
        horizon_s: f64,
    ) -> TriMesh {
        if corrections.is_empty() {
            return mesh.clone();
        }

        let horizon_us = (horizon_s * 1e6) as u64;
        let mut deformed = mesh.clone();
        for (i, vertex) in deformed.vertices.iter_mut().enumerate() {
            let stamp_us = vertex_stamps_us.get(i).copied().unwrap_or(0);
            let window = Self::control_window(
                &corrections.stamps_us,
                stamp_us,
                num_interp_points,
                horizon_us,
            );
            if window.is_empty() {
                continue;
            }

            let point = Point3::new(vertex.x as f64, vertex.y as f64, vertex.z as f64);
            let mut blended = nalgebra::Vector3::zeros();
            let mut total_weight = 0.0;
            for idx in window {
                let dt_s = stamp_us.abs_diff(corrections.stamps_us[idx]) as f64 * 1e-6;
                let weight = 1.0 / (1.0 + dt_s);
                let (received, corrected) = &corrections.poses[idx];
                let moved = corrected * (received.inverse() * point);
                blended += weight * moved.coords;
                total_weight += weight;
            }
            let result = blended / total_weight;
            *vertex = Point3::new(result.x as f32, result.y as f32, result.z as f32);
        }
        deformed
    }
}
