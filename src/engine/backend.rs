//! Backend cycle sequencing.
//!
//! `SceneGraphBackend` owns the private working graph, the deformation
//! solver, and all per-cycle bookkeeping. One call to [`spin_once`] is one
//! cycle:
//!
//! 1. drain buffered pose/mesh-graph updates into the solver (update lock,
//!    held briefly)
//! 2. drain loop-closure proposals, archiving and constraining each
//! 3. under the private-graph lock: merge front-end changes, then either run
//!    full optimization (new updates + a loop closure on record) or the
//!    cheap periodic refresh, then flag the private graph updated
//! 4. append the status record, run room/building maintenance
//!
//! Nothing in steady state propagates an error across the loop boundary;
//! per-cycle failures are logged and the next tick proceeds.
//!
//! [`spin_once`]: SceneGraphBackend::spin_once

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;

use crate::graph::{LayerPayload, NodeId, SceneGraph};
use crate::io::export::{ExportError, save_mesh_ply, save_trajectory_csv};
use crate::io::status_log::{BackendStatus, GraphLog, StatusLog};
use crate::state::{
    EdgeKind, GraphState, LoopClosureRecord, PoseGraphUpdate, SharedSceneGraphHandle,
    UpdateBufferHandle,
};

use super::anchors::build_anchor_set;
use super::deformation::{DeformationSolver, MeshDeformer, Trajectory};
use super::layer_updates::{LayerUpdateFn, default_update_functions};
use super::merger::GraphMerger;
use super::rooms::{RoomDetector, StructureMaintainer};

/// Backend construction errors. Startup-time only; once the loop is running
/// every failure is local to its cycle.
#[derive(Error, Debug)]
pub enum BackendInitError {
    #[error("invalid deformation config: {0}")]
    InvalidDeformationConfig(&'static str),
}

/// Backend policy and tuning knobs.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Robot id, selects the agent key prefix.
    pub robot_id: u8,
    /// Run full optimization when updates arrive and a loop closure exists.
    pub optimize_on_loop_closure: bool,
    /// Allow layer update functions to merge equivalent nodes.
    pub enable_node_merging: bool,
    /// Run the cheap refresh path on cycles without optimization.
    pub update_periodically: bool,
    /// Rebuild place anchors into the solver before optimizing.
    pub add_places_to_deformation_graph: bool,
    /// Position threshold for place merging, meters.
    pub places_merge_pos_threshold_m: f64,
    /// Obstacle-distance tolerance for place merging, meters.
    pub places_merge_distance_tolerance_m: f64,
    /// Control points blended per mesh vertex during deformation.
    pub num_interp_points: usize,
    /// Temporal interpolation horizon, seconds.
    pub interp_horizon_s: f64,
    /// Building node display color.
    pub building_color: [u8; 3],
    /// Building node semantic label.
    pub building_semantic_label: u8,
    /// Directory for the status log; `None` disables status logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            robot_id: 0,
            optimize_on_loop_closure: true,
            enable_node_merging: true,
            update_periodically: true,
            add_places_to_deformation_graph: true,
            places_merge_pos_threshold_m: 0.4,
            places_merge_distance_tolerance_m: 0.3,
            num_interp_points: 4,
            interp_horizon_s: 10.0,
            building_color: [168, 7, 193],
            building_semantic_label: 22,
            log_dir: None,
        }
    }
}

/// The incremental scene graph backend.
pub struct SceneGraphBackend {
    config: BackendConfig,
    shared: SharedSceneGraphHandle,
    private: SharedSceneGraphHandle,
    updates: UpdateBufferHandle,
    solver: Box<dyn DeformationSolver>,
    deformer: Box<dyn MeshDeformer>,
    merger: GraphMerger,
    structures: StructureMaintainer,
    update_funcs: Vec<LayerUpdateFn>,
    trajectory: Arc<Mutex<Trajectory>>,
    loop_closures: Vec<LoopClosureRecord>,
    num_loop_closures: usize,
    have_loop_closures: bool,
    last_timestamp_us: u64,
    agent_prefix: char,
    status: BackendStatus,
    status_log: Option<StatusLog>,
}

impl SceneGraphBackend {
    /// Create a backend over the shared/private graph pair.
    ///
    /// Fails when the deformation configuration is unusable; a status log
    /// that cannot be created is reported and disabled, not fatal.
    pub fn new(
        config: BackendConfig,
        shared: SharedSceneGraphHandle,
        private: SharedSceneGraphHandle,
        updates: UpdateBufferHandle,
        solver: Box<dyn DeformationSolver>,
        deformer: Box<dyn MeshDeformer>,
    ) -> Result<Self, BackendInitError> {
        if config.num_interp_points == 0 {
            return Err(BackendInitError::InvalidDeformationConfig(
                "num_interp_points must be at least 1",
            ));
        }
        if config.interp_horizon_s <= 0.0 {
            return Err(BackendInitError::InvalidDeformationConfig(
                "interp_horizon_s must be positive",
            ));
        }

        let mut merger = GraphMerger::new();
        let status_log = match &config.log_dir {
            Some(dir) => {
                match GraphLog::create(dir) {
                    Ok(graph_log) => merger.set_graph_log(graph_log),
                    Err(e) => {
                        log::error!("Failed to create graph log in {}: {}", dir.display(), e)
                    }
                }
                match StatusLog::create(dir) {
                    Ok(log_file) => {
                        log::info!("Logging backend status to {}", dir.display());
                        Some(log_file)
                    }
                    Err(e) => {
                        log::error!("Failed to create status log in {}: {}", dir.display(), e);
                        None
                    }
                }
            }
            None => None,
        };

        let update_funcs = default_update_functions(
            config.places_merge_pos_threshold_m,
            config.places_merge_distance_tolerance_m,
        );
        let structures = StructureMaintainer::new(
            None,
            config.building_color,
            config.building_semantic_label,
        );
        let agent_prefix = (b'a' + config.robot_id) as char;

        Ok(Self {
            config,
            shared,
            private,
            updates,
            solver,
            deformer,
            merger,
            structures,
            update_funcs,
            trajectory: Arc::new(Mutex::new(Trajectory::new())),
            loop_closures: Vec::new(),
            num_loop_closures: 0,
            have_loop_closures: false,
            last_timestamp_us: 0,
            agent_prefix,
            status: BackendStatus::default(),
            status_log,
        })
    }

    /// Attach a room detector.
    pub fn with_room_detector(mut self, detector: Box<dyn RoomDetector>) -> Self {
        self.structures.set_detector(detector);
        self
    }

    /// Handle for on-demand operations from the owning process.
    pub fn handle(&self) -> BackendHandle {
        BackendHandle {
            private: self.private.clone(),
            trajectory: self.trajectory.clone(),
        }
    }

    /// Archived loop closures, in acceptance order.
    pub fn loop_closures(&self) -> &[LoopClosureRecord] {
        &self.loop_closures
    }

    /// Status counters of the most recent cycle.
    pub fn status(&self) -> &BackendStatus {
        &self.status
    }

    /// Run one backend cycle.
    pub fn spin_once(&mut self) {
        let spin_start = Instant::now();
        self.status.reset();
        let prev_loop_closures = self.num_loop_closures;

        // Drain buffered front-end updates. The update lock is released
        // before any solver call below.
        let pending = self.updates.drain();
        let mut have_graph_updates = false;
        if let Some(pose_graph) = &pending.pose_graph {
            self.status.new_factors += pose_graph.edges.len();
            self.process_pose_graph(pose_graph);
            have_graph_updates = true;
        }
        if let Some(mesh_graph) = &pending.mesh_graph {
            self.status.new_graph_factors = mesh_graph.edges.len();
            self.status.new_factors += mesh_graph.edges.len();
            self.solver.process_mesh_graph(mesh_graph);
            have_graph_updates = true;
        }
        self.last_timestamp_us = self.last_timestamp_us.max(pending.last_stamp_us);

        self.process_proposals();

        if self.num_loop_closures > prev_loop_closures {
            log::warn!(
                "New loop closures detected ({} total)",
                self.num_loop_closures
            );
        }
        if self.num_loop_closures > 0 {
            self.status.total_loop_closures = self.num_loop_closures;
            self.status.new_loop_closures = self.num_loop_closures - prev_loop_closures;
            self.have_loop_closures = true;
        }
        self.status.trajectory_len = self
            .trajectory
            .lock()
            .expect("trajectory lock poisoned")
            .len();
        self.status.total_factors = self.solver.num_factors();
        self.status.total_values = self.solver.num_values();

        // Private graph critical section: merge, correct, flag.
        {
            let private = self.private.clone();
            let mut state = private.lock();
            self.merger.merge_frontend(&self.shared, &mut state);

            if have_graph_updates && self.config.optimize_on_loop_closure && self.have_loop_closures
            {
                let started = Instant::now();
                self.optimize(&mut state);
                self.status.optimize_time_s = started.elapsed().as_secs_f64();
            } else if self.config.update_periodically {
                self.update_mesh(&mut state);
                self.call_update_functions(&mut state.graph);
            }
        }
        self.private.mark_updated();

        self.status.spin_time_s = spin_start.elapsed().as_secs_f64();
        if have_graph_updates
            && let Some(log_file) = &self.status_log
            && let Err(e) = log_file.append(&self.status)
        {
            log::error!("Failed to append status record: {}", e);
        }

        self.structures.update_rooms(&self.private);
        self.structures.update_building(&self.private);
    }

    /// Absorb a drained pose-graph batch: trajectory growth, loop-closure
    /// archival, solver factors.
    fn process_pose_graph(&mut self, update: &PoseGraphUpdate) {
        {
            let mut trajectory = self.trajectory.lock().expect("trajectory lock poisoned");
            for node in &update.nodes {
                trajectory.push(node.key, node.stamp_us, node.pose);
            }
        }

        for edge in &update.edges {
            if edge.kind != EdgeKind::LoopClosure {
                continue;
            }
            self.loop_closures.push(LoopClosureRecord {
                from: NodeId::new(self.agent_prefix, edge.from),
                to: NodeId::new(self.agent_prefix, edge.to),
                relative: edge.relative,
                from_scene_graph: false,
            });
            self.num_loop_closures += 1;
        }

        self.solver.process_pose_graph(update);
    }

    /// Drain queued loop-closure proposals; each accepted proposal becomes
    /// exactly one solver constraint and one archive record.
    ///
    /// A proposal referencing an agent node absent from the shared graph is
    /// rejected and logged; the cycle continues.
    fn process_proposals(&mut self) {
        let proposals = self.shared.drain_proposals();
        if proposals.is_empty() {
            return;
        }

        let shared = self.shared.clone();
        let state = shared.lock();
        for proposal in proposals {
            let from_key = agent_external_key(&state.graph, proposal.from_node);
            let to_key = agent_external_key(&state.graph, proposal.to_node);
            let (Some(from_key), Some(to_key)) = (from_key, to_key) else {
                log::error!(
                    "Dropping loop closure {} -> {}: unresolvable agent node",
                    proposal.from_node,
                    proposal.to_node
                );
                continue;
            };

            self.solver
                .add_constraint(from_key, to_key, proposal.to_t_from);
            self.loop_closures.push(LoopClosureRecord {
                from: proposal.from_node,
                to: proposal.to_node,
                relative: proposal.to_t_from,
                from_scene_graph: true,
            });
            self.num_loop_closures += 1;
            self.have_loop_closures = true;
        }
    }

    /// Full optimization path.
    fn optimize(&mut self, state: &mut GraphState) {
        if self.config.add_places_to_deformation_graph {
            build_anchor_set(self.solver.as_mut(), self.merger.places_copy());
        }

        self.solver.optimize();

        let values = self.solver.corrected_values();
        self.trajectory
            .lock()
            .expect("trajectory lock poisoned")
            .apply_corrections(&values);

        self.update_mesh(state);
        self.call_update_functions(&mut state.graph);
    }

    /// Re-deform the latest raw mesh with the known corrections.
    ///
    /// No new mesh since the last deformation, or an empty payload, is a
    /// benign skip.
    fn update_mesh(&mut self, state: &mut GraphState) {
        let Some(raw) = self.updates.take_new_mesh() else {
            return;
        };
        if raw.mesh.is_empty() {
            return;
        }

        let started = Instant::now();
        let corrections = self
            .trajectory
            .lock()
            .expect("trajectory lock poisoned")
            .corrections();
        let deformed = self.deformer.deform(
            &raw.mesh,
            &raw.vertex_stamps_us,
            &corrections,
            self.config.num_interp_points,
            self.config.interp_horizon_s,
        );
        state.graph.set_mesh(deformed);
        self.status.mesh_update_time_s = started.elapsed().as_secs_f64();
    }

    /// Invoke the fixed-order layer update functions.
    fn call_update_functions(&self, graph: &mut SceneGraph) {
        let anchor_values = self.solver.corrected_anchor_values();
        let pose_values = self.solver.corrected_values();
        for func in &self.update_funcs {
            func(
                graph,
                &anchor_values,
                &pose_values,
                self.config.enable_node_merging,
            );
        }
    }
}

/// Resolve an agent node to its external pose-graph key.
fn agent_external_key(graph: &SceneGraph, node: NodeId) -> Option<u64> {
    match &graph.node(node)?.attributes.payload {
        LayerPayload::Agent { external_key, .. } => Some(*external_key),
        _ => None,
    }
}

/// On-demand operations on a running backend.
#[derive(Clone)]
pub struct BackendHandle {
    private: SharedSceneGraphHandle,
    trajectory: Arc<Mutex<Trajectory>>,
}

impl BackendHandle {
    /// Save the current corrected mesh as ASCII PLY.
    pub fn save_mesh(&self, path: &Path) -> Result<(), ExportError> {
        let state = self.private.lock();
        match state.graph.mesh() {
            Some(mesh) => save_mesh_ply(mesh, path),
            None => Err(ExportError::Empty("no deformed mesh yet")),
        }
    }

    /// Save the corrected trajectory with timestamps as CSV.
    pub fn save_trajectory(&self, path: &Path) -> Result<(), ExportError> {
        let trajectory = self.trajectory.lock().expect("trajectory lock poisoned");
        save_trajectory_csv(&trajectory, path)
    }
}
