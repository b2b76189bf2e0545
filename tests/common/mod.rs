//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{Point3, Vector3};

use vastu_dsg::core::types::{Pose3, pose_from_position};
use vastu_dsg::engine::DeformationSolver;
use vastu_dsg::graph::{LayerId, LayerPayload, NodeAttributes, NodeId};
use vastu_dsg::state::{PoseGraphUpdate, SharedSceneGraph};

/// Observable counters for a solver that has been moved into a backend.
#[derive(Debug, Default)]
pub struct SolverProbe {
    pub optimize_calls: AtomicUsize,
    pub constraints: AtomicUsize,
    pub pose_edges: AtomicUsize,
    pub mesh_edges: AtomicUsize,
}

impl SolverProbe {
    pub fn optimize_calls(&self) -> usize {
        self.optimize_calls.load(Ordering::SeqCst)
    }

    pub fn constraints(&self) -> usize {
        self.constraints.load(Ordering::SeqCst)
    }

    pub fn pose_edges(&self) -> usize {
        self.pose_edges.load(Ordering::SeqCst)
    }

    pub fn mesh_edges(&self) -> usize {
        self.mesh_edges.load(Ordering::SeqCst)
    }
}

/// Solver stub that records calls through a shared probe and applies a fixed
/// translation offset to every value once optimization has run.
pub struct RecordingSolver {
    probe: Arc<SolverProbe>,
    values: HashMap<u64, Pose3>,
    anchors: HashMap<u64, Pose3>,
    num_factors: usize,
    optimized: bool,
    pub correction_offset: Vector3<f64>,
}

impl RecordingSolver {
    pub fn new(probe: Arc<SolverProbe>) -> Self {
        Self {
            probe,
            values: HashMap::new(),
            anchors: HashMap::new(),
            num_factors: 0,
            optimized: false,
            correction_offset: Vector3::zeros(),
        }
    }

    pub fn with_offset(probe: Arc<SolverProbe>, offset: Vector3<f64>) -> Self {
        let mut solver = Self::new(probe);
        solver.correction_offset = offset;
        solver
    }

    fn corrected(&self, source: &HashMap<u64, Pose3>) -> HashMap<u64, Pose3> {
        source
            .iter()
            .map(|(key, pose)| {
                let mut pose = *pose;
                if self.optimized {
                    pose.translation.vector += self.correction_offset;
                }
                (*key, pose)
            })
            .collect()
    }
}

impl DeformationSolver for RecordingSolver {
    fn process_pose_graph(&mut self, update: &PoseGraphUpdate) {
        for node in &update.nodes {
            self.values.entry(node.key).or_insert(node.pose);
        }
        self.num_factors += update.edges.len();
        self.probe
            .pose_edges
            .fetch_add(update.edges.len(), Ordering::SeqCst);
    }

    fn process_mesh_graph(&mut self, update: &PoseGraphUpdate) {
        self.num_factors += update.edges.len();
        self.probe
            .mesh_edges
            .fetch_add(update.edges.len(), Ordering::SeqCst);
    }

    fn add_constraint(&mut self, _from: u64, _to: u64, _relative: Pose3) {
        self.num_factors += 1;
        self.probe.constraints.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_anchors(&mut self) {
        self.anchors.clear();
    }

    fn add_anchor(&mut self, id: u64, pose: Pose3) {
        self.anchors.insert(id, pose);
    }

    fn add_anchor_valence(&mut self, _id: u64, _mesh_vertices: &[u64]) {}

    fn add_anchor_edge(&mut self, _from: u64, _to: u64, _relative: Pose3) {
        self.num_factors += 1;
    }

    fn optimize(&mut self) {
        self.optimized = true;
        self.probe.optimize_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn corrected_values(&self) -> HashMap<u64, Pose3> {
        self.corrected(&self.values)
    }

    fn corrected_anchor_values(&self) -> HashMap<u64, Pose3> {
        self.corrected(&self.anchors)
    }

    fn num_factors(&self) -> usize {
        self.num_factors
    }

    fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// Insert a place node into the shared graph (does not set the updated
/// flag).
pub fn add_shared_place(shared: &SharedSceneGraph, index: u64, position: Point3<f64>) {
    let mut state = shared.lock();
    let id = NodeId::new('p', index);
    state
        .graph
        .emplace_node(LayerId::Places, id, NodeAttributes::at(position, LayerId::Places));
    state.latest_places.insert(id);
}

/// Insert an agent node bound to an external pose-graph key.
pub fn add_shared_agent(shared: &SharedSceneGraph, index: u64, external_key: u64) {
    let mut state = shared.lock();
    let mut attrs = NodeAttributes::at(Point3::new(0.0, 0.0, 0.0), LayerId::Agents);
    attrs.payload = LayerPayload::Agent {
        external_key,
        stamp_us: 0,
    };
    state
        .graph
        .emplace_node(LayerId::Agents, NodeId::new('a', index), attrs);
}

/// Build an odometry chain update with one node and edge per step.
pub fn odometry_batch(start_key: u64, steps: u64, stamp_us: u64) -> PoseGraphUpdate {
    let mut update = PoseGraphUpdate {
        stamp_us,
        ..Default::default()
    };
    for i in 0..steps {
        let key = start_key + i;
        update.nodes.push(vastu_dsg::state::PoseGraphNodeMsg {
            key: key + 1,
            stamp_us: stamp_us + i * 1_000,
            pose: pose_from_position(Point3::new((key + 1) as f64, 0.0, 0.0)),
        });
        update.edges.push(vastu_dsg::state::PoseGraphEdgeMsg::odometry(
            key,
            key + 1,
            pose_from_position(Point3::new(1.0, 0.0, 0.0)),
        ));
    }
    update
}
