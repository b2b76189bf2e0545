//! Threaded integration tests: producer callbacks, backend loop, and
//! visualizer loop running concurrently against the shared state.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use nalgebra::{Point3, Vector3};

use common::{RecordingSolver, SolverProbe, add_shared_place, odometry_batch};
use vastu_dsg::engine::{BackendConfig, InterpolatingDeformer, SceneGraphBackend};
use vastu_dsg::graph::LayerId;
use vastu_dsg::state::{create_shared_graph, create_update_buffer};
use vastu_dsg::threads::{
    BackendThread, BackendThreadConfig, SnapshotSink, VisualizerConfig, VisualizerThread,
};

#[test]
fn test_concurrent_producers_no_edge_lost() {
    let shared = create_shared_graph();
    let private = create_shared_graph();
    let updates = create_update_buffer();
    let probe = Arc::new(SolverProbe::default());

    let backend = SceneGraphBackend::new(
        BackendConfig::default(),
        shared.clone(),
        private.clone(),
        updates.clone(),
        Box::new(RecordingSolver::new(probe.clone())),
        Box::new(InterpolatingDeformer::new()),
    )
    .expect("valid config");

    let running = Arc::new(AtomicBool::new(true));
    let backend_thread = BackendThread::spawn(
        BackendThreadConfig { loop_rate_hz: 50.0 },
        backend,
        running.clone(),
    );

    // Two producers hammer the buffer while the backend drains it.
    let producers = 2;
    let batches = 40;
    let edges_per_batch = 3;
    let mut handles = Vec::new();
    for p in 0..producers {
        let updates = updates.clone();
        handles.push(thread::spawn(move || {
            for i in 0..batches {
                let start = (p * batches + i) * edges_per_batch;
                updates.ingest_pose_graph(odometry_batch(start as u64, edges_per_batch as u64, 0));
                thread::sleep(Duration::from_millis(1));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // A few more cycles to drain the tail, then shut down.
    thread::sleep(Duration::from_millis(200));
    running.store(false, Ordering::Relaxed);
    backend_thread.join().unwrap();

    assert_eq!(
        probe.pose_edges(),
        producers * batches * edges_per_batch,
        "every submitted edge must be processed exactly once"
    );
    assert_eq!(probe.optimize_calls(), 0);
}

#[test]
fn test_visualizer_snapshots_private_graph() {
    let shared = create_shared_graph();
    let private = create_shared_graph();
    let updates = create_update_buffer();
    let probe = Arc::new(SolverProbe::default());

    let backend = SceneGraphBackend::new(
        BackendConfig::default(),
        shared.clone(),
        private.clone(),
        updates.clone(),
        Box::new(RecordingSolver::new(probe)),
        Box::new(InterpolatingDeformer::new()),
    )
    .expect("valid config");

    let running = Arc::new(AtomicBool::new(true));
    let sink = SnapshotSink::new();
    let (viz_thread, viz_handle) = VisualizerThread::spawn(
        VisualizerConfig {
            rate_hz: 50.0,
            show_shared_graph: false,
        },
        shared.clone(),
        private.clone(),
        Box::new(sink.clone()),
        running.clone(),
    );
    let backend_thread = BackendThread::spawn(
        BackendThreadConfig { loop_rate_hz: 50.0 },
        backend,
        running.clone(),
    );

    // Produce a graph change and let both loops pick it up.
    add_shared_place(&shared, 0, Point3::new(0.0, 0.0, 0.0));
    add_shared_place(&shared, 1, Point3::new(1.0, 0.0, 0.0));
    shared.mark_updated();
    thread::sleep(Duration::from_millis(300));

    // Toggle to the shared graph and back; each switch forces a re-snapshot.
    viz_handle.show_shared();
    thread::sleep(Duration::from_millis(100));
    viz_handle.show_private();
    thread::sleep(Duration::from_millis(100));

    running.store(false, Ordering::Relaxed);
    backend_thread.join().unwrap();
    viz_thread.join().unwrap();

    assert!(sink.resets() >= 3, "initial snapshot plus two toggles");
    assert!(sink.redraws() >= 1, "backend updates must trigger redraws");
    let snapshot = sink.latest().expect("snapshot taken");
    assert_eq!(snapshot.layer(LayerId::Places).num_nodes(), 2);
}

#[test]
fn test_shutdown_finishes_current_cycle() {
    let shared = create_shared_graph();
    let private = create_shared_graph();
    let updates = create_update_buffer();
    let probe = Arc::new(SolverProbe::default());

    let backend = SceneGraphBackend::new(
        BackendConfig::default(),
        shared.clone(),
        private.clone(),
        updates.clone(),
        Box::new(RecordingSolver::with_offset(
            probe.clone(),
            Vector3::zeros(),
        )),
        Box::new(InterpolatingDeformer::new()),
    )
    .expect("valid config");

    let running = Arc::new(AtomicBool::new(true));
    let backend_thread = BackendThread::spawn(
        BackendThreadConfig { loop_rate_hz: 10.0 },
        backend,
        running.clone(),
    );

    updates.ingest_pose_graph(odometry_batch(0, 2, 1_000));
    thread::sleep(Duration::from_millis(300));

    running.store(false, Ordering::Relaxed);
    backend_thread.join().unwrap();

    // The in-flight updates were drained before exit.
    assert_eq!(probe.pose_edges(), 2);
    assert!(!updates.has_pending());
}
