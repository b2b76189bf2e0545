//! Visualizer Thread - periodic scene graph snapshots for rendering.
//!
//! Runs independently of the backend at a low fixed rate. Each tick it
//! processes display-source commands, re-snapshots the selected graph into
//! the sink when a reset is pending, forwards the private graph's updated
//! flag, and redraws under the selected graph's lock. It never mutates
//! either graph.
//!
//! Rendering itself is external: anything that can consume a
//! [`SceneGraphSink`] (an RPC publisher, a recorder, the bundled
//! [`SnapshotSink`]) can be driven by this thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::graph::SceneGraph;
use crate::state::SharedSceneGraphHandle;

/// Where the visualizer pulls its graph from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySource {
    /// The front-end's shared graph.
    Shared,
    /// The backend's private (corrected) graph.
    Private,
}

/// Commands accepted by the visualizer thread.
#[derive(Debug, Clone, Copy)]
pub enum VizCommand {
    /// Display the shared graph (forces a reset if it was not selected).
    ShowShared,
    /// Display the private graph (forces a reset if it was not selected).
    ShowPrivate,
    /// Re-snapshot the selected graph.
    Reset,
}

/// Consumer of visualizer output.
pub trait SceneGraphSink: Send {
    /// Replace the sink's graph with a full snapshot.
    fn set_graph(&mut self, graph: &SceneGraph);

    /// Signal that the displayed graph has new content.
    fn mark_updated(&mut self);

    /// Redraw from the current graph. Called under the selected graph's
    /// lock.
    fn redraw(&mut self, graph: &SceneGraph);
}

/// Configuration for the visualizer thread.
#[derive(Debug, Clone)]
pub struct VisualizerConfig {
    /// Redraw rate in Hz.
    pub rate_hz: f32,
    /// Start on the shared (front-end) graph instead of the private one.
    pub show_shared_graph: bool,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            rate_hz: 5.0,
            show_shared_graph: false,
        }
    }
}

/// Handle for sending commands to a running visualizer thread.
#[derive(Clone)]
pub struct VisualizerHandle {
    tx: Sender<VizCommand>,
}

impl VisualizerHandle {
    /// Switch the display to the shared graph.
    pub fn show_shared(&self) {
        self.tx.send(VizCommand::ShowShared).ok();
    }

    /// Switch the display to the private graph.
    pub fn show_private(&self) {
        self.tx.send(VizCommand::ShowPrivate).ok();
    }

    /// Request a full re-snapshot.
    pub fn reset(&self) {
        self.tx.send(VizCommand::Reset).ok();
    }
}

/// Visualizer thread handle.
pub struct VisualizerThread {
    handle: JoinHandle<()>,
}

impl VisualizerThread {
    /// Spawn the visualizer thread.
    pub fn spawn(
        config: VisualizerConfig,
        shared: SharedSceneGraphHandle,
        private: SharedSceneGraphHandle,
        sink: Box<dyn SceneGraphSink>,
        running: Arc<AtomicBool>,
    ) -> (Self, VisualizerHandle) {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("visualizer".into())
            .spawn(move || run_visualizer_loop(config, shared, private, sink, rx, running))
            .expect("Failed to spawn visualizer thread");

        (Self { handle }, VisualizerHandle { tx })
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run_visualizer_loop(
    config: VisualizerConfig,
    shared: SharedSceneGraphHandle,
    private: SharedSceneGraphHandle,
    mut sink: Box<dyn SceneGraphSink>,
    rx: Receiver<VizCommand>,
    running: Arc<AtomicBool>,
) {
    log::info!("Visualizer thread starting ({:.1} Hz)", config.rate_hz);
    let period = Duration::from_secs_f64(1.0 / config.rate_hz.max(0.1) as f64);

    let mut source = if config.show_shared_graph {
        DisplaySource::Shared
    } else {
        DisplaySource::Private
    };
    // First tick always snapshots.
    let mut should_reset = true;

    while running.load(Ordering::Relaxed) {
        // Process pending display-source changes.
        while let Ok(command) = rx.try_recv() {
            match command {
                VizCommand::ShowShared => {
                    if source != DisplaySource::Shared {
                        should_reset = true;
                    }
                    source = DisplaySource::Shared;
                }
                VizCommand::ShowPrivate => {
                    if source != DisplaySource::Private {
                        should_reset = true;
                    }
                    source = DisplaySource::Private;
                }
                VizCommand::Reset => should_reset = true,
            }
        }

        let selected = match source {
            DisplaySource::Shared => &shared,
            DisplaySource::Private => &private,
        };

        if should_reset {
            let state = selected.lock();
            sink.set_graph(&state.graph);
            should_reset = false;
        }

        // The front-end updated flag propagates through the backend, so the
        // private flag is the one that tells us to redraw.
        if private.take_updated() {
            sink.mark_updated();
        }

        {
            let state = selected.lock();
            sink.redraw(&state.graph);
        }

        thread::sleep(period);
    }

    log::info!("Visualizer thread shutting down");
}

/// Sink that retains the latest snapshot for external consumers.
#[derive(Clone, Default)]
pub struct SnapshotSink {
    state: Arc<Mutex<SnapshotState>>,
}

#[derive(Default)]
struct SnapshotState {
    graph: Option<SceneGraph>,
    needs_redraw: bool,
    redraws: u64,
    resets: u64,
}

impl SnapshotSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot, if any redraw has happened.
    pub fn latest(&self) -> Option<SceneGraph> {
        self.state.lock().expect("snapshot lock poisoned").graph.clone()
    }

    /// Number of redraws that found new content.
    pub fn redraws(&self) -> u64 {
        self.state.lock().expect("snapshot lock poisoned").redraws
    }

    /// Number of full re-snapshots.
    pub fn resets(&self) -> u64 {
        self.state.lock().expect("snapshot lock poisoned").resets
    }
}

impl SceneGraphSink for SnapshotSink {
    fn set_graph(&mut self, graph: &SceneGraph) {
        let mut state = self.state.lock().expect("snapshot lock poisoned");
        state.graph = Some(graph.clone());
        state.resets += 1;
    }

    fn mark_updated(&mut self) {
        let mut state = self.state.lock().expect("snapshot lock poisoned");
        state.needs_redraw = true;
    }

    fn redraw(&mut self, graph: &SceneGraph) {
        let mut state = self.state.lock().expect("snapshot lock poisoned");
        if state.needs_redraw {
            state.graph = Some(graph.clone());
            state.needs_redraw = false;
            state.redraws += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LayerId, NodeAttributes, NodeId};
    use nalgebra::Point3;

    #[test]
    fn test_snapshot_sink_redraw_gated_on_update() {
        let sink = SnapshotSink::new();
        let mut boxed: Box<dyn SceneGraphSink> = Box::new(sink.clone());
        let graph = SceneGraph::new();

        boxed.redraw(&graph);
        assert_eq!(sink.redraws(), 0);

        boxed.mark_updated();
        boxed.redraw(&graph);
        assert_eq!(sink.redraws(), 1);
    }

    #[test]
    fn test_snapshot_sink_set_graph_counts_reset() {
        let sink = SnapshotSink::new();
        let mut boxed: Box<dyn SceneGraphSink> = Box::new(sink.clone());

        let mut graph = SceneGraph::new();
        graph.emplace_node(
            LayerId::Places,
            NodeId::new('p', 0),
            NodeAttributes::at(Point3::new(0.0, 0.0, 0.0), LayerId::Places),
        );
        boxed.set_graph(&graph);

        assert_eq!(sink.resets(), 1);
        assert_eq!(sink.latest().unwrap().num_nodes(), 1);
    }
}
