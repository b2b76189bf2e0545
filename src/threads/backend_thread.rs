//! Backend Thread - periodic scene graph correction.
//!
//! Runs the backend cycle at a fixed rate. The thread owns the
//! `SceneGraphBackend`; on-demand operations go through the
//! [`BackendHandle`](crate::engine::BackendHandle) taken before spawning.
//!
//! Shutdown is cooperative: the running flag is polled at each loop head,
//! the current cycle always completes, and the controlling thread joins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::engine::SceneGraphBackend;

/// Configuration for the backend thread.
#[derive(Debug, Clone)]
pub struct BackendThreadConfig {
    /// Cycle rate in Hz.
    pub loop_rate_hz: f32,
}

impl Default for BackendThreadConfig {
    fn default() -> Self {
        Self { loop_rate_hz: 2.0 }
    }
}

/// Backend thread handle.
pub struct BackendThread {
    handle: JoinHandle<()>,
}

impl BackendThread {
    /// Spawn the backend thread.
    pub fn spawn(
        config: BackendThreadConfig,
        backend: SceneGraphBackend,
        running: Arc<AtomicBool>,
    ) -> Self {
        let handle = thread::Builder::new()
            .name("backend".into())
            .spawn(move || run_backend_loop(config, backend, running))
            .expect("Failed to spawn backend thread");

        Self { handle }
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run_backend_loop(
    config: BackendThreadConfig,
    mut backend: SceneGraphBackend,
    running: Arc<AtomicBool>,
) {
    log::info!(
        "Backend thread starting ({:.1} Hz)",
        config.loop_rate_hz
    );
    let period = Duration::from_secs_f64(1.0 / config.loop_rate_hz.max(0.1) as f64);

    while running.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();

        backend.spin_once();

        // Sleep out the remainder of the tick, in slices so shutdown stays
        // responsive at low rates.
        while running.load(Ordering::Relaxed) {
            let elapsed = cycle_start.elapsed();
            if elapsed >= period {
                break;
            }
            thread::sleep((period - elapsed).min(Duration::from_millis(50)));
        }
    }

    log::info!("Backend thread shutting down");
}
