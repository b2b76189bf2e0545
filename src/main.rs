//! vastu-dsg - Incremental 3D scene graph backend daemon.
//!
//! Merges a front-end's growing scene graph into a private copy, corrects it
//! through a deformation-graph optimizer, and maintains derived room and
//! building structure.
//!
//! # Usage
//!
//! ```bash
//! # With default config
//! cargo run --release
//!
//! # With custom config file
//! cargo run --release -- --config vastu-dsg.toml
//! ```

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;

use vastu_dsg::engine::{
    BackendConfig, InterpolatingDeformer, SceneGraphBackend, StoredStateSolver,
};
use vastu_dsg::state::{create_shared_graph, create_update_buffer};
use vastu_dsg::threads::{
    BackendThread, BackendThreadConfig, SnapshotSink, VisualizerConfig, VisualizerThread,
};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    backend: BackendCfg,
    /// Required: deformation (optimizer) sub-configuration.
    deformation: Option<DeformationCfg>,
    #[serde(default)]
    building: BuildingCfg,
    #[serde(default)]
    visualizer: VisualizerCfg,
    #[serde(default)]
    logging: LoggingCfg,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BackendCfg {
    /// Robot id (selects agent key prefixes).
    robot_id: u8,
    /// Cycle rate in Hz.
    loop_rate_hz: f32,
    /// Run full optimization when updates arrive and a loop closure exists.
    optimize_on_loop_closure: bool,
    /// Allow update functions to merge equivalent nodes within a layer.
    enable_node_merging: bool,
    /// Run the cheap refresh path on cycles without optimization.
    call_update_periodically: bool,
    /// Rebuild place anchors into the solver before optimizing.
    add_places_to_deformation_graph: bool,
    /// Position threshold for place merging (meters).
    places_merge_pos_threshold_m: f64,
    /// Obstacle-distance tolerance for place merging (meters).
    places_merge_distance_tolerance_m: f64,
}

impl Default for BackendCfg {
    fn default() -> Self {
        Self {
            robot_id: 0,
            loop_rate_hz: 2.0,
            optimize_on_loop_closure: true,
            enable_node_merging: true,
            call_update_periodically: true,
            add_places_to_deformation_graph: true,
            places_merge_pos_threshold_m: 0.4,
            places_merge_distance_tolerance_m: 0.3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DeformationCfg {
    /// Control points blended per mesh vertex.
    num_interp_points: usize,
    /// Temporal interpolation horizon (seconds).
    interp_horizon_s: f64,
}

impl Default for DeformationCfg {
    fn default() -> Self {
        Self {
            num_interp_points: 4,
            interp_horizon_s: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BuildingCfg {
    /// Building node color as 0-1 RGB.
    color: Vec<f64>,
    /// Building node semantic label.
    semantic_label: u8,
}

impl Default for BuildingCfg {
    fn default() -> Self {
        Self {
            // purple
            color: vec![0.662, 0.0313, 0.7607],
            semantic_label: 22,
        }
    }
}

impl BuildingCfg {
    /// Convert the configured color to RGB bytes, falling back to the
    /// default when malformed.
    fn color_rgb(&self) -> [u8; 3] {
        if self.color.len() != 3 {
            log::error!(
                "Supplied building color has {} components, expected 3; using default",
                self.color.len()
            );
            return BuildingCfg::default().color_rgb();
        }
        let mut rgb = [0u8; 3];
        for (i, c) in self.color.iter().enumerate() {
            rgb[i] = ((c * 255.0) as i64).clamp(0, 255) as u8;
        }
        rgb
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct VisualizerCfg {
    /// Enable the visualizer thread.
    enabled: bool,
    /// Redraw rate in Hz.
    rate_hz: f32,
    /// Start on the front-end (shared) graph instead of the backend one.
    show_frontend_graph: bool,
}

impl Default for VisualizerCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_hz: 5.0,
            show_frontend_graph: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
struct LoggingCfg {
    /// Enable per-cycle status logging.
    enabled: bool,
    /// Directory for log output.
    path: Option<String>,
}

// ============================================================================
// CLI Arguments
// ============================================================================

struct Args {
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args { config_path: None };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    result.config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    result
}

fn print_help() {
    println!("vastu-dsg - incremental scene graph backend daemon");
    println!();
    println!("USAGE:");
    println!("    vastu-dsg [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>     Configuration file (default: vastu-dsg.toml)");
    println!("    -h, --help              Print help information");
    println!();
    println!("CONFIGURATION:");
    println!("    All settings are configured via the TOML config file:");
    println!("    - [backend] loop_rate_hz, optimize_on_loop_closure, ...");
    println!("    - [deformation] num_interp_points, interp_horizon_s (required)");
    println!("    - [visualizer] enabled, rate_hz, show_frontend_graph");
    println!("    - [logging] enabled, path");
    println!();
    println!("THREADS:");
    println!("    The daemon runs with 2 fixed threads:");
    println!("    - Backend Thread: merge + optimization cycle");
    println!("    - Visualizer Thread: scene graph snapshots for rendering");
}

fn load_config(args: &Args) -> Config {
    match &args.config_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => match basic_toml::from_str(&contents) {
                Ok(cfg) => {
                    log::info!("Loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    log::warn!("Failed to parse config {}: {}", path, e);
                    Config::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read config {}: {}", path, e);
                Config::default()
            }
        },
        None => {
            // Try default paths
            for path in &["vastu-dsg.toml", "/etc/vastu-dsg.toml"] {
                if let Ok(contents) = fs::read_to_string(path)
                    && let Ok(cfg) = basic_toml::from_str(&contents)
                {
                    log::info!("Loaded config from {}", path);
                    return cfg;
                }
            }
            Config::default()
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = parse_args();
    let config = load_config(&args);

    // The optimizer sub-configuration is the one section the backend cannot
    // default its way around.
    let Some(deformation) = &config.deformation else {
        log::error!("Missing required [deformation] config section");
        std::process::exit(1);
    };

    log::info!("vastu-dsg starting");
    log::info!("  Backend rate: {} Hz", config.backend.loop_rate_hz);
    log::info!(
        "  Optimize on loop closure: {}",
        config.backend.optimize_on_loop_closure
    );
    log::info!(
        "  Deformation: {} interp points, {:.1}s horizon",
        deformation.num_interp_points,
        deformation.interp_horizon_s
    );

    // Setup signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .expect("Error setting Ctrl-C handler");

    if let Err(e) = run_threaded_mode(&config, running) {
        log::error!("Daemon error: {}", e);
    }

    log::info!("vastu-dsg shutdown complete");
}

// ============================================================================
// Multi-Threaded Daemon
// ============================================================================

fn run_threaded_mode(
    config: &Config,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Initializing scene graph backend daemon...");

    let deformation = config
        .deformation
        .as_ref()
        .expect("checked by main before spawning");

    // 1. Shared containers: front-end graph, private graph, update buffer.
    let shared = create_shared_graph();
    let private = create_shared_graph();
    let updates = create_update_buffer();
    log::info!("  Shared state initialized");

    // 2. Backend configuration.
    let log_dir = if config.logging.enabled {
        match &config.logging.path {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                log::error!("Status logging enabled but no logging path configured");
                None
            }
        }
    } else {
        None
    };

    let backend_config = BackendConfig {
        robot_id: config.backend.robot_id,
        optimize_on_loop_closure: config.backend.optimize_on_loop_closure,
        enable_node_merging: config.backend.enable_node_merging,
        update_periodically: config.backend.call_update_periodically,
        add_places_to_deformation_graph: config.backend.add_places_to_deformation_graph,
        places_merge_pos_threshold_m: config.backend.places_merge_pos_threshold_m,
        places_merge_distance_tolerance_m: config.backend.places_merge_distance_tolerance_m,
        num_interp_points: deformation.num_interp_points,
        interp_horizon_s: deformation.interp_horizon_s,
        building_color: config.building.color_rgb(),
        building_semantic_label: config.building.semantic_label,
        log_dir,
    };

    // 3. Backend over the built-in store-only solver. A deployment wires a
    // real optimizer here.
    let backend = SceneGraphBackend::new(
        backend_config,
        shared.clone(),
        private.clone(),
        updates.clone(),
        Box::new(StoredStateSolver::new()),
        Box::new(InterpolatingDeformer::new()),
    )?;
    log::info!("  Backend initialized (store-only solver)");

    // 4. Spawn threads.
    let backend_thread = BackendThread::spawn(
        BackendThreadConfig {
            loop_rate_hz: config.backend.loop_rate_hz,
        },
        backend,
        running.clone(),
    );
    log::info!("  Backend thread started");

    let visualizer_thread = if config.visualizer.enabled {
        let (thread, _viz_handle) = VisualizerThread::spawn(
            VisualizerConfig {
                rate_hz: config.visualizer.rate_hz,
                show_shared_graph: config.visualizer.show_frontend_graph,
            },
            shared.clone(),
            private.clone(),
            Box::new(SnapshotSink::new()),
            running.clone(),
        );
        log::info!(
            "  Visualizer thread started ({} Hz)",
            config.visualizer.rate_hz
        );
        Some(thread)
    } else {
        log::info!("  Visualizer thread disabled");
        None
    };

    log::info!("Scene graph backend daemon running");

    // 5. Wait for shutdown signal (main thread just monitors).
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutdown signal received, waiting for threads...");

    // 6. Join threads.
    if let Err(e) = backend_thread.join() {
        log::error!("Backend thread panicked: {:?}", e);
    }
    if let Some(thread) = visualizer_thread
        && let Err(e) = thread.join()
    {
        log::error!("Visualizer thread panicked: {:?}", e);
    }

    log::info!("All threads stopped");
    Ok(())
}
