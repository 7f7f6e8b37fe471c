//! Terramesh CLI - drives the terrain engine over a procedural globe.
//!
//! Flies a synthetic descent from orbit toward the surface, rendering one
//! frame per step and reporting how the frontier, cache, and streaming
//! pipeline behave. Useful for eyeballing LOD behavior and for profiling
//! without a renderer attached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use terramesh::frame::{DrawList, GraphicsSink, SubmitError};
use terramesh::{
    AttributeRegistry, CameraState, EngineConfig, SyntheticSource, TerrainEngine,
};

/// Synthetic flight over a procedural globe.
#[derive(Debug, Parser)]
#[command(name = "terramesh", version, about)]
struct Args {
    /// Number of frames to render.
    #[arg(long, default_value_t = 300)]
    frames: u32,

    /// Target frames per second for the simulated clock.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Screen-space error threshold in pixels.
    #[arg(long, default_value_t = 2.0)]
    pixel_error: f64,

    /// Elevation grid resolution (samples per side).
    #[arg(long, default_value_t = 65)]
    grid_size: usize,

    /// Deepest refinement level.
    #[arg(long, default_value_t = 14)]
    max_level: u8,

    /// Latitude the flight descends toward, degrees.
    #[arg(long, default_value_t = 46.5)]
    lat: f64,

    /// Longitude the flight descends toward, degrees.
    #[arg(long, default_value_t = 8.0)]
    lon: f64,

    /// Starting altitude in meters.
    #[arg(long, default_value_t = 2.0e7)]
    start_altitude: f64,

    /// Final altitude in meters.
    #[arg(long, default_value_t = 3_000.0)]
    end_altitude: f64,

    /// Report telemetry every N frames.
    #[arg(long, default_value_t = 30)]
    report_every: u32,
}

/// Sink that tallies submissions instead of rendering them.
struct StatsSink {
    submissions: u64,
    triangles: u64,
}

impl GraphicsSink for StatsSink {
    fn submit(&mut self, draw_list: &DrawList) -> Result<(), SubmitError> {
        self.submissions += 1;
        self.triangles += draw_list.triangle_count() as u64;
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to create Tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    let config = EngineConfig::default()
        .with_pixel_error_threshold(args.pixel_error)
        .with_grid_size(args.grid_size)
        .with_max_level(args.max_level);
    let source = Arc::new(SyntheticSource::new().with_grid_size(args.grid_size));

    let mut engine =
        match TerrainEngine::new(config, source, AttributeRegistry::empty(), runtime.handle()) {
            Ok(engine) => engine,
            Err(err) => {
                eprintln!("Failed to start engine: {err}");
                std::process::exit(1);
            }
        };

    info!(
        frames = args.frames,
        start_altitude = args.start_altitude,
        end_altitude = args.end_altitude,
        "starting synthetic descent"
    );

    let mut sink = StatsSink {
        submissions: 0,
        triangles: 0,
    };
    let frame_budget = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let started = Instant::now();

    for frame in 0..args.frames {
        let frame_started = Instant::now();

        // Exponential descent: equal altitude ratios per frame read as a
        // constant-speed dive on screen
        let t = frame as f64 / (args.frames.max(2) - 1) as f64;
        let altitude =
            args.start_altitude * (args.end_altitude / args.start_altitude).powf(t);
        let camera = CameraState::look_at_geodetic(
            args.lat,
            args.lon,
            altitude,
            args.lat + 0.1,
            args.lon,
            0.0,
            60.0_f64.to_radians(),
            1920,
            1080,
        );

        let draw_list = engine.render_frame(&camera);
        if let Err(err) = sink.submit(&draw_list) {
            eprintln!("Draw submission failed: {err}");
            break;
        }

        if frame % args.report_every.max(1) == 0 {
            info!(
                frame,
                altitude_m = altitude as u64,
                tiles = draw_list.commands().len(),
                pending = draw_list.pending(),
                triangles = draw_list.triangle_count(),
                cache_tiles = engine.cache().resident_count(),
                cache_mb = engine.cache().resident_bytes() / (1024 * 1024),
                "frame"
            );
        }

        // Hold the simulated frame rate without ever blocking on streaming
        if let Some(remaining) = frame_budget.checked_sub(frame_started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    let telemetry = engine.metrics().snapshot();
    let stream = engine.stream_stats();
    info!(elapsed = ?started.elapsed(), "descent complete");
    info!("telemetry: {telemetry}");
    info!(
        requested = stream.requested,
        completed = stream.completed,
        failed = stream.failed,
        dropped = stream.dropped,
        retried = stream.retried,
        cancelled = stream.cancelled,
        "streaming totals"
    );
    info!(
        submissions = sink.submissions,
        avg_triangles = sink.triangles / sink.submissions.max(1),
        "sink totals"
    );
}
