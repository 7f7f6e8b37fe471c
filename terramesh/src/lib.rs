//! Terramesh - terrain LOD and tessellation for a virtual globe
//!
//! This library turns a planet-scale elevation dataset into a
//! view-dependent triangle mesh that renders at interactive rates from
//! any altitude. It continuously balances visual fidelity against fixed
//! per-frame triangle and memory budgets, streams elevation data
//! asynchronously without ever stalling the frame thread, and keeps
//! geometry continuous across tile boundaries and LOD transitions.
//!
//! # Architecture
//!
//! ```text
//! CameraState ──► LodSelector ──► SelectionResult ──► FrameAssembler ──► DrawList
//!                     │                  │
//!                 TileCache ◄── StreamingCoordinator ◄── missing tiles
//!                     ▲                  │
//!              completion channel   worker pool: ElevationSource ──► MeshBuilder
//! ```
//!
//! One frame thread owns selection, the cache, and assembly; a bounded
//! tokio worker pool runs fetch+build pipelines and hands results back
//! through a completion channel drained at the start of each frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use terramesh::{
//!     AttributeRegistry, CameraState, EngineConfig, SyntheticSource, TerrainEngine,
//! };
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let mut engine = TerrainEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(SyntheticSource::new()),
//!     AttributeRegistry::empty(),
//!     runtime.handle(),
//! )
//! .unwrap();
//!
//! let camera = CameraState::look_at_geodetic(
//!     46.5, 8.0, 500_000.0, // eye: above the Alps
//!     46.5, 8.0, 0.0,       // target: straight down
//!     60.0_f64.to_radians(),
//!     1920, 1080,
//! );
//! let draw_list = engine.render_frame(&camera);
//! println!("{} tiles, {} triangles", draw_list.commands().len(), draw_list.triangle_count());
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod elevation;
mod engine;
pub mod error;
pub mod frame;
pub mod geodetic;
pub mod mesh;
pub mod registry;
pub mod select;
pub mod stream;
pub mod telemetry;

pub use cache::{CacheBudget, CacheEntry, EntryState, TileCache};
pub use config::{ConfigError, EngineConfig};
pub use coord::{CardinalDirection, CoordError, TileBounds, TileKey};
pub use elevation::{ElevationGrid, ElevationSource, NeighborEdges, SourceError, SyntheticSource};
pub use engine::TerrainEngine;
pub use error::EngineError;
pub use frame::{DrawCommand, DrawList, FrameAssembler, GraphicsSink, SubmitError};
pub use mesh::{BoundingSphere, MeshBuilder, MeshError, TileMesh};
pub use registry::{AttributeRegistry, AttributeValue};
pub use select::{CameraState, EdgeLodMask, LodSelector, SelectionResult, SelectorConfig};
pub use stream::{Priority, RetryPolicy, StreamingCoordinator};
pub use telemetry::{FrameMetrics, TelemetrySnapshot};
