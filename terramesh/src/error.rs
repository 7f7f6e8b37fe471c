//! Top-level error type.
//!
//! Tile-level failures never surface here: the frame loop absorbs them
//! through graceful degradation (placeholder tiles, coarser stand-ins).
//! `EngineError` covers what can actually fail at the API boundary:
//! construction and direct use of the component types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coord::CoordError;
use crate::elevation::SourceError;
use crate::mesh::MeshError;

/// Errors surfaced by the engine's public API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration at startup.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid tile coordinates.
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// Mesh building failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// Elevation source failure.
    #[error(transparent)]
    Source(#[from] SourceError),
}
