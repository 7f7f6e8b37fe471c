//! Elevation data model and the source boundary contract.
//!
//! An [`ElevationSource`] is the engine's only window onto elevation data:
//! given a tile key it asynchronously yields a grid of samples or a
//! not-available status. Sources must be safe to call concurrently for
//! distinct keys; the streaming layer coalesces duplicate in-flight
//! requests for the same key, so sources never see them.
//!
//! # Ownership
//!
//! A fetched [`ElevationGrid`] is owned exclusively by the tile request that
//! produced it until it is handed to the mesh builder; the built mesh then
//! owns the derived geometry and the grid is dropped.

mod synthetic;

pub use synthetic::SyntheticSource;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::coord::{CardinalDirection, TileKey};

/// Errors surfaced by elevation sources.
///
/// The taxonomy matters downstream: `NotAvailable` degrades to a flat
/// placeholder tile, `Transient` is retried with backoff before degrading,
/// and `Cancelled` is dropped silently.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source has no data for this region. Not a user-facing error.
    #[error("No elevation data available for {0}")]
    NotAvailable(TileKey),

    /// Network/IO failure that may succeed on retry.
    #[error("Transient fetch failure for {key}: {reason}")]
    Transient { key: TileKey, reason: String },

    /// The request was cancelled cooperatively.
    #[error("Fetch cancelled for {0}")]
    Cancelled(TileKey),
}

/// A fixed-size square grid of elevation samples for one tile.
///
/// Samples are meters above the ellipsoid, row-major, row 0 along the
/// tile's northern edge. The sample lattice includes both edges, so a grid
/// of size N covers the tile with N-1 intervals per side.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    size: usize,
    samples: Vec<f32>,
    /// Ground resolution of the underlying data in meters per sample,
    /// recorded for diagnostics; 0.0 for synthetic/placeholder grids.
    resolution_m: f64,
}

impl ElevationGrid {
    /// Creates a grid from row-major samples.
    ///
    /// Returns `None` when `samples.len() != size * size` or `size < 2`;
    /// a grid can never exist in an internally inconsistent state.
    pub fn new(size: usize, samples: Vec<f32>, resolution_m: f64) -> Option<Self> {
        if size < 2 || samples.len() != size * size {
            return None;
        }
        Some(Self {
            size,
            samples,
            resolution_m,
        })
    }

    /// An all-zero grid, used for placeholder tiles where the source has
    /// no data.
    pub fn flat(size: usize) -> Self {
        Self {
            size,
            samples: vec![0.0; size * size],
            resolution_m: 0.0,
        }
    }

    /// Samples per side.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Source ground resolution in meters per sample.
    pub fn resolution_m(&self) -> f64 {
        self.resolution_m
    }

    /// Sample at (row, col). Row 0 is the northern edge.
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of range; callers iterate the grid's
    /// own dimensions.
    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> f32 {
        self.samples[row * self.size + col]
    }

    /// Raw row-major samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Minimum and maximum sample values.
    pub fn min_max(&self) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &s in &self.samples {
            min = min.min(s);
            max = max.max(s);
        }
        (min, max)
    }

    /// Extracts the edge strip along the given side, west-to-east for
    /// north/south edges and north-to-south for east/west edges.
    pub fn edge(&self, side: CardinalDirection) -> Vec<f32> {
        let n = self.size;
        match side {
            CardinalDirection::North => (0..n).map(|c| self.sample(0, c)).collect(),
            CardinalDirection::South => (0..n).map(|c| self.sample(n - 1, c)).collect(),
            CardinalDirection::East => (0..n).map(|r| self.sample(r, n - 1)).collect(),
            CardinalDirection::West => (0..n).map(|r| self.sample(r, 0)).collect(),
        }
    }
}

/// Edge samples from a neighboring tile, possibly at coarser resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeStrip {
    samples: Vec<f32>,
}

impl EdgeStrip {
    /// Creates a strip; needs at least the two corner samples.
    pub fn new(samples: Vec<f32>) -> Option<Self> {
        if samples.len() < 2 {
            return None;
        }
        Some(Self { samples })
    }

    /// Derives a coarser strip by keeping every `factor`-th sample.
    ///
    /// This is how a tile synthesizes the edge its coarser neighbor
    /// renders: the decimated strip is the neighbor-resolution view of the
    /// shared border. Returns `None` when the interval count is not
    /// divisible by `factor` (grids sized 2^k + 1 always divide evenly).
    pub fn decimate_from(samples: &[f32], factor: usize) -> Option<Self> {
        if factor == 0 || samples.len() < 2 || (samples.len() - 1) % factor != 0 {
            return None;
        }
        Self::new(samples.iter().copied().step_by(factor).collect())
    }

    /// Number of samples in the strip.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the strip is at full resolution for a grid of `size`.
    pub fn matches_resolution(&self, size: usize) -> bool {
        self.samples.len() == size
    }

    /// Linearly interpolates the strip at parametric position `t` in [0, 1].
    pub fn sample_at(&self, t: f64) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let scaled = t * (self.samples.len() - 1) as f64;
        let i = scaled.floor() as usize;
        if i + 1 >= self.samples.len() {
            return self.samples[self.samples.len() - 1];
        }
        let frac = (scaled - i as f64) as f32;
        self.samples[i] * (1.0 - frac) + self.samples[i + 1] * frac
    }
}

/// Neighbor edge samples for all four sides of a tile.
///
/// A side is `None` when the neighbor's data is unknown (not yet resident,
/// or past a pole); the mesh builder then uses the tile's own edge heights
/// for that side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborEdges {
    strips: [Option<EdgeStrip>; 4],
}

impl NeighborEdges {
    /// No neighbor information at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the strip along one side.
    pub fn with_side(mut self, side: CardinalDirection, strip: EdgeStrip) -> Self {
        self.strips[side.index()] = Some(strip);
        self
    }

    /// The strip along one side, if known.
    pub fn side(&self, side: CardinalDirection) -> Option<&EdgeStrip> {
        self.strips[side.index()].as_ref()
    }
}

/// Asynchronous elevation data source.
///
/// Implementations must be `Send + Sync`; the worker pool calls `fetch`
/// concurrently for distinct keys. The returned future resolves to the
/// tile's sample grid or a [`SourceError`].
///
/// Uses a boxed future for dyn-compatibility (`Arc<dyn ElevationSource>`),
/// so decorators (caching, fault injection) can wrap any source.
pub trait ElevationSource: Send + Sync {
    /// Fetches the elevation grid for a tile.
    fn fetch(&self, key: TileKey) -> BoxFuture<'static, Result<ElevationGrid, SourceError>>;

    /// The grid size this source produces, samples per side.
    fn grid_size(&self) -> usize;
}
