//! Procedural elevation source.
//!
//! Generates fractal terrain from integer-hash value noise. There is no RNG
//! state anywhere: the same tile key always yields byte-identical samples,
//! which the cache and the determinism tests rely on. Used by the CLI demo
//! and as a stand-in source wherever real data plumbing is out of scope.

use futures::future::BoxFuture;

use super::{ElevationGrid, ElevationSource, SourceError};
use crate::coord::TileKey;

/// Default samples per grid side.
const DEFAULT_GRID_SIZE: usize = 65;

/// Default peak-to-trough amplitude in meters.
const DEFAULT_AMPLITUDE: f64 = 4000.0;

/// Octaves of fractal accumulation.
const OCTAVES: u32 = 5;

/// Deterministic procedural elevation over the whole globe.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    grid_size: usize,
    amplitude: f64,
}

impl SyntheticSource {
    /// Creates a source with the default grid size and amplitude.
    pub fn new() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            amplitude: DEFAULT_AMPLITUDE,
        }
    }

    /// Overrides the grid size (samples per side, minimum 2).
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size.max(2);
        self
    }

    /// Overrides the terrain amplitude in meters.
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Elevation at a lat/lon position in meters.
    ///
    /// Exposed so tests and the CLI can probe terrain without a fetch.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f32 {
        // Sample in a unit square derived from lat/lon so adjacent tiles
        // share edge values exactly.
        let u = (lon + 180.0) / 360.0;
        let v = (lat + 90.0) / 180.0;
        (fbm(u * 64.0, v * 32.0) * self.amplitude) as f32
    }

    fn build_grid(&self, key: TileKey) -> ElevationGrid {
        let n = self.grid_size;
        let bounds = key.bounds();
        let mut samples = Vec::with_capacity(n * n);
        for row in 0..n {
            // Row 0 along the northern edge
            let lat = bounds.north - bounds.lat_span() * row as f64 / (n - 1) as f64;
            for col in 0..n {
                let lon = bounds.west + bounds.lon_span() * col as f64 / (n - 1) as f64;
                samples.push(self.elevation_at(lat, lon));
            }
        }
        // Length is n*n by construction
        ElevationGrid::new(n, samples, 0.0).unwrap_or_else(|| ElevationGrid::flat(n))
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ElevationSource for SyntheticSource {
    fn fetch(&self, key: TileKey) -> BoxFuture<'static, Result<ElevationGrid, SourceError>> {
        let grid = self.build_grid(key);
        Box::pin(async move { Ok(grid) })
    }

    fn grid_size(&self) -> usize {
        self.grid_size
    }
}

/// 64-bit integer mix (splitmix64 finalizer).
#[inline]
fn hash2(x: i64, y: i64) -> u64 {
    let mut h = (x as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ (y as u64).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^= h >> 31;
    h
}

/// Hash mapped to [-1, 1].
#[inline]
fn lattice(x: i64, y: i64) -> f64 {
    (hash2(x, y) >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
}

/// Smoothstep-interpolated value noise at one frequency.
fn value_noise(x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    // Smoothstep weights keep the gradient continuous at cell borders
    let sx = fx * fx * (3.0 - 2.0 * fx);
    let sy = fy * fy * (3.0 - 2.0 * fy);

    let xi = x0 as i64;
    let yi = y0 as i64;
    let v00 = lattice(xi, yi);
    let v10 = lattice(xi + 1, yi);
    let v01 = lattice(xi, yi + 1);
    let v11 = lattice(xi + 1, yi + 1);

    let a = v00 + (v10 - v00) * sx;
    let b = v01 + (v11 - v01) * sx;
    a + (b - a) * sy
}

/// Fractal Brownian motion over [`OCTAVES`] octaves, output roughly [-1, 1].
fn fbm(x: f64, y: f64) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 0.5;
    let mut frequency = 1.0;
    for _ in 0..OCTAVES {
        total += value_noise(x * frequency, y * frequency) * amplitude;
        frequency *= 2.0;
        amplitude *= 0.5;
    }
    total
}
