//! Tile tessellation.
//!
//! Converts an elevation grid into a [`TileMesh`]: each sample is mapped
//! through the tile's tangent frame, normals come from central differences
//! over the grid, and the regular grid is triangulated with a fixed
//! diagonal pattern. A skirt ring around the border drops vertically to
//! mask T-junction cracks against neighbors at a different LOD.
//!
//! Building is deterministic: identical inputs produce byte-identical
//! vertex and index buffers. The cache and the test suite both depend on
//! this.

use glam::DVec3;
use thiserror::Error;

use super::{BoundingSphere, TileMesh};
use crate::coord::{CardinalDirection, TileBounds, TileKey};
use crate::elevation::{ElevationGrid, NeighborEdges};
use crate::geodetic::{geodetic_to_ecef, TangentFrame};

/// Errors from mesh building.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The elevation grid does not match the builder's configured
    /// resolution. Permanent for this input; the tile request is failed.
    #[error("Invalid elevation grid for {key}: expected {expected}x{expected} samples, got {actual}x{actual}")]
    InvalidInput {
        key: TileKey,
        expected: usize,
        actual: usize,
    },
}

/// Builds tile meshes from elevation grids.
///
/// One builder serves all tiles; it holds only configuration and is safe
/// to share across worker threads.
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    grid_size: usize,
    skirt_depth: f64,
}

impl MeshBuilder {
    /// Creates a builder for the given grid resolution and skirt depth
    /// (meters).
    pub fn new(grid_size: usize, skirt_depth: f64) -> Self {
        Self {
            grid_size,
            skirt_depth,
        }
    }

    /// The grid resolution this builder accepts.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Tessellates one tile.
    ///
    /// # Arguments
    ///
    /// * `key` - The tile being built
    /// * `grid` - Elevation samples; must be `grid_size` per side
    /// * `edges` - Neighbor edge samples for skirt synthesis; missing sides
    ///   fall back to the tile's own edge heights
    ///
    /// # Errors
    ///
    /// `MeshError::InvalidInput` when the grid dimensions do not match the
    /// configured resolution.
    pub fn build(
        &self,
        key: TileKey,
        grid: &ElevationGrid,
        edges: &NeighborEdges,
    ) -> Result<TileMesh, MeshError> {
        self.build_inner(key, grid, edges, false)
    }

    /// Builds a flat placeholder mesh for a tile without source data.
    pub fn build_placeholder(&self, key: TileKey) -> TileMesh {
        let grid = ElevationGrid::flat(self.grid_size);
        match self.build_inner(key, &grid, &NeighborEdges::none(), true) {
            Ok(mesh) => mesh,
            // A flat grid of the configured size cannot be rejected
            Err(_) => unreachable!("flat grid matches configured size"),
        }
    }

    fn build_inner(
        &self,
        key: TileKey,
        grid: &ElevationGrid,
        edges: &NeighborEdges,
        placeholder: bool,
    ) -> Result<TileMesh, MeshError> {
        let n = self.grid_size;
        if grid.size() != n {
            return Err(MeshError::InvalidInput {
                key,
                expected: n,
                actual: grid.size(),
            });
        }

        let bounds = key.bounds();
        let (center_lat, center_lon) = bounds.center();
        let frame = TangentFrame::at(center_lat, center_lon, 0.0);

        // Surface vertices, row-major from the northwest corner
        let mut locals: Vec<DVec3> = Vec::with_capacity(n * n);
        for row in 0..n {
            let lat = bounds.north - bounds.lat_span() * row as f64 / (n - 1) as f64;
            for col in 0..n {
                let lon = bounds.west + bounds.lon_span() * col as f64 / (n - 1) as f64;
                let h = grid.sample(row, col) as f64;
                locals.push(frame.to_local(geodetic_to_ecef(lat, lon, h)));
            }
        }

        let mut positions: Vec<[f32; 3]> = locals
            .iter()
            .map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect();
        let mut normals = grid_normals(&locals, n);

        // Fixed-diagonal triangulation (SW-NE diagonal in every cell),
        // counter-clockwise seen from above
        let mut indices: Vec<u32> = Vec::with_capacity((n - 1) * (n - 1) * 6);
        for row in 0..n - 1 {
            for col in 0..n - 1 {
                let nw = (row * n + col) as u32;
                let ne = nw + 1;
                let sw = nw + n as u32;
                let se = sw + 1;
                indices.extend_from_slice(&[nw, sw, ne]);
                indices.extend_from_slice(&[ne, sw, se]);
            }
        }
        let skirt_index_start = indices.len() as u32;

        self.append_skirts(
            key, grid, edges, &frame, &bounds, &mut positions, &mut normals, &mut indices,
        );

        let bounding_sphere = bounding_sphere(&positions, &frame);

        Ok(TileMesh::new(
            key,
            positions,
            normals,
            indices,
            skirt_index_start,
            frame,
            bounding_sphere,
            placeholder,
        ))
    }

    /// Appends one skirt ring per side.
    ///
    /// The skirt top follows the coarser neighbor's interpolated heights
    /// when an edge strip is supplied, so the wall spans the gap a LOD
    /// mismatch opens; otherwise it starts at the tile's own edge heights.
    #[allow(clippy::too_many_arguments)]
    fn append_skirts(
        &self,
        _key: TileKey,
        grid: &ElevationGrid,
        edges: &NeighborEdges,
        frame: &TangentFrame,
        bounds: &TileBounds,
        positions: &mut Vec<[f32; 3]>,
        normals: &mut Vec<[f32; 3]>,
        indices: &mut Vec<u32>,
    ) {
        let n = self.grid_size;

        for side in CardinalDirection::ALL {
            // Border vertex indices for this side, in strip order
            let border: Vec<usize> = match side {
                CardinalDirection::North => (0..n).collect(),
                CardinalDirection::South => (0..n).map(|c| (n - 1) * n + c).collect(),
                CardinalDirection::East => (0..n).map(|r| r * n + (n - 1)).collect(),
                CardinalDirection::West => (0..n).map(|r| r * n).collect(),
            };
            let own_edge = grid.edge(side);
            let strip = edges.side(side);

            let ring_base = positions.len() as u32;
            for (i, &vi) in border.iter().enumerate() {
                let t = i as f64 / (n - 1) as f64;
                let top_h = match strip {
                    Some(s) => s.sample_at(t) as f64,
                    None => own_edge[i] as f64,
                };
                // Skirt vertices drop along the geodetic vertical at the
                // border position, not the frame's z axis, so walls stay
                // truly vertical on large tiles
                let (lat, lon) = border_lat_lon(bounds, side, t);
                let top = frame.to_local(geodetic_to_ecef(lat, lon, top_h));
                let bottom =
                    frame.to_local(geodetic_to_ecef(lat, lon, top_h - self.skirt_depth));
                positions.push([top.x as f32, top.y as f32, top.z as f32]);
                positions.push([bottom.x as f32, bottom.y as f32, bottom.z as f32]);
                // Walls reuse the surface normal of the border vertex
                let nrm = normals[vi];
                normals.push(nrm);
                normals.push(nrm);
            }

            for i in 0..n - 1 {
                let t0 = ring_base + (i as u32) * 2;
                let b0 = t0 + 1;
                let t1 = t0 + 2;
                let b1 = t0 + 3;
                indices.extend_from_slice(&[t0, b0, t1]);
                indices.extend_from_slice(&[t1, b0, b1]);
            }
        }
    }
}

/// Lat/lon of the point at parametric position `t` along a tile side.
fn border_lat_lon(bounds: &TileBounds, side: CardinalDirection, t: f64) -> (f64, f64) {
    match side {
        CardinalDirection::North => (bounds.north, bounds.west + bounds.lon_span() * t),
        CardinalDirection::South => (bounds.south, bounds.west + bounds.lon_span() * t),
        CardinalDirection::East => (bounds.north - bounds.lat_span() * t, bounds.east),
        CardinalDirection::West => (bounds.north - bounds.lat_span() * t, bounds.west),
    }
}

/// Per-vertex normals by central difference, one-sided at the borders.
fn grid_normals(locals: &[DVec3], n: usize) -> Vec<[f32; 3]> {
    let mut normals = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            let east = locals[row * n + (col + 1).min(n - 1)] - locals[row * n + col.saturating_sub(1)];
            let south = locals[(row + 1).min(n - 1) * n + col] - locals[row.saturating_sub(1) * n + col];
            // Row index grows southward, so south × east points up
            let normal = south.cross(east).normalize_or_zero();
            normals.push([normal.x as f32, normal.y as f32, normal.z as f32]);
        }
    }
    normals
}

/// Smallest sphere centered on the vertex AABB center, in ECEF.
fn bounding_sphere(positions: &[[f32; 3]], frame: &TangentFrame) -> BoundingSphere {
    let mut min = DVec3::splat(f64::INFINITY);
    let mut max = DVec3::splat(f64::NEG_INFINITY);
    for p in positions {
        let v = DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        min = min.min(v);
        max = max.max(v);
    }
    let center_local = (min + max) * 0.5;
    let mut radius_sq: f64 = 0.0;
    for p in positions {
        let v = DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        radius_sq = radius_sq.max(center_local.distance_squared(v));
    }
    BoundingSphere {
        center: frame.to_ecef(center_local),
        radius: radius_sq.sqrt(),
    }
}
