//! Tile mesh data model.
//!
//! A [`TileMesh`] is the immutable output of tessellating one tile's
//! elevation grid: vertex/index buffers in a local tangent-plane frame,
//! skirt geometry, and a bounding volume. Meshes are owned by the cache
//! and shared by reference (`Arc`) with the frame assembler.

mod builder;

pub use builder::{MeshBuilder, MeshError};

use glam::DVec3;

use crate::coord::TileKey;
use crate::geodetic::TangentFrame;

/// Sphere bounding a tile's geometry, in ECEF coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    /// Distance from a point to the sphere surface; zero inside.
    pub fn distance_to(&self, point: DVec3) -> f64 {
        ((point - self.center).length() - self.radius).max(0.0)
    }
}

/// Renderable mesh for one tile, in the tile's local tangent frame.
///
/// Immutable once built. Vertex positions are f32 and stay small because
/// the frame origin sits at the tile center; the frame carries the
/// local-to-ECEF transform for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMesh {
    key: TileKey,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    indices: Vec<u32>,
    skirt_index_start: u32,
    frame: TangentFrame,
    bounding_sphere: BoundingSphere,
    placeholder: bool,
}

impl TileMesh {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: TileKey,
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        indices: Vec<u32>,
        skirt_index_start: u32,
        frame: TangentFrame,
        bounding_sphere: BoundingSphere,
        placeholder: bool,
    ) -> Self {
        Self {
            key,
            positions,
            normals,
            indices,
            skirt_index_start,
            frame,
            bounding_sphere,
            placeholder,
        }
    }

    /// The tile this mesh was built from.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Vertex positions in the local tangent frame.
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Per-vertex normals in the local tangent frame.
    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    /// Triangle indices; skirt triangles start at
    /// [`skirt_index_start`](Self::skirt_index_start).
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Offset into [`indices`](Self::indices) where skirt triangles begin.
    pub fn skirt_index_start(&self) -> u32 {
        self.skirt_index_start
    }

    /// Local-to-ECEF transform for this mesh.
    pub fn frame(&self) -> &TangentFrame {
        &self.frame
    }

    /// Bounding sphere in ECEF coordinates.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    /// True for flat placeholder meshes built where the source had no data.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Approximate GPU/CPU footprint, used for the cache byte budget.
    pub fn size_bytes(&self) -> usize {
        self.positions.len() * std::mem::size_of::<[f32; 3]>() * 2
            + self.indices.len() * std::mem::size_of::<u32>()
    }
}
