//! Frame assembly.
//!
//! The last step of the frame loop: resolve each selected tile's resident
//! mesh and emit the draw list for the graphics submission sink. This is
//! a pure read: the selector already guaranteed a resident stand-in for
//! everything that can be drawn, so assembly never waits on anything.
//!
//! Draw commands carry no ordering requirement; tiles are depth-tested.

use std::sync::Arc;

use glam::DMat4;
use thiserror::Error;
use tracing::trace;

use crate::cache::TileCache;
use crate::mesh::TileMesh;
use crate::registry::{well_known, AttributeRegistry};
use crate::select::SelectionResult;

/// One tile's draw submission.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    /// Shared reference to the cached mesh; valid for this frame.
    pub mesh: Arc<TileMesh>,
    /// Overlay texture handle from the attribute registry, if configured.
    pub texture: Option<u64>,
    /// Local-to-ECEF transform for the mesh's vertex buffer.
    pub transform: DMat4,
}

/// Draw list for one frame.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
    /// Selected tiles that had no resident mesh yet (cold-start
    /// stand-ins still streaming).
    pending: usize,
    frame_number: u64,
}

impl DrawList {
    /// Draw commands in selection order.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of selected tiles skipped because their mesh is still
    /// streaming.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// The frame this list was assembled for.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Total triangles across all commands.
    pub fn triangle_count(&self) -> usize {
        self.commands.iter().map(|c| c.mesh.triangle_count()).sum()
    }
}

/// Errors from the graphics submission boundary.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The sink rejected the draw list.
    #[error("Draw submission failed: {0}")]
    Rejected(String),
}

/// Graphics submission boundary.
///
/// The engine's only output: a sink accepting one draw list per frame.
/// Implementations live outside the core (renderer bindings, test
/// recorders); nothing here depends on a graphics API.
pub trait GraphicsSink {
    /// Submits one frame's draw list.
    fn submit(&mut self, draw_list: &DrawList) -> Result<(), SubmitError>;
}

/// Collects the frame's resident tiles into a draw list.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    registry: AttributeRegistry,
}

impl FrameAssembler {
    /// Creates an assembler with the given attribute registry for overlay
    /// lookups.
    pub fn new(registry: AttributeRegistry) -> Self {
        Self { registry }
    }

    /// Assembles the draw list for a selection.
    ///
    /// Each selected tile resolves through the cache; tiles whose mesh has
    /// not arrived yet are counted as pending rather than drawn (their
    /// coarser ancestor is already in the selection as the stand-in).
    pub fn assemble(
        &self,
        selection: &SelectionResult,
        cache: &TileCache,
        frame_number: u64,
    ) -> DrawList {
        let overlay = self.registry.handle(well_known::TERRAIN_OVERLAY);

        let mut commands = Vec::with_capacity(selection.tiles().len());
        let mut pending = 0;
        for tile in selection.tiles() {
            match cache.resident_mesh(&tile.key) {
                Some(mesh) => {
                    commands.push(DrawCommand {
                        mesh: Arc::clone(mesh),
                        texture: overlay,
                        transform: mesh.frame().to_matrix(),
                    });
                }
                None => pending += 1,
            }
        }
        trace!(
            frame = frame_number,
            drawn = commands.len(),
            pending,
            "assembled draw list"
        );
        DrawList {
            commands,
            pending,
            frame_number,
        }
    }
}
