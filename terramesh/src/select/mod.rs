//! Quadtree LOD selection.
//!
//! The scheduling brain of the engine: walks the tile quadtree from the
//! root tiles each frame, culls invisible subtrees, estimates screen-space
//! error, and produces the frontier of tiles to render plus the set of
//! missing tiles to stream in.
//!
//! Selection is a pure read of camera state and cache contents: calling
//! it twice with identical inputs yields an identical result. All cache
//! mutation (touching, pinning, eviction) happens in the engine around
//! the selection pass.

mod camera;

pub use camera::{CameraState, Frustum, HorizonOccluder};

use std::collections::HashSet;

use tracing::trace;

use crate::cache::TileCache;
use crate::coord::{CardinalDirection, TileKey, ROOT_COLS};
use crate::geodetic::{geodetic_to_ecef, MEAN_RADIUS};
use crate::mesh::BoundingSphere;

/// Heightmap quality factor in the level-zero geometric error estimate,
/// matching the conventional quarter-sample-spacing heuristic.
const HEIGHTMAP_QUALITY: f64 = 0.25;

/// Terrain relief allowance baked into tile bounding spheres, meters.
/// Covers everything from the Mariana Trench to Everest.
const TERRAIN_HEIGHT_ALLOWANCE: f64 = 9_000.0;

/// Floor for the polar width factor so geometric error never vanishes as
/// the longitude span collapses toward the poles.
const MIN_POLAR_WIDTH_FACTOR: f64 = 0.05;

/// Selector configuration, fixed at engine initialization.
#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    /// Accept a tile once its screen-space error drops to this many pixels.
    pub pixel_error_threshold: f64,
    /// Deepest level the selector will refine to.
    pub max_level: u8,
    /// Geometric error of a level-0 tile, meters.
    pub level_zero_geometric_error: f64,
}

impl SelectorConfig {
    /// Derives the level-zero geometric error from the tessellation grid
    /// size, in the style of heightmap terrain providers.
    pub fn new(pixel_error_threshold: f64, max_level: u8, grid_size: usize) -> Self {
        let intervals = (grid_size.max(2) - 1) as f64;
        Self {
            pixel_error_threshold,
            max_level,
            level_zero_geometric_error: MEAN_RADIUS * 2.0 * std::f64::consts::PI
                * HEIGHTMAP_QUALITY
                / (intervals * ROOT_COLS as f64),
        }
    }
}

/// Per-tile record of the LOD of each cardinal neighbor in the frontier.
///
/// Indexed by [`CardinalDirection::ALL`] order. Same-or-finer neighbors
/// record the tile's own level; only coarser neighbors matter for skirt
/// decimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeLodMask {
    levels: [u8; 4],
}

impl EdgeLodMask {
    /// A mask with all sides at the tile's own level.
    pub fn uniform(level: u8) -> Self {
        Self { levels: [level; 4] }
    }

    /// Neighbor level along one side.
    pub fn level(&self, side: CardinalDirection) -> u8 {
        self.levels[side.index()]
    }

    /// True when any neighbor is coarser than the tile itself.
    pub fn has_coarser_neighbor(&self, own_level: u8) -> bool {
        self.levels.iter().any(|&l| l < own_level)
    }

    fn set(&mut self, side: CardinalDirection, level: u8) {
        self.levels[side.index()] = level;
    }
}

/// A tile accepted into the frontier for this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedTile {
    pub key: TileKey,
    /// Screen-space error at acceptance time, pixels.
    pub sse: f64,
    /// Whether the cache held a built mesh at selection time. Cold-start
    /// stand-ins are selected before their mesh exists.
    pub resident: bool,
    pub edge_lods: EdgeLodMask,
}

/// A tile the selector wants but the cache lacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissingTile {
    pub key: TileKey,
    /// Screen-space error driving this request; higher means more
    /// visually impactful, so it maps to a higher streaming priority.
    pub sse: f64,
    /// Edge LOD mask the tile should be built with.
    pub edge_lods: EdgeLodMask,
}

/// Output of one selection pass. Recomputed every frame, never persisted.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    tiles: Vec<SelectedTile>,
    missing: Vec<MissingTile>,
    culled: u32,
}

impl SelectionResult {
    /// Tiles to render, in deterministic traversal order.
    pub fn tiles(&self) -> &[SelectedTile] {
        &self.tiles
    }

    /// Tiles to request from the streaming coordinator.
    pub fn missing(&self) -> &[MissingTile] {
        &self.missing
    }

    /// Subtrees rejected by frustum or horizon culling.
    pub fn culled(&self) -> u32 {
        self.culled
    }

    /// Keys of the selected frontier.
    pub fn frontier_keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.tiles.iter().map(|t| t.key)
    }

    /// The frontier plus every ancestor of a frontier tile; the pin set
    /// for cache eviction.
    pub fn pinned_keys(&self) -> HashSet<TileKey> {
        let mut pinned = HashSet::new();
        for tile in &self.tiles {
            pinned.insert(tile.key);
            pinned.extend(tile.key.ancestors());
        }
        pinned
    }
}

/// Walks the quadtree once per frame and emits the frontier.
#[derive(Debug, Clone)]
pub struct LodSelector {
    config: SelectorConfig,
}

impl LodSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Selects the frame's tile frontier.
    ///
    /// For each visited tile: cull against the frustum and the horizon
    /// (rejecting the whole subtree), then either accept it (error within
    /// threshold, or max level reached), recurse into children (all four
    /// resident), or accept it as a stand-in while requesting the missing
    /// children. Ties at the threshold keep the coarser tile.
    pub fn select(&self, camera: &CameraState, cache: &TileCache) -> SelectionResult {
        let mut result = SelectionResult::default();
        for root in TileKey::root_tiles() {
            self.visit(camera, cache, root, &mut result);
        }
        self.fill_edge_lods(&mut result);
        trace!(
            tiles = result.tiles.len(),
            missing = result.missing.len(),
            culled = result.culled,
            "selection complete"
        );
        result
    }

    fn visit(
        &self,
        camera: &CameraState,
        cache: &TileCache,
        key: TileKey,
        result: &mut SelectionResult,
    ) {
        let sphere = tile_bounding_sphere(key);
        if !camera.frustum().intersects_sphere(&sphere)
            || camera.occluder().is_sphere_hidden(&sphere)
        {
            result.culled += 1;
            return;
        }

        let distance = camera.distance_to(&sphere);
        let sse = camera.screen_space_error(self.geometric_error(key), distance);

        // <= keeps the coarser tile on an exact tie, biasing toward
        // stability over flicker
        if sse <= self.config.pixel_error_threshold || key.level() >= self.config.max_level {
            self.accept(cache, key, sse, result);
            return;
        }

        let children = match key.children() {
            Some(children) => children,
            None => {
                self.accept(cache, key, sse, result);
                return;
            }
        };

        if children.iter().all(|c| cache.is_resident(c)) {
            for child in children {
                self.visit(camera, cache, child, result);
            }
        } else {
            // Children not ready: render this tile as a stand-in and
            // stream the gaps. The children inherit the parent's error so
            // the most visually impactful holes fill first.
            self.accept(cache, key, sse, result);
            for child in children {
                let failed = cache
                    .peek(&child)
                    .is_some_and(|entry| entry.is_failed());
                if !failed && !cache.is_resident(&child) {
                    result.missing.push(MissingTile {
                        key: child,
                        sse,
                        edge_lods: EdgeLodMask::uniform(child.level()),
                    });
                }
            }
        }
    }

    fn accept(&self, cache: &TileCache, key: TileKey, sse: f64, result: &mut SelectionResult) {
        let resident = cache.is_resident(&key);
        if !resident && !cache.peek(&key).is_some_and(|e| e.is_failed()) {
            // Cold-start stand-in: selected now, streamed for later frames
            result.missing.push(MissingTile {
                key,
                sse,
                edge_lods: EdgeLodMask::uniform(key.level()),
            });
        }
        result.tiles.push(SelectedTile {
            key,
            sse,
            resident,
            edge_lods: EdgeLodMask::uniform(key.level()),
        });
    }

    /// Screen-space-error driving geometry error for a tile.
    ///
    /// Halves per level; polar rows additionally scale by the widest
    /// parallel the tile touches. The factor multiplies (never divides)
    /// and is floored, so the estimate stays finite and nonzero all the
    /// way to the poles.
    fn geometric_error(&self, key: TileKey) -> f64 {
        let base = self.config.level_zero_geometric_error / (1u64 << key.level()) as f64;
        let bounds = key.bounds();
        // Latitude of the tile edge closest to the equator
        let closest_lat = if bounds.south >= 0.0 {
            bounds.south
        } else if bounds.north <= 0.0 {
            bounds.north
        } else {
            0.0
        };
        let width_factor = closest_lat
            .to_radians()
            .cos()
            .max(MIN_POLAR_WIDTH_FACTOR);
        base * width_factor
    }

    /// Fills edge LOD masks once the frontier is known.
    ///
    /// For each selected tile and direction, the recorded level is the
    /// frontier tile covering that neighbor: the tile's own level when the
    /// neighbor is at the same or finer LOD, the ancestor's level when the
    /// neighbor region is coarser.
    fn fill_edge_lods(&self, result: &mut SelectionResult) {
        let frontier: HashSet<TileKey> = result.tiles.iter().map(|t| t.key).collect();
        for tile in &mut result.tiles {
            let mut mask = EdgeLodMask::uniform(tile.key.level());
            for side in CardinalDirection::ALL {
                let Some(neighbor) = tile.key.neighbor(side) else {
                    continue; // across a pole: no neighbor, skirt at own level
                };
                if frontier.contains(&neighbor) {
                    continue; // same level
                }
                // Walk up: a coarser frontier tile covering the neighbor
                let mut cursor = neighbor;
                while let Some(parent) = cursor.parent() {
                    if frontier.contains(&parent) {
                        mask.set(side, parent.level());
                        break;
                    }
                    cursor = parent;
                }
            }
            tile.edge_lods = mask;
        }
        // Requests reuse the mask of the frontier tile they refine, so a
        // freshly built child skirts correctly against today's neighbors
        for missing in &mut result.missing {
            if let Some(parent) = missing.key.parent() {
                if let Some(selected) = result.tiles.iter().find(|t| t.key == parent) {
                    let mut mask = EdgeLodMask::uniform(missing.key.level());
                    for side in CardinalDirection::ALL {
                        let parent_side = selected.edge_lods.level(side);
                        if parent_side < parent.level() {
                            mask.set(side, parent_side);
                        }
                    }
                    missing.edge_lods = mask;
                }
            }
        }
    }
}

/// Conservative bounding sphere for a tile that may not be built yet.
///
/// Samples the tile's corners, edge midpoints, and center on the
/// ellipsoid, then pads the radius with a relief allowance. Polar tiles
/// get the pole point included so the sphere covers the convergent
/// geometry. Pure function of the key: selection determinism depends on
/// it.
pub fn tile_bounding_sphere(key: TileKey) -> BoundingSphere {
    let bounds = key.bounds();
    let (center_lat, center_lon) = bounds.center();

    let mut points: Vec<glam::DVec3> = Vec::with_capacity(10);
    for (lat, lon) in bounds.corners() {
        points.push(geodetic_to_ecef(lat, lon, 0.0));
    }
    points.push(geodetic_to_ecef(bounds.north, center_lon, 0.0));
    points.push(geodetic_to_ecef(bounds.south, center_lon, 0.0));
    points.push(geodetic_to_ecef(center_lat, bounds.west, 0.0));
    points.push(geodetic_to_ecef(center_lat, bounds.east, 0.0));
    points.push(geodetic_to_ecef(center_lat, center_lon, 0.0));
    if bounds.north >= crate::coord::MAX_LAT {
        points.push(geodetic_to_ecef(90.0, 0.0, 0.0));
    }
    if bounds.south <= crate::coord::MIN_LAT {
        points.push(geodetic_to_ecef(-90.0, 0.0, 0.0));
    }

    let mut min = glam::DVec3::splat(f64::INFINITY);
    let mut max = glam::DVec3::splat(f64::NEG_INFINITY);
    for p in &points {
        min = min.min(*p);
        max = max.max(*p);
    }
    let center = (min + max) * 0.5;
    let mut radius: f64 = 0.0;
    for p in &points {
        radius = radius.max(center.distance(*p));
    }

    BoundingSphere {
        center,
        radius: radius + TERRAIN_HEIGHT_ALLOWANCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::elevation::{ElevationGrid, NeighborEdges};
    use crate::mesh::MeshBuilder;

    const GRID: usize = 5;

    fn orbital_camera() -> CameraState {
        CameraState::look_at_geodetic(
            0.0, 0.0, 2.0e7, 0.0, 0.0, 0.0, 60.0_f64.to_radians(), 1280, 720,
        )
    }

    fn selector(threshold: f64, max_level: u8) -> LodSelector {
        LodSelector::new(SelectorConfig::new(threshold, max_level, GRID))
    }

    fn insert_resident(cache: &mut TileCache, key: TileKey) {
        let builder = MeshBuilder::new(GRID, 100.0);
        let mesh = builder
            .build(key, &ElevationGrid::flat(GRID), &NeighborEdges::none())
            .unwrap();
        cache.complete_build(key, Arc::new(mesh), 0);
    }

    fn assert_valid_frontier(result: &SelectionResult) {
        let keys: Vec<TileKey> = result.frontier_keys().collect();
        for a in &keys {
            for b in &keys {
                if a != b {
                    assert!(
                        !a.is_ancestor_of(b),
                        "{} is an ancestor of {} in the frontier",
                        a,
                        b
                    );
                }
            }
        }
    }

    #[test]
    fn test_empty_cache_selects_roots_as_stand_ins() {
        let cache = TileCache::new();
        let sel = selector(2.0, 10);
        let result = sel.select(&orbital_camera(), &cache);

        // Only root tiles can be selected; nothing deeper is resident
        assert!(!result.tiles().is_empty());
        assert!(result.tiles().iter().all(|t| t.key.level() == 0));
        assert!(result.tiles().iter().all(|t| !t.resident));

        // The roots themselves are missing, plus their children when the
        // error called for refinement
        assert!(!result.missing().is_empty());
        assert_valid_frontier(&result);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let mut cache = TileCache::new();
        for root in TileKey::root_tiles() {
            insert_resident(&mut cache, root);
            for child in root.children().unwrap() {
                insert_resident(&mut cache, child);
            }
        }
        let sel = selector(2.0, 6);
        let camera = orbital_camera();

        let a = sel.select(&camera, &cache);
        let b = sel.select(&camera, &cache);
        assert_eq!(a.tiles(), b.tiles());
        assert_eq!(a.missing(), b.missing());
        assert_eq!(a.culled(), b.culled());
    }

    #[test]
    fn test_refines_into_resident_children() {
        let mut cache = TileCache::new();
        let [west_root, east_root] = TileKey::root_tiles();
        insert_resident(&mut cache, west_root);
        insert_resident(&mut cache, east_root);
        for child in west_root.children().unwrap() {
            insert_resident(&mut cache, child);
        }
        for child in east_root.children().unwrap() {
            insert_resident(&mut cache, child);
        }

        // Threshold of 0.5 px forces at least one refinement step from
        // orbit; children are resident so the walk descends
        let sel = selector(0.5, 1);
        let result = sel.select(&orbital_camera(), &cache);

        assert!(result.tiles().iter().all(|t| t.resident));
        assert!(
            result.tiles().iter().any(|t| t.key.level() == 1),
            "expected refinement into level-1 tiles"
        );
        assert_valid_frontier(&result);
    }

    #[test]
    fn test_stand_in_requests_children_when_not_resident() {
        let mut cache = TileCache::new();
        for root in TileKey::root_tiles() {
            insert_resident(&mut cache, root);
        }

        let sel = selector(0.5, 4);
        let result = sel.select(&orbital_camera(), &cache);

        // Roots stay in the frontier as stand-ins
        assert!(result.tiles().iter().all(|t| t.key.level() == 0));
        assert!(result.tiles().iter().all(|t| t.resident));

        // Their visible children are requested
        assert!(!result.missing().is_empty());
        assert!(result.missing().iter().all(|m| m.key.level() == 1));
        assert_valid_frontier(&result);
    }

    #[test]
    fn test_failed_child_is_not_re_requested() {
        let mut cache = TileCache::new();
        let [west_root, _] = TileKey::root_tiles();
        for root in TileKey::root_tiles() {
            insert_resident(&mut cache, root);
        }
        let failed_child = west_root.children().unwrap()[0];
        cache.insert_pending(failed_child, 0);
        cache.mark_failed(failed_child, 0);

        let sel = selector(0.5, 4);
        let result = sel.select(&orbital_camera(), &cache);

        assert!(
            result.missing().iter().all(|m| m.key != failed_child),
            "failed tile must not be requested again"
        );
        // Parent remains the stand-in
        assert!(result.frontier_keys().any(|k| k == west_root));
    }

    #[test]
    fn test_horizon_culls_far_side() {
        let mut cache = TileCache::new();
        for root in TileKey::root_tiles() {
            insert_resident(&mut cache, root);
            for child in root.children().unwrap() {
                insert_resident(&mut cache, child);
            }
        }

        // Low camera over lon 0: the antimeridian hemisphere is far behind
        // the horizon
        let camera = CameraState::look_at_geodetic(
            0.0, 0.0, 500_000.0, 0.0, 0.0, 0.0, 60.0_f64.to_radians(), 1280, 720,
        );
        let sel = selector(0.5, 1);
        let result = sel.select(&camera, &cache);

        assert!(result.culled() > 0, "far-side subtrees should be culled");
        assert_valid_frontier(&result);
    }

    #[test]
    fn test_max_level_stops_refinement() {
        let cache = TileCache::new();
        // Ground-level camera and an absurd threshold would refine forever
        // without the max level stop
        let camera = CameraState::look_at_geodetic(
            45.0, 9.0, 100.0, 45.001, 9.0, 0.0, 60.0_f64.to_radians(), 1280, 720,
        );
        let sel = selector(0.001, 3);
        let result = sel.select(&camera, &cache);
        assert!(result.tiles().iter().all(|t| t.key.level() <= 3));
    }

    #[test]
    fn test_underground_camera_does_not_crash() {
        let cache = TileCache::new();
        let camera = CameraState::look_at_geodetic(
            45.0, 9.0, -5000.0, 45.0, 9.1, 0.0, 60.0_f64.to_radians(), 1280, 720,
        );
        let sel = selector(2.0, 5);
        let result = sel.select(&camera, &cache);
        assert_valid_frontier(&result);
    }

    #[test]
    fn test_polar_tiles_select_without_panic() {
        let cache = TileCache::new();
        // Camera over the north pole looking down
        let camera = CameraState::look_at_geodetic(
            89.9, 0.0, 1.0e6, 85.0, 0.0, 0.0, 60.0_f64.to_radians(), 1280, 720,
        );
        let sel = selector(2.0, 8);
        let result = sel.select(&camera, &cache);
        assert!(!result.tiles().is_empty() || !result.missing().is_empty());
        assert_valid_frontier(&result);
    }

    #[test]
    fn test_polar_geometric_error_is_finite_and_positive() {
        let sel = selector(2.0, 10);
        let polar = TileKey::new(6, 0, 0).unwrap();
        let equatorial = TileKey::new(6, 31, 0).unwrap();
        let polar_err = sel.geometric_error(polar);
        let eq_err = sel.geometric_error(equatorial);
        assert!(polar_err.is_finite() && polar_err > 0.0);
        // Polar tiles are narrower on the ground, so their error is lower
        assert!(polar_err < eq_err);
    }

    #[test]
    fn test_edge_lod_mask_records_coarser_neighbor() {
        let mut cache = TileCache::new();
        let [west_root, east_root] = TileKey::root_tiles();
        insert_resident(&mut cache, west_root);
        insert_resident(&mut cache, east_root);
        // Refine only the western root
        for child in west_root.children().unwrap() {
            insert_resident(&mut cache, child);
        }

        let sel = selector(0.5, 1);
        let result = sel.select(&orbital_camera(), &cache);

        // A level-1 tile on the eastern edge of the western root borders
        // the (coarser, level-0) eastern root
        let ne_child = west_root.children().unwrap()[1];
        if let Some(tile) = result.tiles().iter().find(|t| t.key == ne_child) {
            assert_eq!(tile.edge_lods.level(CardinalDirection::East), 0);
            assert!(tile.edge_lods.has_coarser_neighbor(1));
            // The western side borders a sibling at the same level
            assert_eq!(tile.edge_lods.level(CardinalDirection::West), 1);
        } else {
            panic!("expected {} in the frontier", ne_child);
        }
    }

    #[test]
    fn test_scenario_children_replace_root_once_resident() {
        // Cold start: an empty cache selects roots as stand-ins; once all
        // four children of a root are resident, the next frame's frontier
        // replaces that root with its children.
        let mut cache = TileCache::new();
        let sel = selector(0.5, 1);
        let camera = orbital_camera();

        let first = sel.select(&camera, &cache);
        assert!(first.tiles().iter().all(|t| t.key.level() == 0));
        let requested: Vec<TileKey> = first.missing().iter().map(|m| m.key).collect();
        assert!(!requested.is_empty());

        // Simulate completion of the roots and all four children of the
        // western root
        let [west_root, east_root] = TileKey::root_tiles();
        insert_resident(&mut cache, west_root);
        insert_resident(&mut cache, east_root);
        for child in west_root.children().unwrap() {
            insert_resident(&mut cache, child);
        }

        let second = sel.select(&camera, &cache);
        let frontier: Vec<TileKey> = second.frontier_keys().collect();
        assert!(
            !frontier.contains(&west_root),
            "refined root must leave the frontier"
        );
        for child in west_root.children().unwrap() {
            // Visible children take the root's place (some may be culled)
            if frontier.contains(&child) {
                assert!(second
                    .tiles()
                    .iter()
                    .find(|t| t.key == child)
                    .unwrap()
                    .resident);
            }
        }
        assert!(frontier.contains(&east_root), "unrefined root stays");
        assert_valid_frontier(&second);
    }

    #[test]
    fn test_bounding_sphere_covers_tile_corners() {
        let key = TileKey::new(4, 3, 9).unwrap();
        let sphere = tile_bounding_sphere(key);
        for (lat, lon) in key.bounds().corners() {
            let p = geodetic_to_ecef(lat, lon, 0.0);
            assert!(sphere.center.distance(p) <= sphere.radius);
        }
        // Relief allowance covers a mountain peak at the tile center
        let (lat, lon) = key.bounds().center();
        let peak = geodetic_to_ecef(lat, lon, 8_848.0);
        assert!(sphere.center.distance(peak) <= sphere.radius);
    }

    #[test]
    fn test_pinned_keys_include_ancestor_chain() {
        let mut cache = TileCache::new();
        for root in TileKey::root_tiles() {
            insert_resident(&mut cache, root);
        }
        let sel = selector(0.5, 2);
        let result = sel.select(&orbital_camera(), &cache);

        let pinned = result.pinned_keys();
        for tile in result.tiles() {
            assert!(pinned.contains(&tile.key));
            for ancestor in tile.key.ancestors() {
                assert!(pinned.contains(&ancestor));
            }
        }
    }
}
