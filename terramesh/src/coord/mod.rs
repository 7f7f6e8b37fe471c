//! Geographic tiling scheme.
//!
//! Provides the quadtree tile grid used by the whole engine: a geographic
//! (equirectangular) scheme with two root tiles at level 0, one per
//! hemisphere of longitude. Unlike Web Mercator grids, this scheme covers
//! the poles, which a globe tessellator needs.

mod types;

pub use types::{
    CardinalDirection, CoordError, TileBounds, TileKey, MAX_LAT, MAX_LEVEL, MAX_LON, MIN_LAT,
    MIN_LON, ROOT_COLS, ROOT_ROWS,
};

/// Finds the tile containing a geographic point at the given level.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-90 to 90)
/// * `lon` - Longitude in degrees (-180 to 180)
/// * `level` - Quadtree level (0 to [`MAX_LEVEL`])
///
/// # Returns
///
/// The containing tile key, or an error if inputs are invalid. Points on
/// the east/south edge of the grid (lon = 180, lat = -90) map into the
/// last column/row rather than one past it.
#[inline]
pub fn tile_at(lat: f64, lon: f64, level: u8) -> Result<TileKey, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if level > MAX_LEVEL {
        return Err(CoordError::InvalidLevel(level));
    }

    let rows = TileKey::rows_at(level);
    let cols = TileKey::cols_at(level);
    let span = 180.0 / (1u64 << level) as f64;

    // Row 0 is the northernmost row
    let row = (((MAX_LAT - lat) / span) as u32).min(rows - 1);
    let col = (((lon - MIN_LON) / span) as u32).min(cols - 1);

    TileKey::new(level, row, col)
}

/// Enumerates the ancestor chain of the tile containing a point, walking
/// down from the root to the given level.
///
/// Mostly a debugging aid: yields the ancestor chain of
/// [`tile_at`]`(lat, lon, level)` from coarse to fine.
pub fn tile_path(lat: f64, lon: f64, level: u8) -> Result<Vec<TileKey>, CoordError> {
    let mut path = Vec::with_capacity(level as usize + 1);
    for l in 0..=level {
        path.push(tile_at(lat, lon, l)?);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_at_level_zero_hemispheres() {
        let west = tile_at(45.0, -90.0, 0).unwrap();
        assert_eq!(west, TileKey::new(0, 0, 0).unwrap());

        let east = tile_at(45.0, 90.0, 0).unwrap();
        assert_eq!(east, TileKey::new(0, 0, 1).unwrap());
    }

    #[test]
    fn test_tile_at_contains_point() {
        let lat = 40.7128; // New York City
        let lon = -74.0060;
        for level in [0, 3, 8, 15] {
            let tile = tile_at(lat, lon, level).unwrap();
            assert!(
                tile.bounds().contains(lat, lon),
                "Level {}: tile {} does not contain the point",
                level,
                tile
            );
        }
    }

    #[test]
    fn test_tile_at_grid_edges_clamp_inward() {
        // Antimeridian east edge maps into the last column
        let tile = tile_at(0.0, 180.0, 4).unwrap();
        assert_eq!(tile.col(), TileKey::cols_at(4) - 1);

        // South pole maps into the last row
        let tile = tile_at(-90.0, 0.0, 4).unwrap();
        assert_eq!(tile.row(), TileKey::rows_at(4) - 1);
    }

    #[test]
    fn test_tile_at_rejects_invalid_inputs() {
        assert!(matches!(
            tile_at(91.0, 0.0, 3),
            Err(CoordError::InvalidLatitude(_))
        ));
        assert!(matches!(
            tile_at(0.0, 181.0, 3),
            Err(CoordError::InvalidLongitude(_))
        ));
        assert!(matches!(
            tile_at(0.0, 0.0, MAX_LEVEL + 1),
            Err(CoordError::InvalidLevel(_))
        ));
    }

    #[test]
    fn test_tile_path_is_ancestor_chain() {
        let path = tile_path(51.5074, -0.1278, 6).unwrap(); // London
        assert_eq!(path.len(), 7);
        for pair in path.windows(2) {
            assert_eq!(pair[1].parent(), Some(pair[0]));
        }
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_tile_at_in_bounds(
                lat in -90.0..=90.0_f64,
                lon in -180.0..=180.0_f64,
                level in 0u8..=12
            ) {
                let tile = tile_at(lat, lon, level)?;
                prop_assert!(tile.row() < TileKey::rows_at(level));
                prop_assert!(tile.col() < TileKey::cols_at(level));
                prop_assert_eq!(tile.level(), level);
            }

            #[test]
            fn test_tile_at_bounds_contain_point(
                lat in -89.99..89.99_f64,
                lon in -179.99..179.99_f64,
                level in 0u8..=12
            ) {
                let tile = tile_at(lat, lon, level)?;
                let bounds = tile.bounds();
                prop_assert!(
                    bounds.contains(lat, lon),
                    "Tile {} bounds {:?} do not contain ({}, {})",
                    tile, bounds, lat, lon
                );
            }

            #[test]
            fn test_tile_at_consistent_with_parent(
                lat in -89.99..89.99_f64,
                lon in -179.99..179.99_f64,
                level in 1u8..=12
            ) {
                // The containing tile at level-1 is the parent of the
                // containing tile at level
                let fine = tile_at(lat, lon, level)?;
                let coarse = tile_at(lat, lon, level - 1)?;
                prop_assert_eq!(fine.parent(), Some(coarse));
            }

            #[test]
            fn test_longitude_monotonic(
                lat in -80.0..80.0_f64,
                lon1 in -180.0..-90.0_f64,
                lon2 in -89.0..0.0_f64,
                level in 4u8..=10
            ) {
                // For fixed latitude, increasing longitude never decreases column
                let t1 = tile_at(lat, lon1, level)?;
                let t2 = tile_at(lat, lon2, level)?;
                prop_assert!(t1.col() < t2.col());
            }

            #[test]
            fn test_bounds_tile_exactly(
                level in 0u8..=10,
                row_raw in 0u32..4096,
                col_raw in 0u32..4096,
            ) {
                let row = row_raw % TileKey::rows_at(level);
                let col = col_raw % TileKey::cols_at(level);
                let tile = TileKey::new(level, row, col)?;
                let bounds = tile.bounds();

                // Spans are exact powers of two in degrees
                let span = 180.0 / (1u64 << level) as f64;
                prop_assert!((bounds.lat_span() - span).abs() < 1e-9);
                prop_assert!((bounds.lon_span() - span).abs() < 1e-9);

                // Bounds stay within the globe
                prop_assert!(bounds.north <= MAX_LAT + 1e-9);
                prop_assert!(bounds.south >= MIN_LAT - 1e-9);
                prop_assert!(bounds.west >= MIN_LON - 1e-9);
                prop_assert!(bounds.east <= MAX_LON + 1e-9);
            }

            #[test]
            fn test_neighbor_is_involutive(
                level in 1u8..=10,
                row_raw in 0u32..4096,
                col_raw in 0u32..4096,
            ) {
                let row = row_raw % TileKey::rows_at(level);
                let col = col_raw % TileKey::cols_at(level);
                let tile = TileKey::new(level, row, col)?;

                // East then west returns to the original tile (wrapping included)
                let east = tile.neighbor(CardinalDirection::East).unwrap();
                prop_assert_eq!(east.neighbor(CardinalDirection::West), Some(tile));

                // North then south, when the neighbor exists
                if let Some(north) = tile.neighbor(CardinalDirection::North) {
                    prop_assert_eq!(north.neighbor(CardinalDirection::South), Some(tile));
                }
            }
        }
    }
}
