//! Core types for the geographic tiling scheme.

use std::fmt;

use thiserror::Error;

/// Maximum supported quadtree level.
///
/// Level 22 tiles span roughly 4×10⁻⁵ degrees (about 4 m at the equator),
/// well below the resolution of any global elevation dataset.
pub const MAX_LEVEL: u8 = 22;

/// Number of root tile rows at level 0.
pub const ROOT_ROWS: u32 = 1;

/// Number of root tile columns at level 0 (western and eastern hemispheres).
pub const ROOT_COLS: u32 = 2;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;

/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;

/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;

/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// Errors from tile key construction and coordinate conversion.
#[derive(Debug, Error, PartialEq)]
pub enum CoordError {
    /// Level exceeds [`MAX_LEVEL`].
    #[error("Invalid level: {0} (max: {max})", max = MAX_LEVEL)]
    InvalidLevel(u8),

    /// Row index outside the grid at the given level.
    #[error("Row {row} out of range at level {level} (max: {max})")]
    RowOutOfRange { level: u8, row: u32, max: u32 },

    /// Column index outside the grid at the given level.
    #[error("Column {col} out of range at level {level} (max: {max})")]
    ColOutOfRange { level: u8, col: u32, max: u32 },

    /// Latitude outside [-90, 90].
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180].
    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),
}

/// The four cardinal directions, used for neighbor derivation and edge
/// LOD bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardinalDirection {
    North,
    South,
    East,
    West,
}

impl CardinalDirection {
    /// All four directions in a fixed order (N, S, E, W).
    ///
    /// The order is load-bearing: edge LOD masks index by it.
    pub const ALL: [CardinalDirection; 4] = [
        CardinalDirection::North,
        CardinalDirection::South,
        CardinalDirection::East,
        CardinalDirection::West,
    ];

    /// Index of this direction within [`CardinalDirection::ALL`].
    pub fn index(self) -> usize {
        match self {
            CardinalDirection::North => 0,
            CardinalDirection::South => 1,
            CardinalDirection::East => 2,
            CardinalDirection::West => 3,
        }
    }
}

impl fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardinalDirection::North => "north",
            CardinalDirection::South => "south",
            CardinalDirection::East => "east",
            CardinalDirection::West => "west",
        };
        write!(f, "{}", name)
    }
}

/// Identifies a quadtree tile by level and row/column in the geographic grid.
///
/// The grid has two root tiles at level 0 (one per hemisphere of longitude),
/// and each level doubles both row and column counts. Row 0 is the
/// northernmost row; column 0 starts at the antimeridian.
///
/// Keys are immutable values; use [`TileKey::new`] to construct a validated
/// key, and [`children`](TileKey::children)/[`parent`](TileKey::parent) to
/// derive related keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    level: u8,
    row: u32,
    col: u32,
}

impl TileKey {
    /// Creates a validated tile key.
    ///
    /// # Errors
    ///
    /// Returns `CoordError` if the level exceeds [`MAX_LEVEL`] or the
    /// row/column fall outside the grid at that level.
    pub fn new(level: u8, row: u32, col: u32) -> Result<Self, CoordError> {
        if level > MAX_LEVEL {
            return Err(CoordError::InvalidLevel(level));
        }
        let rows = Self::rows_at(level);
        let cols = Self::cols_at(level);
        if row >= rows {
            return Err(CoordError::RowOutOfRange {
                level,
                row,
                max: rows - 1,
            });
        }
        if col >= cols {
            return Err(CoordError::ColOutOfRange {
                level,
                col,
                max: cols - 1,
            });
        }
        Ok(Self { level, row, col })
    }

    /// The two root tiles covering the whole globe at level 0.
    pub fn root_tiles() -> [TileKey; 2] {
        [
            TileKey {
                level: 0,
                row: 0,
                col: 0,
            },
            TileKey {
                level: 0,
                row: 0,
                col: 1,
            },
        ]
    }

    /// Number of tile rows at the given level.
    pub fn rows_at(level: u8) -> u32 {
        ROOT_ROWS << level
    }

    /// Number of tile columns at the given level.
    pub fn cols_at(level: u8) -> u32 {
        ROOT_COLS << level
    }

    /// Quadtree level (0 = coarsest).
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Row index (0 = northernmost).
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Column index (0 = westernmost, at the antimeridian).
    pub fn col(&self) -> u32 {
        self.col
    }

    /// The four children at level+1, in (NW, NE, SW, SE) order.
    ///
    /// Returns `None` when this tile is already at [`MAX_LEVEL`]. Child keys
    /// are derived arithmetically and are always in range, so no validation
    /// is repeated here.
    pub fn children(&self) -> Option<[TileKey; 4]> {
        if self.level >= MAX_LEVEL {
            return None;
        }
        let level = self.level + 1;
        let r = self.row * 2;
        let c = self.col * 2;
        Some([
            TileKey { level, row: r, col: c },
            TileKey {
                level,
                row: r,
                col: c + 1,
            },
            TileKey {
                level,
                row: r + 1,
                col: c,
            },
            TileKey {
                level,
                row: r + 1,
                col: c + 1,
            },
        ])
    }

    /// The parent tile at level-1, or `None` for root tiles.
    pub fn parent(&self) -> Option<TileKey> {
        if self.level == 0 {
            return None;
        }
        Some(TileKey {
            level: self.level - 1,
            row: self.row / 2,
            col: self.col / 2,
        })
    }

    /// Iterator over this tile's ancestors, nearest first, ending at a root.
    pub fn ancestors(&self) -> impl Iterator<Item = TileKey> {
        let mut current = *self;
        std::iter::from_fn(move || {
            let parent = current.parent()?;
            current = parent;
            Some(parent)
        })
    }

    /// Whether this tile strictly contains `other` in the quadtree.
    pub fn is_ancestor_of(&self, other: &TileKey) -> bool {
        if other.level <= self.level {
            return false;
        }
        let shift = other.level - self.level;
        other.row >> shift == self.row && other.col >> shift == self.col
    }

    /// The same-level neighbor in the given direction.
    ///
    /// Longitude wraps at the antimeridian; there is no neighbor past the
    /// poles, so `North` at row 0 and `South` at the last row return `None`.
    pub fn neighbor(&self, direction: CardinalDirection) -> Option<TileKey> {
        let rows = Self::rows_at(self.level);
        let cols = Self::cols_at(self.level);
        match direction {
            CardinalDirection::North => {
                if self.row == 0 {
                    None
                } else {
                    Some(TileKey {
                        level: self.level,
                        row: self.row - 1,
                        col: self.col,
                    })
                }
            }
            CardinalDirection::South => {
                if self.row + 1 >= rows {
                    None
                } else {
                    Some(TileKey {
                        level: self.level,
                        row: self.row + 1,
                        col: self.col,
                    })
                }
            }
            CardinalDirection::East => Some(TileKey {
                level: self.level,
                row: self.row,
                col: (self.col + 1) % cols,
            }),
            CardinalDirection::West => Some(TileKey {
                level: self.level,
                row: self.row,
                col: (self.col + cols - 1) % cols,
            }),
        }
    }

    /// The lat/lon rectangle covered by this tile.
    pub fn bounds(&self) -> TileBounds {
        // Tiles are square in degrees: 180 / 2^level on each side.
        let span = 180.0 / (1u64 << self.level) as f64;
        let north = MAX_LAT - self.row as f64 * span;
        let west = MIN_LON + self.col as f64 * span;
        TileBounds {
            west,
            south: north - span,
            east: west + span,
            north,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{}/{}", self.level, self.row, self.col)
    }
}

/// Lat/lon rectangle covered by a tile, in degrees.
///
/// Pure function of a [`TileKey`]; carries no state of its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl TileBounds {
    /// Center of the rectangle as (latitude, longitude).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) * 0.5,
            (self.west + self.east) * 0.5,
        )
    }

    /// Latitude span in degrees.
    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    /// Longitude span in degrees.
    pub fn lon_span(&self) -> f64 {
        self.east - self.west
    }

    /// Whether the rectangle touches either pole.
    ///
    /// Polar tiles need specialized extent math: their longitude span
    /// vanishes on the ground even though the lat/lon rectangle does not.
    pub fn touches_pole(&self) -> bool {
        self.north >= MAX_LAT || self.south <= MIN_LAT
    }

    /// Whether the point lies inside the rectangle (inclusive edges).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    /// The four corners as (latitude, longitude), in (NW, NE, SW, SE) order.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.north, self.west),
            (self.north, self.east),
            (self.south, self.west),
            (self.south, self.east),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_level() {
        assert!(TileKey::new(MAX_LEVEL, 0, 0).is_ok());
        assert_eq!(
            TileKey::new(MAX_LEVEL + 1, 0, 0),
            Err(CoordError::InvalidLevel(MAX_LEVEL + 1))
        );
    }

    #[test]
    fn test_new_validates_row_col() {
        // Level 2: 4 rows, 8 cols
        assert!(TileKey::new(2, 3, 7).is_ok());
        assert!(matches!(
            TileKey::new(2, 4, 0),
            Err(CoordError::RowOutOfRange { .. })
        ));
        assert!(matches!(
            TileKey::new(2, 0, 8),
            Err(CoordError::ColOutOfRange { .. })
        ));
    }

    #[test]
    fn test_root_tiles_cover_globe() {
        let [west, east] = TileKey::root_tiles();
        assert_eq!(west.bounds().west, -180.0);
        assert_eq!(west.bounds().east, 0.0);
        assert_eq!(east.bounds().west, 0.0);
        assert_eq!(east.bounds().east, 180.0);
        assert_eq!(west.bounds().north, 90.0);
        assert_eq!(west.bounds().south, -90.0);
    }

    #[test]
    fn test_children_derivation() {
        let tile = TileKey::new(1, 1, 2).unwrap();
        let children = tile.children().unwrap();
        assert_eq!(children[0], TileKey::new(2, 2, 4).unwrap());
        assert_eq!(children[1], TileKey::new(2, 2, 5).unwrap());
        assert_eq!(children[2], TileKey::new(2, 3, 4).unwrap());
        assert_eq!(children[3], TileKey::new(2, 3, 5).unwrap());
    }

    #[test]
    fn test_children_none_at_max_level() {
        let tile = TileKey::new(MAX_LEVEL, 0, 0).unwrap();
        assert!(tile.children().is_none());
    }

    #[test]
    fn test_parent_inverts_children() {
        let tile = TileKey::new(5, 13, 40).unwrap();
        for child in tile.children().unwrap() {
            assert_eq!(child.parent(), Some(tile));
        }
    }

    #[test]
    fn test_root_has_no_parent() {
        for root in TileKey::root_tiles() {
            assert_eq!(root.parent(), None);
        }
    }

    #[test]
    fn test_ancestors_reach_root() {
        let tile = TileKey::new(4, 9, 21).unwrap();
        let chain: Vec<_> = tile.ancestors().collect();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.last().unwrap().level(), 0);
        for pair in chain.windows(2) {
            assert_eq!(pair[0].parent(), Some(pair[1]));
        }
    }

    #[test]
    fn test_is_ancestor_of() {
        let root = TileKey::new(0, 0, 0).unwrap();
        let deep = TileKey::new(3, 5, 7).unwrap();
        assert!(root.is_ancestor_of(&deep));
        assert!(!deep.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));

        // Deep tile under the other root
        let other = TileKey::new(3, 5, 12).unwrap();
        assert!(!root.is_ancestor_of(&other));
    }

    #[test]
    fn test_children_partition_parent_bounds() {
        let tile = TileKey::new(3, 2, 11).unwrap();
        let parent_bounds = tile.bounds();
        let children = tile.children().unwrap();

        // NW child shares the parent's northwest corner
        let nw = children[0].bounds();
        assert_eq!(nw.north, parent_bounds.north);
        assert_eq!(nw.west, parent_bounds.west);

        // SE child shares the parent's southeast corner
        let se = children[3].bounds();
        assert!((se.south - parent_bounds.south).abs() < 1e-12);
        assert!((se.east - parent_bounds.east).abs() < 1e-12);

        // Children tile the parent exactly
        let (center_lat, center_lon) = parent_bounds.center();
        assert_eq!(nw.south, center_lat);
        assert_eq!(nw.east, center_lon);
    }

    #[test]
    fn test_neighbor_wraps_longitude() {
        // Westernmost tile at level 1: col 0 of 4
        let tile = TileKey::new(1, 0, 0).unwrap();
        let west = tile.neighbor(CardinalDirection::West).unwrap();
        assert_eq!(west.col(), 3);

        let east_edge = TileKey::new(1, 0, 3).unwrap();
        let east = east_edge.neighbor(CardinalDirection::East).unwrap();
        assert_eq!(east.col(), 0);
    }

    #[test]
    fn test_neighbor_none_past_poles() {
        let top = TileKey::new(2, 0, 0).unwrap();
        assert_eq!(top.neighbor(CardinalDirection::North), None);

        let bottom = TileKey::new(2, 3, 0).unwrap();
        assert_eq!(bottom.neighbor(CardinalDirection::South), None);
    }

    #[test]
    fn test_bounds_polar_detection() {
        let polar = TileKey::new(3, 0, 0).unwrap();
        assert!(polar.bounds().touches_pole());

        let equatorial = TileKey::new(3, 3, 0).unwrap();
        assert!(!equatorial.bounds().touches_pole());
    }

    #[test]
    fn test_display_format() {
        let tile = TileKey::new(4, 3, 17).unwrap();
        assert_eq!(tile.to_string(), "L4/3/17");
    }

    #[test]
    fn test_direction_indices_match_all_order() {
        for (i, dir) in CardinalDirection::ALL.iter().enumerate() {
            assert_eq!(dir.index(), i);
        }
    }
}
