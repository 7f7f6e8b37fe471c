//! WGS84 ellipsoid math.
//!
//! The tessellator treats geodetic-to-local-frame conversion as pure
//! function territory: everything in this module is stateless and
//! deterministic. Angles are degrees at the API boundary, radians
//! internally.

use glam::DVec3;

/// WGS84 semi-major axis in meters.
pub const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// WGS84 semi-minor axis in meters.
pub const SEMI_MINOR_AXIS: f64 = 6_356_752.314_245;

/// Mean Earth radius in meters, used by the screen-space-error estimator
/// where a spherical approximation is sufficient.
pub const MEAN_RADIUS: f64 = 6_371_008.8;

/// First eccentricity squared of the WGS84 ellipsoid.
const E_SQ: f64 =
    1.0 - (SEMI_MINOR_AXIS * SEMI_MINOR_AXIS) / (SEMI_MAJOR_AXIS * SEMI_MAJOR_AXIS);

/// Converts a geodetic position to earth-centered earth-fixed coordinates.
///
/// # Arguments
///
/// * `lat` - Geodetic latitude in degrees
/// * `lon` - Longitude in degrees
/// * `height` - Height above the ellipsoid in meters
pub fn geodetic_to_ecef(lat: f64, lon: f64, height: f64) -> DVec3 {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();

    // Prime vertical radius of curvature
    let n = SEMI_MAJOR_AXIS / (1.0 - E_SQ * sin_lat * sin_lat).sqrt();

    DVec3::new(
        (n + height) * cos_lat * lon_rad.cos(),
        (n + height) * cos_lat * lon_rad.sin(),
        (n * (1.0 - E_SQ) + height) * sin_lat,
    )
}

/// Outward geodetic surface normal at a lat/lon position.
pub fn surface_normal(lat: f64, lon: f64) -> DVec3 {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let cos_lat = lat_rad.cos();
    DVec3::new(
        cos_lat * lon_rad.cos(),
        cos_lat * lon_rad.sin(),
        lat_rad.sin(),
    )
}

/// An east-north-up frame anchored at a geodetic origin.
///
/// Tile meshes are built in such a frame so vertex coordinates stay small
/// (f32-precision safe) regardless of where on the globe the tile sits.
/// The frame is orthonormal by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentFrame {
    origin: DVec3,
    east: DVec3,
    north: DVec3,
    up: DVec3,
}

impl TangentFrame {
    /// Builds the frame anchored at the given geodetic position.
    pub fn at(lat: f64, lon: f64, height: f64) -> Self {
        let origin = geodetic_to_ecef(lat, lon, height);
        let up = surface_normal(lat, lon);
        let lon_rad = lon.to_radians();
        // East is tangent to the parallel, independent of latitude
        let east = DVec3::new(-lon_rad.sin(), lon_rad.cos(), 0.0);
        let north = up.cross(east);
        Self {
            origin,
            east,
            north,
            up,
        }
    }

    /// Frame origin in ECEF coordinates.
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// Transforms an ECEF point into this frame's local coordinates.
    pub fn to_local(&self, ecef: DVec3) -> DVec3 {
        let d = ecef - self.origin;
        DVec3::new(d.dot(self.east), d.dot(self.north), d.dot(self.up))
    }

    /// Transforms a local point back to ECEF coordinates.
    pub fn to_ecef(&self, local: DVec3) -> DVec3 {
        self.origin + self.east * local.x + self.north * local.y + self.up * local.z
    }

    /// Transforms a direction (no translation) into local coordinates.
    pub fn direction_to_local(&self, dir: DVec3) -> DVec3 {
        DVec3::new(dir.dot(self.east), dir.dot(self.north), dir.dot(self.up))
    }

    /// The local-to-ECEF transform as a column-major matrix, for handing
    /// to the graphics submission sink.
    pub fn to_matrix(&self) -> glam::DMat4 {
        glam::DMat4::from_cols(
            self.east.extend(0.0),
            self.north.extend(0.0),
            self.up.extend(0.0),
            self.origin.extend(1.0),
        )
    }
}

/// Great-circle distance between two geodetic points on the mean sphere.
///
/// Haversine formula; adequate for LOD priority estimates where meter-level
/// accuracy is irrelevant.
pub fn surface_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi * 0.5).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda * 0.5).sin().powi(2);
    2.0 * MEAN_RADIUS * a.sqrt().min(1.0).asin()
}
