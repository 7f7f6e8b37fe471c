//! Camera state for LOD selection.
//!
//! Wraps everything the selector needs per frame: view frustum planes,
//! a horizon occluder, and the projection factors for screen-space error.
//! Built once per frame from the viewer's pose; immutable afterwards, so
//! repeated selection with the same state is reproducible.

use glam::{DMat4, DVec3};

use crate::geodetic::{geodetic_to_ecef, MEAN_RADIUS};
use crate::mesh::BoundingSphere;

/// One frustum plane in Hessian normal form: `normal · p + d >= 0` inside.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Plane {
    normal: DVec3,
    d: f64,
}

impl Plane {
    fn normalized(normal: DVec3, d: f64) -> Self {
        let len = normal.length();
        Self {
            normal: normal / len,
            d: d / len,
        }
    }

    fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.d
    }
}

/// View frustum as six planes extracted from a view-projection matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extracts planes from a column-major view-projection matrix
    /// (Gribb/Hartmann method).
    pub fn from_view_projection(vp: DMat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);

        let plane = |v: glam::DVec4| Plane::normalized(DVec3::new(v.x, v.y, v.z), v.w);
        Self {
            planes: [
                plane(r3 + r0), // left
                plane(r3 - r0), // right
                plane(r3 + r1), // bottom
                plane(r3 - r1), // top
                plane(r3 + r2), // near
                plane(r3 - r2), // far
            ],
        }
    }

    /// Whether a sphere intersects the frustum (conservative).
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.signed_distance(sphere.center) >= -sphere.radius)
    }
}

/// Horizon occlusion test against a sphere approximation of the globe.
///
/// A tile entirely behind the horizon from the camera's vantage point is
/// invisible no matter what the frustum says; rejecting it prunes the
/// whole subtree. The occluder sphere is shrunk slightly below the mean
/// radius so mountainous tiles poking over the horizon are not culled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonOccluder {
    camera: DVec3,
    /// Squared distance from camera to its horizon tangent points.
    horizon_distance_sq: f64,
}

/// Occluder sphere shrink factor below the mean radius.
const OCCLUDER_SHRINK: f64 = 0.995;

impl HorizonOccluder {
    /// Creates the occluder for a camera position in ECEF.
    pub fn new(camera: DVec3) -> Self {
        let radius = MEAN_RADIUS * OCCLUDER_SHRINK;
        Self {
            camera,
            // Negative when the camera is inside the occluder sphere; the
            // visibility test then accepts everything
            horizon_distance_sq: camera.length_squared() - radius * radius,
        }
    }

    /// Whether a point is hidden behind the horizon.
    pub fn is_point_hidden(&self, point: DVec3) -> bool {
        if self.horizon_distance_sq <= 0.0 {
            // Camera at or below the surface: nothing is horizon-culled
            return false;
        }
        let to_point = point - self.camera;
        // Projection of the camera-to-point vector onto the camera-to-center
        // direction, scaled by the center distance
        let behind = -to_point.dot(self.camera);
        behind > self.horizon_distance_sq
            && behind * behind > self.horizon_distance_sq * to_point.length_squared()
    }

    /// Whether an entire sphere is hidden behind the horizon.
    ///
    /// Tests the sphere point nearest the camera; if even that point is
    /// hidden, the rest of the sphere is too.
    pub fn is_sphere_hidden(&self, sphere: &BoundingSphere) -> bool {
        let to_camera = self.camera - sphere.center;
        let len = to_camera.length();
        if len <= sphere.radius {
            return false;
        }
        let nearest = sphere.center + to_camera * (sphere.radius / len);
        self.is_point_hidden(nearest)
    }
}

/// Immutable per-frame camera state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    position: DVec3,
    frustum: Frustum,
    occluder: HorizonOccluder,
    /// Precomputed `viewport_height / (2 * tan(fov_y / 2))`.
    sse_factor: f64,
}

impl CameraState {
    /// Builds camera state from an ECEF pose.
    ///
    /// # Arguments
    ///
    /// * `position` - Camera position in ECEF meters
    /// * `target` - Look-at point in ECEF meters
    /// * `fov_y` - Vertical field of view in radians
    /// * `viewport_height` - Viewport height in pixels
    /// * `near`/`far` - Clip distances in meters
    pub fn look_at(
        position: DVec3,
        target: DVec3,
        fov_y: f64,
        viewport_width: u32,
        viewport_height: u32,
        near: f64,
        far: f64,
    ) -> Self {
        // Up along the geodetic vertical, falling back to the z axis when
        // looking straight down it
        let mut up = position.normalize_or_zero();
        let forward = (target - position).normalize_or_zero();
        if up.cross(forward).length_squared() < 1e-12 {
            up = DVec3::Z;
        }
        let view = DMat4::look_at_rh(position, target, up);
        let aspect = viewport_width.max(1) as f64 / viewport_height.max(1) as f64;
        let proj = DMat4::perspective_rh(fov_y, aspect, near, far);

        Self {
            position,
            frustum: Frustum::from_view_projection(proj * view),
            occluder: HorizonOccluder::new(position),
            sse_factor: viewport_height as f64 / (2.0 * (fov_y * 0.5).tan()),
        }
    }

    /// Builds camera state from a geodetic pose (degrees, meters).
    #[allow(clippy::too_many_arguments)]
    pub fn look_at_geodetic(
        eye_lat: f64,
        eye_lon: f64,
        eye_height: f64,
        target_lat: f64,
        target_lon: f64,
        target_height: f64,
        fov_y: f64,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Self {
        let position = geodetic_to_ecef(eye_lat, eye_lon, eye_height);
        let target = geodetic_to_ecef(target_lat, target_lon, target_height);
        // Near/far scaled to the eye altitude so orbital and ground-level
        // cameras both get usable depth ranges
        let near = (eye_height * 0.01).clamp(1.0, 10_000.0);
        let far = (eye_height + 2.0 * MEAN_RADIUS).max(100_000.0);
        Self::look_at(
            position,
            target,
            fov_y,
            viewport_width,
            viewport_height,
            near,
            far,
        )
    }

    /// Camera position in ECEF.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn occluder(&self) -> &HorizonOccluder {
        &self.occluder
    }

    /// Screen-space error in pixels for a tile with the given geometric
    /// error at the given distance.
    ///
    /// Distance is clamped to one meter so a camera inside a tile's
    /// bounding volume saturates the error instead of dividing by zero.
    pub fn screen_space_error(&self, geometric_error: f64, distance: f64) -> f64 {
        geometric_error * self.sse_factor / distance.max(1.0)
    }

    /// Distance from the camera to a bounding sphere's surface.
    pub fn distance_to(&self, sphere: &BoundingSphere) -> f64 {
        sphere.distance_to(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orbital_camera() -> CameraState {
        // 20,000 km above the equator at lon 0, looking at the globe center
        CameraState::look_at(
            DVec3::new(MEAN_RADIUS + 2.0e7, 0.0, 0.0),
            DVec3::ZERO,
            60.0_f64.to_radians(),
            1280,
            720,
            1000.0,
            1.0e9,
        )
    }

    #[test]
    fn test_frustum_contains_globe_center_sphere() {
        let camera = orbital_camera();
        let globe = BoundingSphere {
            center: DVec3::ZERO,
            radius: MEAN_RADIUS,
        };
        assert!(camera.frustum().intersects_sphere(&globe));
    }

    #[test]
    fn test_frustum_rejects_sphere_behind_camera() {
        let camera = orbital_camera();
        let behind = BoundingSphere {
            center: DVec3::new(MEAN_RADIUS + 4.0e7, 0.0, 0.0),
            radius: 1000.0,
        };
        assert!(!camera.frustum().intersects_sphere(&behind));
    }

    #[test]
    fn test_horizon_hides_far_side_of_globe() {
        let camera = orbital_camera();
        // Antipode surface point, directly behind the globe
        let antipode = BoundingSphere {
            center: DVec3::new(-MEAN_RADIUS, 0.0, 0.0),
            radius: 10_000.0,
        };
        assert!(camera.occluder().is_sphere_hidden(&antipode));
    }

    #[test]
    fn test_horizon_keeps_near_side_visible() {
        let camera = orbital_camera();
        let near_side = BoundingSphere {
            center: DVec3::new(MEAN_RADIUS, 0.0, 0.0),
            radius: 10_000.0,
        };
        assert!(!camera.occluder().is_sphere_hidden(&near_side));
    }

    #[test]
    fn test_underground_camera_disables_horizon_cull() {
        // Camera below the surface must not cull anything (and must not
        // panic); the selector degrades to plain frustum culling
        let occluder = HorizonOccluder::new(DVec3::new(MEAN_RADIUS * 0.5, 0.0, 0.0));
        let sphere = BoundingSphere {
            center: DVec3::new(-MEAN_RADIUS, 0.0, 0.0),
            radius: 100.0,
        };
        assert!(!occluder.is_sphere_hidden(&sphere));
    }

    #[test]
    fn test_sse_decreases_with_distance() {
        let camera = orbital_camera();
        let near = camera.screen_space_error(1000.0, 1.0e5);
        let far = camera.screen_space_error(1000.0, 1.0e7);
        assert!(near > far);
    }

    #[test]
    fn test_sse_clamps_degenerate_distance() {
        let camera = orbital_camera();
        let at_zero = camera.screen_space_error(1000.0, 0.0);
        let at_epsilon = camera.screen_space_error(1000.0, 1e-12);
        assert!(at_zero.is_finite());
        assert_eq!(at_zero, at_epsilon);
    }

    #[test]
    fn test_look_at_geodetic_matches_ecef_position() {
        let state = CameraState::look_at_geodetic(
            45.0, 9.0, 5000.0, 45.1, 9.0, 0.0, 1.0, 1024, 768,
        );
        let expected = geodetic_to_ecef(45.0, 9.0, 5000.0);
        assert!((state.position() - expected).length() < 1e-6);
    }

    #[test]
    fn test_straight_down_camera_does_not_panic() {
        // Looking along the geodetic vertical: the up fallback kicks in
        let state = CameraState::look_at_geodetic(
            0.0, 0.0, 10_000.0, 0.0, 0.0, 0.0, 1.0, 1024, 768,
        );
        let below = BoundingSphere {
            center: geodetic_to_ecef(0.0, 0.0, 0.0),
            radius: 1000.0,
        };
        assert!(state.frustum().intersects_sphere(&below));
    }
}
