//! Math utilities and types
//!
//! Provides fundamental math types for the engine core. Heavy lifting is
//! delegated to `nalgebra`; this module pins the concrete scalar types and
//! adds the small geometric helpers the editor and renderer need.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// 2 * Pi
    pub const TAU: f32 = 2.0 * PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// A ray with a normalized direction
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// World-space origin of the ray
    pub origin: Vec3,
    /// Normalized world-space direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing the supplied direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point along the ray at parameter `t`
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Construct a world-space ray from a cursor position inside a viewport.
    ///
    /// The ray origin is the camera position; the direction is the cursor
    /// point unprojected through the inverse view-projection matrix.
    ///
    /// # Arguments
    /// * `cursor` - Cursor position in window pixels
    /// * `viewport_rect` - Viewport rectangle (x, y, width, height) in pixels
    /// * `origin` - Camera world position
    /// * `view` - Camera view matrix
    /// * `projection` - Viewport projection matrix
    pub fn from_screen(
        cursor: Vec2,
        viewport_rect: Vec4,
        origin: Vec3,
        view: Mat4,
        projection: Mat4,
    ) -> Option<Self> {
        // Cursor to NDC within the viewport rectangle.
        let ndc_x = (cursor.x - viewport_rect.x) / viewport_rect.z * 2.0 - 1.0;
        let ndc_y = (cursor.y - viewport_rect.y) / viewport_rect.w * 2.0 - 1.0;

        let inverse_vp = (projection * view).try_inverse()?;
        let far_point = inverse_vp * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        if far_point.w.abs() <= f32::EPSILON {
            return None;
        }
        let world = Vec3::new(far_point.x, far_point.y, far_point.z) / far_point.w;
        Some(Self::new(origin, world - origin))
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Normal vector (normalized on construction)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane from a point on the plane and a normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(&point),
        }
    }

    /// Signed distance from the plane to a point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }

    /// Intersect a ray with this plane.
    ///
    /// Returns the intersection point, or `None` when the ray is parallel to
    /// the plane or the hit lies behind the ray origin.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<Vec3> {
        let denom = self.normal.dot(&ray.direction);
        if denom.abs() <= 1e-6 {
            return None;
        }
        let t = -(self.normal.dot(&ray.origin) + self.distance) / denom;
        if t < 0.0 {
            return None;
        }
        Some(ray.at(t))
    }
}

/// Axis-Aligned Bounding Box for raycasts and axis hit tests
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given half-extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Test ray intersection using the slab method.
    ///
    /// Returns the distance to the entry point if the ray intersects,
    /// `None` otherwise.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let inv_dir = Vec3::new(
            if ray.direction.x != 0.0 { 1.0 / ray.direction.x } else { f32::INFINITY },
            if ray.direction.y != 0.0 { 1.0 / ray.direction.y } else { f32::INFINITY },
            if ray.direction.z != 0.0 { 1.0 / ray.direction.z } else { f32::INFINITY },
        );

        let t1 = (self.min.x - ray.origin.x) * inv_dir.x;
        let t2 = (self.max.x - ray.origin.x) * inv_dir.x;
        let t3 = (self.min.y - ray.origin.y) * inv_dir.y;
        let t4 = (self.max.y - ray.origin.y) * inv_dir.y;
        let t5 = (self.min.z - ray.origin.z) * inv_dir.z;
        let t6 = (self.max.z - ray.origin.z) * inv_dir.z;

        let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        if tmax >= tmin && tmax >= 0.0 {
            Some(tmin.max(0.0))
        } else {
            None
        }
    }
}

/// Extension trait for Mat4 with projection and view construction helpers
pub trait Mat4Ext {
    /// Create a perspective projection matrix (depth range [0, 1])
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an orthographic projection matrix (depth range [0, 1])
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Create a look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Copy of this matrix with the translation column zeroed.
    ///
    /// Used by the skybox view so the cube stays centered on the camera.
    fn without_translation(&self) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        // Right-handed, -Z forward, matching `look_at`; depth maps to [0, 1].
        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = -1.0;
        result
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / (right - left);
        result[(1, 1)] = 2.0 / (top - bottom);
        result[(2, 2)] = 1.0 / (far - near);
        result[(0, 3)] = -(right + left) / (right - left);
        result[(1, 3)] = -(top + bottom) / (top - bottom);
        result[(2, 3)] = -near / (far - near);
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn without_translation(&self) -> Mat4 {
        let mut result = *self;
        result[(0, 3)] = 0.0;
        result[(1, 3)] = 0.0;
        result[(2, 3)] = 0.0;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ray_plane_intersection() {
        let plane = Plane::from_point_normal(Vec3::zeros(), Vec3::y_axis().into_inner());
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -1.0, 0.0));

        let hit = plane.intersect_ray(&ray).expect("ray should hit plane");
        assert_relative_eq!(hit, Vec3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn test_ray_plane_parallel_misses() {
        let plane = Plane::from_point_normal(Vec3::zeros(), Vec3::y_axis().into_inner());
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0));

        assert!(plane.intersect_ray(&ray).is_none());
    }

    #[test]
    fn test_aabb_ray_hit_distance() {
        let aabb = Aabb::from_center_extents(Vec3::new(0.0, 0.0, -10.0), Vec3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));

        let distance = aabb.intersect_ray(&ray).expect("ray should hit box");
        assert_relative_eq!(distance, 9.0, epsilon = 1e-5);
    }

    #[test]
    fn test_aabb_ray_miss() {
        let aabb = Aabb::from_center_extents(Vec3::new(10.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));

        assert!(aabb.intersect_ray(&ray).is_none());
    }

    #[test]
    fn test_view_without_translation() {
        let view = Mat4::look_at(
            Vec3::new(3.0, 4.0, 5.0),
            Vec3::zeros(),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let centered = view.without_translation();

        assert_eq!(centered[(0, 3)], 0.0);
        assert_eq!(centered[(1, 3)], 0.0);
        assert_eq!(centered[(2, 3)], 0.0);
        // Rotation block untouched
        assert_eq!(centered[(0, 0)], view[(0, 0)]);
    }

    #[test]
    fn test_perspective_matches_view_handedness() {
        let projection = Mat4::perspective(constants::HALF_PI, 1.0, 0.1, 100.0);

        // Points in front of a -Z-forward camera land inside the clip volume
        // with positive w; depth spans [0, 1] from near to far.
        let near_clip = projection * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far_clip = projection * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!(near_clip.w > 0.0);
        assert_relative_eq!(near_clip.z / near_clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far_clip.z / far_clip.w, 1.0, epsilon = 1e-4);

        // Points behind the camera fall outside (negative w).
        let behind = projection * Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert!(behind.w < 0.0);
    }

    #[test]
    fn test_screen_ray_points_toward_scene() {
        let projection = Mat4::perspective(constants::HALF_PI * 0.5, 16.0 / 9.0, 0.1, 100.0);
        let eye = Vec3::new(0.0, 0.0, 5.0);
        let view = Mat4::look_at(eye, Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0));

        // Center of a 1280x720 viewport
        let ray = Ray::from_screen(
            Vec2::new(640.0, 360.0),
            Vec4::new(0.0, 0.0, 1280.0, 720.0),
            eye,
            view,
            projection,
        )
        .expect("ray construction should succeed");

        assert_relative_eq!(ray.origin, eye, epsilon = 1e-6);
        // Looking down -Z from +Z toward origin
        assert!(ray.direction.z < -0.9);
    }
}
