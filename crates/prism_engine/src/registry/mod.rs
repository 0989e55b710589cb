//! Light and camera registries
//!
//! Fixed-capacity, name-keyed pools with refcounted acquire/release.
//! `acquire` returns the existing entry when the name is already present;
//! releasing the last reference resets the slot. A default camera is always
//! available.

use thiserror::Error;

use crate::foundation::math::{Mat4, Quat, Vec3, Vec4};

/// Name of the always-present default camera
pub const DEFAULT_CAMERA_NAME: &str = "default";

/// Errors surfaced by the registries
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry is at capacity
    #[error("registry full: {capacity} slots in use")]
    Full {
        /// Fixed capacity of the registry
        capacity: usize,
    },

    /// No entry with the requested name
    #[error("no registry entry named '{0}'")]
    NotFound(String),
}

/// A free-look camera with a lazily rebuilt view matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    /// Euler rotation (pitch, yaw, roll) in radians
    euler: Vec3,
    view: Mat4,
    dirty: bool,
}

impl Camera {
    /// Create a camera at the origin looking down -Z
    pub fn new() -> Self {
        Self {
            position: Vec3::zeros(),
            euler: Vec3::zeros(),
            view: Mat4::identity(),
            dirty: true,
        }
    }

    /// World position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Set the world position
    pub fn position_set(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    /// Euler rotation (pitch, yaw, roll) in radians
    pub fn euler(&self) -> Vec3 {
        self.euler
    }

    /// Set the euler rotation (pitch, yaw, roll) in radians
    pub fn euler_set(&mut self, euler: Vec3) {
        self.euler = euler;
        self.dirty = true;
    }

    /// Apply yaw around the world up axis
    pub fn yaw(&mut self, amount: f32) {
        self.euler.y += amount;
        self.dirty = true;
    }

    /// Apply pitch, clamped short of the poles
    pub fn pitch(&mut self, amount: f32) {
        const LIMIT: f32 = 1.55; // just under pi/2
        self.euler.x = (self.euler.x + amount).clamp(-LIMIT, LIMIT);
        self.dirty = true;
    }

    /// Forward direction derived from the current rotation
    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::new(0.0, 0.0, -1.0)
    }

    /// Right direction derived from the current rotation
    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::new(1.0, 0.0, 0.0)
    }

    /// Move along the forward direction
    pub fn move_forward(&mut self, amount: f32) {
        self.position += self.forward() * amount;
        self.dirty = true;
    }

    /// Move along the right direction
    pub fn move_right(&mut self, amount: f32) {
        self.position += self.right() * amount;
        self.dirty = true;
    }

    /// View matrix, rebuilt if position or rotation changed
    pub fn view_get(&mut self) -> Mat4 {
        if self.dirty {
            let world = Mat4::new_translation(&self.position) * self.rotation().to_homogeneous();
            self.view = world.try_inverse().unwrap_or_else(Mat4::identity);
            self.dirty = false;
        }
        self.view
    }

    fn rotation(&self) -> Quat {
        Quat::from_euler_angles(self.euler.x, self.euler.y, self.euler.z)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

/// Light kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Infinitely distant light with a direction only
    Directional,
    /// Positional light with distance falloff
    Point,
}

/// A scene light
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Directional or point
    pub kind: LightKind,
    /// RGBA colour
    pub colour: Vec4,
    /// Position (point lights)
    pub position: Vec3,
    /// Direction (directional lights)
    pub direction: Vec3,
    /// Constant attenuation factor (point lights)
    pub constant: f32,
    /// Linear attenuation factor (point lights)
    pub linear: f32,
    /// Quadratic attenuation factor (point lights)
    pub quadratic: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Directional,
            colour: Vec4::new(1.0, 1.0, 1.0, 1.0),
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
        }
    }
}

struct NamedSlot<T> {
    name: String,
    refcount: usize,
    value: T,
}

/// Fixed-capacity name-keyed pool with refcounted slots
pub struct NamedPool<T> {
    slots: Vec<Option<NamedSlot<T>>>,
}

impl<T: Default> NamedPool<T> {
    /// Create a pool with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Acquire by name: returns the existing slot index (bumping its
    /// refcount) or allocates a new one with a default value.
    pub fn acquire(&mut self, name: &str) -> Result<usize, RegistryError> {
        if let Some(index) = self.find(name) {
            if let Some(slot) = &mut self.slots[index] {
                slot.refcount += 1;
            }
            return Ok(index);
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::Full {
                capacity: self.slots.len(),
            })?;
        self.slots[index] = Some(NamedSlot {
            name: name.to_string(),
            refcount: 1,
            value: T::default(),
        });
        Ok(index)
    }

    /// Release by name; the slot resets when the refcount reaches zero
    pub fn release(&mut self, name: &str) -> Result<(), RegistryError> {
        let index = self
            .find(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let remove = match self.slots[index].as_mut() {
            Some(slot) => {
                slot.refcount = slot.refcount.saturating_sub(1);
                slot.refcount == 0
            }
            None => return Err(RegistryError::NotFound(name.to_string())),
        };
        if remove {
            self.slots[index] = None;
        }
        Ok(())
    }

    /// Shared access by slot index
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref().map(|slot| &slot.value)
    }

    /// Mutable access by slot index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut().map(|slot| &mut slot.value)
    }

    /// Mutable access by name
    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut T> {
        let index = self.find(name)?;
        self.get_mut(index)
    }

    /// Number of occupied slots
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.name == name))
    }

    /// Ensure `index` holds an entry named `name`, creating a default one
    /// when the slot is empty. Used for pinned entries that must always
    /// exist, such as the default camera.
    fn pin(&mut self, index: usize, name: &str) -> &mut T {
        let slot = self.slots[index].get_or_insert_with(|| NamedSlot {
            name: name.to_string(),
            refcount: 1,
            value: T::default(),
        });
        &mut slot.value
    }
}

/// Camera registry with a pinned default camera
pub struct CameraRegistry {
    pool: NamedPool<Camera>,
}

impl CameraRegistry {
    /// Default registry capacity
    pub const DEFAULT_CAPACITY: usize = 16;

    /// Create the registry and pin the default camera in slot 0
    pub fn new(capacity: usize) -> Self {
        let mut pool = NamedPool::new(capacity.max(1));
        pool.pin(0, DEFAULT_CAMERA_NAME);
        Self { pool }
    }

    /// Acquire a camera by name
    pub fn acquire(&mut self, name: &str) -> Result<usize, RegistryError> {
        self.pool.acquire(name)
    }

    /// Release a camera by name. The default camera is never released.
    pub fn release(&mut self, name: &str) -> Result<(), RegistryError> {
        if name == DEFAULT_CAMERA_NAME {
            log::warn!("attempted to release the default camera; ignored");
            return Ok(());
        }
        self.pool.release(name)
    }

    /// Mutable access to the default camera
    pub fn default_camera(&mut self) -> &mut Camera {
        self.pool.pin(0, DEFAULT_CAMERA_NAME)
    }

    /// Mutable access by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Camera> {
        self.pool.get_by_name_mut(name)
    }
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Light registry
pub struct LightRegistry {
    pool: NamedPool<Light>,
}

impl LightRegistry {
    /// Default registry capacity
    pub const DEFAULT_CAPACITY: usize = 32;

    /// Create the registry
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: NamedPool::new(capacity),
        }
    }

    /// Acquire a light by name
    pub fn acquire(&mut self, name: &str) -> Result<usize, RegistryError> {
        self.pool.acquire(name)
    }

    /// Release a light by name
    pub fn release(&mut self, name: &str) -> Result<(), RegistryError> {
        self.pool.release(name)
    }

    /// Mutable access by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Light> {
        self.pool.get_by_name_mut(name)
    }

    /// Number of live lights
    pub fn live_count(&self) -> usize {
        self.pool.live_count()
    }
}

impl Default for LightRegistry {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_acquire_returns_existing_entry() {
        let mut registry = LightRegistry::new(4);
        let a = registry.acquire("sun").expect("acquire");
        let b = registry.acquire("sun").expect("acquire");

        assert_eq!(a, b);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_release_resets_at_zero_refcount() {
        let mut registry = LightRegistry::new(4);
        registry.acquire("sun").expect("acquire");
        registry.acquire("sun").expect("acquire");

        registry.release("sun").expect("release");
        assert_eq!(registry.live_count(), 1);
        registry.release("sun").expect("release");
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_fixed_capacity_rejects_overflow() {
        let mut registry = LightRegistry::new(1);
        registry.acquire("sun").expect("acquire");

        assert_eq!(
            registry.acquire("moon"),
            Err(RegistryError::Full { capacity: 1 })
        );
    }

    #[test]
    fn test_default_camera_always_present() {
        let mut registry = CameraRegistry::default();
        registry.release(DEFAULT_CAMERA_NAME).expect("release ignored");

        let camera = registry.default_camera();
        camera.position_set(Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(camera.position(), Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn test_camera_view_inverts_position() {
        let mut camera = Camera::new();
        camera.position_set(Vec3::new(3.0, 0.0, 0.0));

        let view = camera.view_get();
        let moved = view.transform_point(&crate::foundation::math::Point3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(moved.coords, Vec3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_camera_forward_rotates_with_yaw() {
        let mut camera = Camera::new();
        assert_relative_eq!(camera.forward(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);

        camera.yaw(std::f32::consts::FRAC_PI_2);
        let forward = camera.forward();
        assert!(forward.x.abs() > 0.99);
    }
}
