//! Transform store
//!
//! Structure-of-arrays storage for positions, rotations, scales and the
//! derived local/world matrices, addressed through generational handles.
//! Mutators append to a dirty list; local matrices are recomputed lazily on
//! read. The store does not own parent links: the scene composer supplies
//! parent·local composition each frame through `world_set`.

use crate::foundation::math::{Mat4, Quat, Vec3};
use crate::handle::{Handle, HandleError, INVALID_UNIQUE_ID};

/// Structure-of-arrays transform storage.
///
/// Every array is indexed by the handle's slot index; `unique_ids` carries
/// the generation that validates reads.
#[derive(Debug, Default)]
pub struct TransformStore {
    unique_ids: Vec<u64>,
    positions: Vec<Vec3>,
    rotations: Vec<Quat>,
    scales: Vec<Vec3>,
    locals: Vec<Mat4>,
    worlds: Vec<Mat4>,
    // Slot indices whose local matrix is stale; deduplicated on insert.
    dirty: Vec<u32>,
    next_unique_id: u64,
}

impl TransformStore {
    /// Create a store with the given initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let mut store = Self {
            next_unique_id: 1,
            ..Self::default()
        };
        store.grow_to(capacity);
        store
    }

    /// Acquire an identity transform
    pub fn acquire(&mut self) -> Handle {
        self.acquire_from(Vec3::zeros(), Quat::identity(), Vec3::new(1.0, 1.0, 1.0))
    }

    /// Acquire a transform with the given components
    pub fn acquire_from(&mut self, position: Vec3, rotation: Quat, scale: Vec3) -> Handle {
        let index = match self
            .unique_ids
            .iter()
            .position(|id| *id == INVALID_UNIQUE_ID)
        {
            Some(index) => index,
            None => {
                let old = self.unique_ids.len();
                self.grow_to((old * 2).max(8));
                old
            }
        };

        let unique_id = self.next_unique_id;
        self.next_unique_id += 1;

        self.unique_ids[index] = unique_id;
        self.positions[index] = position;
        self.rotations[index] = rotation;
        self.scales[index] = scale;
        self.locals[index] = Mat4::identity();
        self.worlds[index] = Mat4::identity();
        self.mark_dirty(index as u32);

        Handle {
            index: index as u32,
            unique_id,
        }
    }

    /// Release a transform; subsequent accesses through the handle fail
    pub fn release(&mut self, handle: Handle) -> Result<(), HandleError> {
        let index = self.validate(handle)?;
        self.unique_ids[index] = INVALID_UNIQUE_ID;
        self.dirty.retain(|i| *i != handle.index);
        Ok(())
    }

    /// True when the handle still refers to a live transform
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.validate(handle).is_ok()
    }

    /// Position component, or zero with a warning for a stale handle
    pub fn position_get(&self, handle: Handle) -> Vec3 {
        match self.validate(handle) {
            Ok(index) => self.positions[index],
            Err(err) => {
                log::warn!("transform position_get: {err}");
                Vec3::zeros()
            }
        }
    }

    /// Set the position and mark the transform dirty
    pub fn position_set(&mut self, handle: Handle, position: Vec3) -> Result<(), HandleError> {
        let index = self.validate(handle)?;
        self.positions[index] = position;
        self.mark_dirty(handle.index);
        Ok(())
    }

    /// Add an offset to the position and mark the transform dirty
    pub fn translate(&mut self, handle: Handle, delta: Vec3) -> Result<(), HandleError> {
        let index = self.validate(handle)?;
        self.positions[index] += delta;
        self.mark_dirty(handle.index);
        Ok(())
    }

    /// Rotation component, or identity with a warning for a stale handle
    pub fn rotation_get(&self, handle: Handle) -> Quat {
        match self.validate(handle) {
            Ok(index) => self.rotations[index],
            Err(err) => {
                log::warn!("transform rotation_get: {err}");
                Quat::identity()
            }
        }
    }

    /// Set the rotation and mark the transform dirty
    pub fn rotation_set(&mut self, handle: Handle, rotation: Quat) -> Result<(), HandleError> {
        let index = self.validate(handle)?;
        self.rotations[index] = rotation;
        self.mark_dirty(handle.index);
        Ok(())
    }

    /// Apply a rotation on top of the current one and mark dirty
    pub fn rotate(&mut self, handle: Handle, rotation: Quat) -> Result<(), HandleError> {
        let index = self.validate(handle)?;
        self.rotations[index] = rotation * self.rotations[index];
        self.mark_dirty(handle.index);
        Ok(())
    }

    /// Scale component, or unit scale with a warning for a stale handle
    pub fn scale_get(&self, handle: Handle) -> Vec3 {
        match self.validate(handle) {
            Ok(index) => self.scales[index],
            Err(err) => {
                log::warn!("transform scale_get: {err}");
                Vec3::new(1.0, 1.0, 1.0)
            }
        }
    }

    /// Set the scale and mark the transform dirty
    pub fn scale_set(&mut self, handle: Handle, scale: Vec3) -> Result<(), HandleError> {
        let index = self.validate(handle)?;
        self.scales[index] = scale;
        self.mark_dirty(handle.index);
        Ok(())
    }

    /// Recompute the local matrix: local = T(position) · R(rotation) · S(scale)
    pub fn calculate_local(&mut self, handle: Handle) -> Result<Mat4, HandleError> {
        let index = self.validate(handle)?;
        let local = Mat4::new_translation(&self.positions[index])
            * self.rotations[index].to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scales[index]);
        self.locals[index] = local;
        self.dirty.retain(|i| *i != handle.index);
        Ok(local)
    }

    /// Local matrix, recomputed first if the transform is dirty
    pub fn local_get(&mut self, handle: Handle) -> Result<Mat4, HandleError> {
        let index = self.validate(handle)?;
        if self.dirty.contains(&handle.index) {
            return self.calculate_local(handle);
        }
        Ok(self.locals[index])
    }

    /// World matrix as last composed by the scene
    pub fn world_get(&self, handle: Handle) -> Result<Mat4, HandleError> {
        let index = self.validate(handle)?;
        Ok(self.worlds[index])
    }

    /// Store the composed world matrix. Called by the scene composer after
    /// hierarchical multiplication.
    pub fn world_set(&mut self, handle: Handle, world: Mat4) -> Result<(), HandleError> {
        let index = self.validate(handle)?;
        self.worlds[index] = world;
        Ok(())
    }

    /// Number of transforms currently pending a local recompute
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    fn mark_dirty(&mut self, index: u32) {
        // Linear scan dedup; dirty sets are small per frame.
        if !self.dirty.contains(&index) {
            self.dirty.push(index);
        }
    }

    fn validate(&self, handle: Handle) -> Result<usize, HandleError> {
        let index = handle.index as usize;
        if index >= self.unique_ids.len() {
            return Err(HandleError::OutOfRange {
                index: handle.index,
                capacity: self.unique_ids.len(),
            });
        }
        if self.unique_ids[index] != handle.unique_id || handle.unique_id == INVALID_UNIQUE_ID {
            return Err(HandleError::Stale {
                index: handle.index,
            });
        }
        Ok(index)
    }

    fn grow_to(&mut self, capacity: usize) {
        while self.unique_ids.len() < capacity {
            self.unique_ids.push(INVALID_UNIQUE_ID);
            self.positions.push(Vec3::zeros());
            self.rotations.push(Quat::identity());
            self.scales.push(Vec3::new(1.0, 1.0, 1.0));
            self.locals.push(Mat4::identity());
            self.worlds.push(Mat4::identity());
        }
    }
}
