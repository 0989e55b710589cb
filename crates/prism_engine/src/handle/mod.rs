//! Generational handle store
//!
//! Handles replace direct pointers for every shared entity in the engine.
//! A handle pairs a slot index with the unique id that was minted when the
//! slot was acquired; any read-through revalidates the pair, so a stale
//! handle fails loudly instead of aliasing whatever reused the slot.

use thiserror::Error;

/// Sentinel marking a slot as unoccupied
pub const INVALID_UNIQUE_ID: u64 = 0;

/// Sentinel id meaning "no object" in pick results and selections
pub const INVALID_ID: u32 = u32::MAX;

/// Errors surfaced by handle validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    /// The handle's index is outside the store
    #[error("handle index {index} out of range (capacity {capacity})")]
    OutOfRange {
        /// Offending index
        index: u32,
        /// Store capacity at the time of the access
        capacity: usize,
    },

    /// The handle's unique id no longer matches the slot
    #[error("stale handle: index {index} was released or reused")]
    Stale {
        /// Offending index
        index: u32,
    },
}

/// Generational handle: slot index plus the unique id minted at acquire time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Slot index into the owning store
    pub index: u32,
    /// Unique id that must match the slot for the handle to be valid
    pub unique_id: u64,
}

impl Handle {
    /// A handle that never validates
    pub fn invalid() -> Self {
        Self {
            index: u32::MAX,
            unique_id: INVALID_UNIQUE_ID,
        }
    }

    /// True when this handle is the invalid sentinel
    pub fn is_invalid(&self) -> bool {
        self.unique_id == INVALID_UNIQUE_ID
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::invalid()
    }
}

// Slots are aligned to 16 bytes so stores of math-heavy payloads stay
// vector-friendly.
#[derive(Debug)]
#[repr(align(16))]
struct Slot<T> {
    unique_id: u64,
    value: T,
}

/// Generic generational store.
///
/// `acquire` scans for a free slot and doubles capacity when none exists;
/// growth preserves existing indices and the store never shrinks within a
/// session.
#[derive(Debug)]
pub struct HandleStore<T> {
    slots: Vec<Slot<T>>,
    next_unique_id: u64,
}

impl<T: Default> HandleStore<T> {
    /// Create a store with the given initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                unique_id: INVALID_UNIQUE_ID,
                value: T::default(),
            });
        }
        Self {
            slots,
            next_unique_id: 1,
        }
    }

    /// Acquire a slot for `value` and return its handle.
    ///
    /// Scans for a released slot first; when every slot is occupied the
    /// store doubles its capacity.
    pub fn acquire(&mut self, value: T) -> Handle {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.unique_id == INVALID_UNIQUE_ID)
        {
            let unique_id = self.mint_id();
            self.slots[index].unique_id = unique_id;
            self.slots[index].value = value;
            return Handle {
                index: index as u32,
                unique_id,
            };
        }

        // Full: double capacity (minimum one slot) and take the first new slot.
        let old_capacity = self.slots.len();
        let grow_by = old_capacity.max(1);
        log::debug!(
            "handle store growing from {} to {} slots",
            old_capacity,
            old_capacity + grow_by
        );
        for _ in 0..grow_by {
            self.slots.push(Slot {
                unique_id: INVALID_UNIQUE_ID,
                value: T::default(),
            });
        }

        let unique_id = self.mint_id();
        self.slots[old_capacity].unique_id = unique_id;
        self.slots[old_capacity].value = value;
        Handle {
            index: old_capacity as u32,
            unique_id,
        }
    }

    /// Release a handle, marking its slot free.
    ///
    /// The payload is replaced with its default so dropped resources are
    /// reclaimed immediately. Releasing a stale handle is an error and
    /// mutates nothing.
    pub fn release(&mut self, handle: Handle) -> Result<T, HandleError> {
        let index = self.validate(handle)?;
        self.slots[index].unique_id = INVALID_UNIQUE_ID;
        Ok(std::mem::take(&mut self.slots[index].value))
    }
}

impl<T> HandleStore<T> {
    /// Validated shared access to a slot's payload
    pub fn get(&self, handle: Handle) -> Result<&T, HandleError> {
        let index = self.validate(handle)?;
        Ok(&self.slots[index].value)
    }

    /// Validated mutable access to a slot's payload
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut T, HandleError> {
        let index = self.validate(handle)?;
        Ok(&mut self.slots[index].value)
    }

    /// True when the handle still refers to a live slot
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.validate(handle).is_ok()
    }

    /// Current slot capacity
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.unique_id != INVALID_UNIQUE_ID)
            .count()
    }

    /// Iterate over occupied slots with their handles
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            (slot.unique_id != INVALID_UNIQUE_ID).then_some((
                Handle {
                    index: index as u32,
                    unique_id: slot.unique_id,
                },
                &slot.value,
            ))
        })
    }

    /// Iterate mutably over occupied slots with their handles
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            (slot.unique_id != INVALID_UNIQUE_ID).then_some((
                Handle {
                    index: index as u32,
                    unique_id: slot.unique_id,
                },
                &mut slot.value,
            ))
        })
    }

    fn validate(&self, handle: Handle) -> Result<usize, HandleError> {
        let index = handle.index as usize;
        if index >= self.slots.len() {
            return Err(HandleError::OutOfRange {
                index: handle.index,
                capacity: self.slots.len(),
            });
        }
        if self.slots[index].unique_id != handle.unique_id
            || handle.unique_id == INVALID_UNIQUE_ID
        {
            return Err(HandleError::Stale {
                index: handle.index,
            });
        }
        Ok(index)
    }

    fn mint_id(&mut self) -> u64 {
        let id = self.next_unique_id;
        self.next_unique_id += 1;
        id
    }
}

impl<T: Default> Default for HandleStore<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
