//! Per-frame scratch allocation
//!
//! A linear arena owned by the engine and reset at the top of every frame.
//! Allocations are only valid until the next reset; there is no
//! per-allocation free. The arena hands out byte regions and bounded typed
//! lists; exhaustion is fatal-for-frame (the caller skips its contribution,
//! logs, and continues), never fatal for the engine.

use std::cell::Cell;

/// Default arena capacity: 8 MiB of per-frame scratch
pub const DEFAULT_FRAME_ARENA_SIZE: usize = 8 * 1024 * 1024;

/// A region reserved from the frame arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlice {
    /// Byte offset into the arena
    pub offset: usize,
    /// Region length in bytes
    pub len: usize,
}

/// Linear per-frame arena.
///
/// Tracks a bump offset over a fixed byte budget. Interior mutability lets
/// packet builders reserve space through a shared reference while the frame
/// data is threaded through every view.
#[derive(Debug)]
pub struct FrameArena {
    capacity: usize,
    used: Cell<usize>,
    high_water: Cell<usize>,
}

impl FrameArena {
    /// Create an arena with the given byte capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: Cell::new(0),
            high_water: Cell::new(0),
        }
    }

    /// Reserve `len` bytes with the given alignment.
    ///
    /// Returns `None` when the arena is exhausted; the caller must treat
    /// this as fatal-for-frame.
    pub fn alloc_bytes(&self, len: usize, align: usize) -> Option<FrameSlice> {
        debug_assert!(align.is_power_of_two());
        let offset = (self.used.get() + align - 1) & !(align - 1);
        let end = offset.checked_add(len)?;
        if end > self.capacity {
            log::warn!(
                "frame arena exhausted: requested {} bytes, {} of {} in use",
                len,
                self.used.get(),
                self.capacity
            );
            return None;
        }
        self.used.set(end);
        if end > self.high_water.get() {
            self.high_water.set(end);
        }
        Some(FrameSlice { offset, len })
    }

    /// Reserve space for `count` values of `T` with natural alignment
    pub fn alloc<T>(&self, count: usize) -> Option<FrameSlice> {
        self.alloc_bytes(count * std::mem::size_of::<T>(), std::mem::align_of::<T>().max(1))
    }

    /// Reserve a bounded typed list backed by arena-accounted storage.
    ///
    /// The list refuses to grow past its reserved capacity; it must not be
    /// retained across frames.
    pub fn alloc_list<T>(&self, capacity: usize) -> Option<FrameList<T>> {
        let region = self.alloc::<T>(capacity)?;
        Some(FrameList {
            items: Vec::with_capacity(capacity),
            region,
        })
    }

    /// Bytes currently in use this frame
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Largest usage observed since creation
    pub fn high_water(&self) -> usize {
        self.high_water.get()
    }

    /// Total byte capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reset the arena at frame start. All outstanding regions and lists
    /// become invalid.
    pub fn reset(&self) {
        self.used.set(0);
    }
}

/// Bounded typed list drawn from the frame arena.
///
/// Capacity is fixed at allocation time; `push` reports overflow instead of
/// growing so arena accounting stays truthful.
#[derive(Debug)]
pub struct FrameList<T> {
    items: Vec<T>,
    region: FrameSlice,
}

impl<T> FrameList<T> {
    /// Append a value. Returns false (and drops the value) when the list is
    /// at capacity.
    pub fn push(&mut self, value: T) -> bool {
        if self.items.len() == self.items.capacity() {
            log::warn!("frame list full ({} entries), submission dropped", self.items.capacity());
            return false;
        }
        self.items.push(value);
        true
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no entries have been pushed
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Entries as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// Iterate over entries
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Arena region backing this list
    pub fn region(&self) -> FrameSlice {
        self.region
    }

    /// Sort entries by a key
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> std::cmp::Ordering,
    {
        self.items.sort_by(compare);
    }
}

impl<'a, T> IntoIterator for &'a FrameList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Per-frame data handed to every view packet builder.
///
/// Owns the scratch arena plus the frame counters views use to dedupe
/// uniform updates. Views must not retain references across frames.
#[derive(Debug)]
pub struct FrameData {
    /// Per-frame scratch arena
    pub arena: FrameArena,
    /// Monotonic frame number
    pub frame_number: u64,
    /// Seconds since the previous frame
    pub delta_time: f32,
    /// Seconds since engine boot
    pub total_time: f64,
    draw_index: Cell<u32>,
}

impl FrameData {
    /// Create frame data with an arena of the given capacity
    pub fn new(arena_capacity: usize) -> Self {
        Self {
            arena: FrameArena::new(arena_capacity),
            frame_number: 0,
            delta_time: 0.0,
            total_time: 0.0,
            draw_index: Cell::new(0),
        }
    }

    /// Advance to the next frame: bump the frame number, reset the arena
    /// and the draw index counter.
    pub fn begin_frame(&mut self, delta_time: f32) {
        self.frame_number += 1;
        self.delta_time = delta_time;
        self.total_time += f64::from(delta_time);
        self.draw_index.set(0);
        self.arena.reset();
    }

    /// Current draw index within the frame
    pub fn draw_index(&self) -> u32 {
        self.draw_index.get()
    }

    /// Bump and return the previous draw index
    pub fn next_draw_index(&self) -> u32 {
        let index = self.draw_index.get();
        self.draw_index.set(index + 1);
        index
    }
}

impl Default for FrameData {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_ARENA_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_respects_alignment() {
        let arena = FrameArena::new(1024);
        arena.alloc_bytes(3, 1).expect("alloc");
        let aligned = arena.alloc_bytes(16, 16).expect("alloc");

        assert_eq!(aligned.offset % 16, 0);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let arena = FrameArena::new(64);
        assert!(arena.alloc_bytes(48, 1).is_some());
        assert!(arena.alloc_bytes(48, 1).is_none());
        // Failed allocation must not consume budget
        assert_eq!(arena.used(), 48);
    }

    #[test]
    fn test_reset_reclaims_everything() {
        let arena = FrameArena::new(128);
        arena.alloc_bytes(100, 1).expect("alloc");
        arena.reset();

        assert_eq!(arena.used(), 0);
        assert!(arena.alloc_bytes(100, 1).is_some());
        assert_eq!(arena.high_water(), 100);
    }

    #[test]
    fn test_frame_list_bounded() {
        let arena = FrameArena::new(1024);
        let mut list: FrameList<u32> = arena.alloc_list(2).expect("list");

        assert!(list.push(1));
        assert!(list.push(2));
        assert!(!list.push(3));
        assert_eq!(list.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_begin_frame_resets_counters() {
        let mut frame = FrameData::new(256);
        frame.arena.alloc_bytes(200, 1).expect("alloc");
        frame.next_draw_index();
        frame.next_draw_index();

        frame.begin_frame(0.016);

        assert_eq!(frame.frame_number, 1);
        assert_eq!(frame.draw_index(), 0);
        assert_eq!(frame.arena.used(), 0);
    }
}
