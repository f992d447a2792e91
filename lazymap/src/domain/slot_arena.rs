//! Fixed arena of page frames plus the free list of their slots.
//!
//! The arena is allocated once, when the buffer is sized, and never grows.
//! Frames are shared (`Arc`) with the fault source that installs them, the
//! way a page table entry refers to a physical frame; which thread may
//! touch a frame is decided by the owning descriptor's state.

use core::ops::{Deref, DerefMut};
use std::sync::Arc;

use aligned::{A512, Aligned};
use parking_lot::{Mutex, MutexGuard};

use crate::domain::value_objects::{BLOCK_SIZE, ConfigError, SlotId};

/// One direct-I/O block of a frame.
pub type Block = Aligned<A512, [u8; BLOCK_SIZE]>;

/// Page-sized memory made of [`BLOCK_SIZE`]-aligned blocks.
pub struct PageMemory {
    blocks: Box<[Block]>,
}

impl PageMemory {
    fn zeroed(page_size: usize) -> Self {
        let blocks = (0..page_size / BLOCK_SIZE)
            .map(|_| Aligned([0u8; BLOCK_SIZE]))
            .collect();
        Self { blocks }
    }

    /// The frame as aligned blocks.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

impl Deref for PageMemory {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        block_device_driver::blocks_to_slice(&self.blocks)
    }
}

impl DerefMut for PageMemory {
    fn deref_mut(&mut self) -> &mut [u8] {
        block_device_driver::blocks_to_slice_mut(&mut self.blocks)
    }
}

/// One physical frame of the buffer.
pub struct Frame {
    slot: SlotId,
    memory: Mutex<PageMemory>,
}

impl Frame {
    fn new(slot: SlotId, page_size: usize) -> Self {
        Self {
            slot,
            memory: Mutex::new(PageMemory::zeroed(page_size)),
        }
    }

    /// Slot this frame occupies.
    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Lock the frame's bytes.
    ///
    /// Never take a fault-source lock while holding this guard.
    pub fn lock(&self) -> MutexGuard<'_, PageMemory> {
        self.memory.lock()
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame").field("slot", &self.slot).finish_non_exhaustive()
    }
}

/// The fixed set of frames backing a page buffer.
pub struct SlotArena {
    frames: Box<[Arc<Frame>]>,
    page_size: usize,
}

impl SlotArena {
    /// Allocate `capacity` zeroed frames of `page_size` bytes.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidPageSize`] unless `page_size` is a non-zero
    ///   multiple of [`BLOCK_SIZE`]
    /// - [`ConfigError::InvalidCapacity`] if `capacity` is zero or does not
    ///   fit a [`SlotId`]
    pub fn new(capacity: usize, page_size: usize) -> Result<Self, ConfigError> {
        if page_size == 0 || page_size % BLOCK_SIZE != 0 {
            return Err(ConfigError::InvalidPageSize {
                page_size,
                block_size: BLOCK_SIZE,
            });
        }
        let last = u32::try_from(capacity).map_err(|_| ConfigError::InvalidCapacity(capacity))?;
        if last == 0 {
            return Err(ConfigError::InvalidCapacity(capacity));
        }
        let frames = (0..last)
            .map(|i| Arc::new(Frame::new(SlotId::new(i), page_size)))
            .collect();
        Ok(Self { frames, page_size })
    }

    /// Number of frames.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Size of every frame in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The frame stored in `slot`, if the slot exists.
    pub fn frame(&self, slot: SlotId) -> Option<&Arc<Frame>> {
        self.frames.get(slot.index())
    }
}

/// Free list of slot indices. Lives under the buffer lock.
#[derive(Debug)]
pub(crate) struct FreeSlots {
    stack: Vec<SlotId>,
    in_use: Vec<bool>,
}

impl FreeSlots {
    pub(crate) fn new(capacity: usize) -> Self {
        // Reversed so that slot 0 is handed out first.
        let stack = (0..capacity as u32).rev().map(SlotId::new).collect();
        Self {
            stack,
            in_use: vec![false; capacity],
        }
    }

    pub(crate) fn pop(&mut self) -> Option<SlotId> {
        let slot = self.stack.pop()?;
        self.in_use[slot.index()] = true;
        Some(slot)
    }

    /// Take a specific slot out of the free list.
    pub(crate) fn take(&mut self, slot: SlotId) -> bool {
        match self.in_use.get(slot.index()) {
            Some(false) => {
                self.stack.retain(|s| *s != slot);
                self.in_use[slot.index()] = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn release(&mut self, slot: SlotId) {
        if let Some(used) = self.in_use.get_mut(slot.index()) {
            if *used {
                *used = false;
                self.stack.push(slot);
            }
        }
    }

    pub(crate) fn available(&self) -> usize {
        self.stack.len()
    }
}
