//! Type-safe buffer slot identifier.

use core::fmt;

/// Index of a frame in the fixed slot arena.
///
/// Descriptors hold a `SlotId`, never a pointer into the arena, so a slot
/// that is freed and reused cannot be reached through a stale reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    /// Create a new slot identifier.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the underlying index.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// The index as a `usize`, for arena lookups.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}

impl From<u32> for SlotId {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}
