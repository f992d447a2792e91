//! Page descriptor entity - one tracked virtual page.

use super::PageState;
use crate::domain::value_objects::{PageAddress, SlotId};

/// A snapshot of one page tracked by the page buffer.
///
/// The buffer owns the authoritative copy; callers receive copies of it.
/// A descriptor handed out by a claim is the caller's ticket to the page:
/// while it is `Leaving`, no other thread may change the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    address: PageAddress,
    slot: SlotId,
    state: PageState,
    dirty: bool,
    token: u64,
}

impl PageDescriptor {
    pub(crate) const fn new(address: PageAddress, slot: SlotId, state: PageState, token: u64) -> Self {
        Self {
            address,
            slot,
            state,
            dirty: false,
            token,
        }
    }

    /// Virtual address of the page.
    #[inline]
    pub const fn address(&self) -> PageAddress {
        self.address
    }

    /// Slot holding the page's frame.
    #[inline]
    pub const fn slot(&self) -> SlotId {
        self.slot
    }

    /// Current lifecycle state.
    #[inline]
    pub const fn state(&self) -> PageState {
        self.state
    }

    /// Recency token; smaller is older.
    #[inline]
    pub const fn token(&self) -> u64 {
        self.token
    }

    /// Check if the page was written since it was last read or written back.
    #[inline]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Check if the page is resident and not owned by another thread.
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.state.is_present()
    }

    pub(crate) fn set_state(&mut self, state: PageState) {
        self.state = state;
    }

    pub(crate) fn set_token(&mut self, token: u64) {
        self.token = token;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
