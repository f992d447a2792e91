//! Residency state of a tracked page.

/// Where a tracked page is in its lifecycle.
///
/// Pages transition through these states:
/// - Filling: a slot is reserved and a Store read is in progress
/// - Present: installed and resolvable without touching the Store
/// - Leaving: handed to a flusher; no other thread may touch it until the
///   flusher removes it (or gives it back after a failed write-back)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Slot reserved, fill from the Store in progress.
    Filling,
    /// Resident and installed.
    Present,
    /// Owned by an in-flight work item.
    Leaving,
}

impl PageState {
    /// Check if the page is resident and available to faults and sweeps.
    #[inline]
    pub const fn is_present(&self) -> bool {
        matches!(self, PageState::Present)
    }

    /// Check if another thread currently owns the page.
    #[inline]
    pub const fn is_busy(&self) -> bool {
        matches!(self, PageState::Filling | PageState::Leaving)
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self::Filling
    }
}
