//! FaultSource port - the fault interception mechanism.
//!
//! The engine consumes faults from this port and answers them with three
//! primitives: install a frame at a page, change a page's protection, and
//! revoke a page so the next access faults again.

use std::io;
use std::sync::Arc;
use core::time::Duration;

use bitflags::bitflags;

use crate::domain::{slot_arena::Frame, value_objects::PageAddress};

bitflags! {
    /// Access rights of an installed page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        /// Reads are allowed.
        const READ = 1 << 0;
        /// Writes are allowed.
        const WRITE = 1 << 1;
    }
}

/// One access that found no usable page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaultEvent {
    address: u64,
    is_write: bool,
}

impl FaultEvent {
    /// Create a fault notification for `address`.
    pub const fn new(address: u64, is_write: bool) -> Self {
        Self { address, is_write }
    }

    /// Faulting address (not necessarily page aligned).
    #[inline]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// Whether the faulting access was a write.
    #[inline]
    pub const fn is_write(&self) -> bool {
        self.is_write
    }
}

/// Port for the mechanism that delivers faults and maps frames.
///
/// A page is resident once [`install_page`](FaultSource::install_page)
/// returns. Installing read-only makes the next write raise a write fault,
/// which is how the engine learns a page became dirty.
pub trait FaultSource: Send + Sync {
    /// Wait up to `timeout` for the next fault.
    ///
    /// Returns `Ok(None)` when nothing arrived in time, so servicing threads
    /// can check for a stop request.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification channel failed.
    fn next_fault(&self, timeout: Duration) -> io::Result<Option<FaultEvent>>;

    /// Make `frame` the memory behind `page` and wake accesses waiting on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the page could not be mapped.
    fn install_page(&self, page: PageAddress, frame: Arc<Frame>, protection: Protection) -> io::Result<()>;

    /// Change the protection of an installed page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page is not installed.
    fn protect(&self, page: PageAddress, protection: Protection) -> io::Result<()>;

    /// Unmap `page` so later accesses fault instead of touching its frame.
    ///
    /// Revoking a page that is not installed is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping could not be removed.
    fn revoke(&self, page: PageAddress) -> io::Result<()>;

    /// Report that a fault could not be resolved.
    ///
    /// The default implementation does nothing, leaving the access to
    /// fault again.
    fn reject(&self, event: FaultEvent, reason: &str) {
        let _ = (event, reason);
    }

    /// Stop delivering faults; accesses still waiting for a page fail.
    ///
    /// Called first when a region is unmapped. The default does nothing.
    fn close(&self) {}
}
