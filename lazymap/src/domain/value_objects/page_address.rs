//! Type-safe page address value object.

use core::fmt;

/// The page-aligned virtual address of one page in a mapped region.
///
/// This value object keeps page addresses apart from raw byte offsets and
/// slot indices. Construction through [`PageAddress::containing`] always
/// yields an aligned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageAddress(u64);

impl PageAddress {
    /// Create a page address from an already aligned value.
    ///
    /// # Examples
    ///
    /// ```
    /// use lazymap::domain::PageAddress;
    ///
    /// let addr = PageAddress::new(0x2000);
    /// assert_eq!(addr.value(), 0x2000);
    /// ```
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Align an arbitrary address down to the page that contains it.
    ///
    /// `page_size` must be a power of two.
    ///
    /// ```
    /// use lazymap::domain::PageAddress;
    ///
    /// let addr = PageAddress::containing(0x2a31, 4096);
    /// assert_eq!(addr.value(), 0x2000);
    /// ```
    #[inline]
    pub const fn containing(address: u64, page_size: usize) -> Self {
        Self(address & !(page_size as u64 - 1))
    }

    /// Get the underlying address.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Check whether the address sits on a page boundary.
    #[inline]
    pub const fn is_aligned(self, page_size: usize) -> bool {
        self.0 % page_size as u64 == 0
    }

    /// The address of the following page.
    #[inline]
    pub const fn next(self, page_size: usize) -> Self {
        Self(self.0.saturating_add(page_size as u64))
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:#x})", self.0)
    }
}

impl From<PageAddress> for u64 {
    fn from(addr: PageAddress) -> Self {
        addr.value()
    }
}
