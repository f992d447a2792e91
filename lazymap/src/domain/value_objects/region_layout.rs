//! Geometry of a mapped region.

use super::{ConfigError, PageAddress};

/// Where a region lives in the address space and how it is cut into pages.
///
/// The layout translates page addresses into Store offsets: the first byte
/// of the region is Store offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    base: u64,
    len: u64,
    page_size: usize,
}

impl RegionLayout {
    /// Describe a region of `len` bytes starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MisalignedRegion`] if the region is empty or
    /// either bound is not page aligned, and [`ConfigError::InvalidPageSize`]
    /// if `page_size` is not a power of two.
    ///
    /// # Examples
    ///
    /// ```
    /// use lazymap::domain::RegionLayout;
    ///
    /// let layout = RegionLayout::new(0x10_0000, 8 * 4096, 4096).unwrap();
    /// assert_eq!(layout.page_count(), 8);
    /// ```
    pub const fn new(base: u64, len: u64, page_size: usize) -> Result<Self, ConfigError> {
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize {
                page_size,
                block_size: super::BLOCK_SIZE,
            });
        }
        let mask = page_size as u64 - 1;
        if len == 0 || base & mask != 0 || len & mask != 0 || base.checked_add(len).is_none() {
            return Err(ConfigError::MisalignedRegion { base, len });
        }
        Ok(Self {
            base,
            len,
            page_size,
        })
    }

    /// First address of the region.
    #[inline]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Length of the region in bytes.
    #[inline]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Page size in bytes.
    #[inline]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages in the region.
    #[inline]
    pub const fn page_count(&self) -> u64 {
        self.len / self.page_size as u64
    }

    /// Check whether an address falls inside the region.
    #[inline]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.base && address - self.base < self.len
    }

    /// The page holding `address`, if the address is inside the region.
    pub const fn page_of(&self, address: u64) -> Option<PageAddress> {
        if self.contains(address) {
            Some(PageAddress::containing(address, self.page_size))
        } else {
            None
        }
    }

    /// Store offset backing the given page.
    #[inline]
    pub const fn store_offset(&self, page: PageAddress) -> u64 {
        page.value() - self.base
    }

    /// Address of the `index`-th page.
    #[inline]
    pub const fn page_at(&self, index: u64) -> PageAddress {
        PageAddress::new(self.base + index * self.page_size as u64)
    }
}
