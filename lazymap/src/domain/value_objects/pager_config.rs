//! Pager configuration value object.

use core::time::Duration;

/// Block size every page size must be a multiple of (512 bytes).
///
/// Frames are aligned to this boundary so file stores can use direct I/O.
pub const BLOCK_SIZE: usize = 512;

/// Default page size (4KB).
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Configuration values consumed by the paging engine.
///
/// Every thread group and the page buffer receive their sizing from this
/// value at construction time; there is no process-wide registry.
///
/// # Examples
///
/// ```
/// use core::time::Duration;
/// use lazymap::domain::PagerConfig;
///
/// let config = PagerConfig::new()
///     .with_buffer_pages(64)
///     .with_flusher_workers(2)
///     .with_sweep_interval(Duration::from_millis(100));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.buffer_pages(), 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerConfig {
    page_size: usize,
    buffer_pages: usize,
    flusher_workers: usize,
    fault_workers: usize,
    queue_depth: usize,
    sweep_interval: Duration,
    evict_high_water: u8,
    evict_low_water: u8,
    slot_wait_timeout: Duration,
}

impl PagerConfig {
    /// Create a configuration with the default values.
    pub const fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pages: 1024,
            flusher_workers: 4,
            fault_workers: 2,
            queue_depth: 256,
            sweep_interval: Duration::from_secs(1),
            evict_high_water: 90,
            evict_low_water: 70,
            slot_wait_timeout: Duration::from_secs(30),
        }
    }

    /// Set the page size in bytes.
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the buffer capacity in pages.
    pub const fn with_buffer_pages(mut self, pages: usize) -> Self {
        self.buffer_pages = pages;
        self
    }

    /// Set the number of Flushers worker threads.
    pub const fn with_flusher_workers(mut self, workers: usize) -> Self {
        self.flusher_workers = workers;
        self
    }

    /// Set the number of fault-servicing threads.
    pub const fn with_fault_workers(mut self, workers: usize) -> Self {
        self.fault_workers = workers;
        self
    }

    /// Set the bound of the Flushers work queue.
    pub const fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set the orchestrator's sweep interval.
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the eviction watermarks as percentages of capacity.
    ///
    /// The high mark is rounded up to whole pages and the low mark down, so
    /// a small buffer that is merely full is never swept.
    pub const fn with_watermarks(mut self, low: u8, high: u8) -> Self {
        self.evict_low_water = low;
        self.evict_high_water = high;
        self
    }

    /// Set how long a fault may wait for a free slot.
    pub const fn with_slot_wait_timeout(mut self, timeout: Duration) -> Self {
        self.slot_wait_timeout = timeout;
        self
    }

    /// Page size in bytes.
    #[inline]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Buffer capacity in pages.
    #[inline]
    pub const fn buffer_pages(&self) -> usize {
        self.buffer_pages
    }

    /// Number of Flushers worker threads.
    #[inline]
    pub const fn flusher_workers(&self) -> usize {
        self.flusher_workers
    }

    /// Number of fault-servicing threads.
    #[inline]
    pub const fn fault_workers(&self) -> usize {
        self.fault_workers
    }

    /// Bound of the Flushers work queue.
    #[inline]
    pub const fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Interval between periodic sweeps.
    #[inline]
    pub const fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Bounded wait for a free slot.
    #[inline]
    pub const fn slot_wait_timeout(&self) -> Duration {
        self.slot_wait_timeout
    }

    /// Residency (in pages) above which a periodic sweep starts evicting.
    pub const fn high_water_pages(&self) -> usize {
        (self.buffer_pages * self.evict_high_water as usize).div_ceil(100)
    }

    /// Residency (in pages) a periodic sweep evicts down to.
    pub const fn low_water_pages(&self) -> usize {
        self.buffer_pages * self.evict_low_water as usize / 100
    }

    /// Check every value against its constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.page_size % BLOCK_SIZE != 0 || !self.page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize {
                page_size: self.page_size,
                block_size: BLOCK_SIZE,
            });
        }
        if self.buffer_pages == 0 || self.buffer_pages > u32::MAX as usize {
            return Err(ConfigError::InvalidCapacity(self.buffer_pages));
        }
        if self.flusher_workers == 0 {
            return Err(ConfigError::ZeroWorkers("flushers"));
        }
        if self.fault_workers == 0 {
            return Err(ConfigError::ZeroWorkers("fault servicer"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.evict_low_water >= self.evict_high_water || self.evict_high_water > 100 {
            return Err(ConfigError::InvalidWatermarks {
                low: self.evict_low_water,
                high: self.evict_high_water,
            });
        }
        Ok(())
    }
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors reported by [`PagerConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Page size is zero.
    ZeroPageSize,
    /// Page size is not a power-of-two multiple of the block size.
    InvalidPageSize {
        /// The requested page size.
        page_size: usize,
        /// The block size.
        block_size: usize,
    },
    /// Buffer capacity is zero or does not fit a slot index.
    InvalidCapacity(usize),
    /// A thread group was configured with no threads.
    ZeroWorkers(&'static str),
    /// The work queue bound is zero.
    ZeroQueueDepth,
    /// Region base or length is not page aligned, or the length is zero.
    MisalignedRegion {
        /// Region base address.
        base: u64,
        /// Region length in bytes.
        len: u64,
    },
    /// The region layout and the configuration disagree on the page size.
    PageSizeMismatch {
        /// Page size of the layout.
        layout: usize,
        /// Page size of the configuration.
        config: usize,
    },
    /// Watermarks are out of order or above 100%.
    InvalidWatermarks {
        /// Low watermark percentage.
        low: u8,
        /// High watermark percentage.
        high: u8,
    },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ZeroPageSize => write!(f, "Page size cannot be zero"),
            Self::InvalidPageSize {
                page_size,
                block_size,
            } => write!(
                f,
                "Page size {} must be a power of two and a multiple of block size {}",
                page_size, block_size
            ),
            Self::InvalidCapacity(pages) => write!(f, "Invalid buffer capacity of {} pages", pages),
            Self::ZeroWorkers(group) => write!(f, "The {} pool needs at least one thread", group),
            Self::ZeroQueueDepth => write!(f, "Work queue depth cannot be zero"),
            Self::MisalignedRegion { base, len } => write!(
                f,
                "Region {:#x}+{:#x} must be non-empty and page aligned",
                base, len
            ),
            Self::PageSizeMismatch { layout, config } => write!(
                f,
                "Region uses {}-byte pages but the pager is configured for {}",
                layout, config
            ),
            Self::InvalidWatermarks { low, high } => write!(
                f,
                "Eviction watermarks must satisfy low < high <= 100 (low={}, high={})",
                low, high
            ),
        }
    }
}

impl core::error::Error for ConfigError {}
