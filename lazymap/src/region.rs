//! Region - map and unmap a Store-backed address range.

use std::sync::Arc;

use crate::domain::{
    ConfigError, FaultSource, PageBuffer, PagerConfig, PagerError, RegionLayout, Store,
};
use crate::infrastructure::{
    FaultHandler, FaultServicer, FlushFailure, Flushers, PageFlusher, PagerStats, StatsSnapshot,
};

/// A mapped region: the page buffer plus every thread group serving it.
///
/// Mapping starts, in order, the Flushers, the page-flusher orchestrator and
/// the fault servicer. Unmapping (or dropping) tears them down in this
/// order:
///
/// 1. close the fault source and join the fault servicer,
/// 2. join the orchestrator,
/// 3. flush and evict every resident page and wait for the write-backs,
/// 4. close the Flushers queue and join its workers.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use lazymap::Region;
/// use lazymap::adapters::{MemoryStore, SoftMmu};
/// use lazymap::domain::{PagerConfig, RegionLayout, Store};
///
/// let layout = RegionLayout::new(0x10_0000, 8 * 4096, 4096).unwrap();
/// let mmu = Arc::new(SoftMmu::new(layout));
/// let store = Arc::new(MemoryStore::new(8 * 4096));
/// let config = PagerConfig::new().with_buffer_pages(2).with_flusher_workers(1);
///
/// let region = Region::map(Arc::clone(&store), mmu.clone(), layout, config).unwrap();
/// for i in 0..8u64 {
///     mmu.write_u64(layout.base() + i * 4096, i).unwrap();
/// }
/// region.unmap().unwrap();
///
/// let mut word = [0u8; 8];
/// store.read_at(5 * 4096, &mut word).unwrap();
/// assert_eq!(u64::from_ne_bytes(word), 5);
/// ```
pub struct Region<S: Store> {
    layout: RegionLayout,
    store: Arc<S>,
    faults: Arc<dyn FaultSource>,
    buffer: Arc<PageBuffer>,
    stats: Arc<PagerStats>,
    servicer: Option<FaultServicer>,
    flusher: Option<PageFlusher<S>>,
}

impl<S: Store> Region<S> {
    /// Map `layout` over `store`, serving faults delivered by `faults`.
    ///
    /// # Errors
    ///
    /// - [`PagerError::InvalidConfig`] if `config` is invalid or its page
    ///   size differs from the layout's
    /// - [`PagerError::OutOfBounds`] if the region is larger than the store
    /// - [`PagerError::Pool`] if a thread could not be started
    pub fn map(
        store: Arc<S>,
        faults: Arc<dyn FaultSource>,
        layout: RegionLayout,
        config: PagerConfig,
    ) -> Result<Self, PagerError<S::Error>> {
        config.validate()?;
        if layout.page_size() != config.page_size() {
            return Err(ConfigError::PageSizeMismatch {
                layout: layout.page_size(),
                config: config.page_size(),
            }
            .into());
        }
        if layout.len() > store.size() {
            return Err(PagerError::OutOfBounds {
                offset: 0,
                len: layout.len(),
                limit: store.size(),
            });
        }

        let buffer = Arc::new(PageBuffer::new(config.buffer_pages(), config.page_size())?);
        let stats = Arc::new(PagerStats::new());

        let flushers = Arc::new(Flushers::start(
            config.flusher_workers(),
            config.queue_depth(),
            Arc::clone(&buffer),
            Arc::clone(&faults),
            layout,
            Arc::clone(&stats),
        )?);
        let flusher = PageFlusher::start(
            Arc::clone(&buffer),
            Arc::clone(&store),
            Arc::clone(&flushers),
            &config,
        )?;
        let handler = Arc::new(FaultHandler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            Arc::clone(&faults),
            flushers,
            layout,
            Arc::clone(&stats),
            config.slot_wait_timeout(),
        ));
        let servicer = FaultServicer::start(config.fault_workers(), Arc::clone(&faults), handler)?;

        log::info!(
            "Mapped {:#x}+{:#x}: {} pages of {} bytes, buffer of {} pages, {} flushers",
            layout.base(),
            layout.len(),
            layout.page_count(),
            layout.page_size(),
            config.buffer_pages(),
            config.flusher_workers()
        );

        Ok(Self {
            layout,
            store,
            faults,
            buffer,
            stats,
            servicer: Some(servicer),
            flusher: Some(flusher),
        })
    }

    /// The mapped range.
    pub fn layout(&self) -> RegionLayout {
        self.layout
    }

    /// Write back and evict every resident page, returning once the
    /// write-backs have completed.
    ///
    /// Returns the number of pages submitted. Pages whose write-back failed
    /// stay resident; see [`take_flush_failures`](Self::take_flush_failures).
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::ShuttingDown`] if the region is being unmapped.
    pub fn flush_all(&self) -> Result<usize, PagerError<S::Error>> {
        match &self.flusher {
            Some(flusher) => flusher.flush_all_and_wait(),
            None => Err(PagerError::ShuttingDown),
        }
    }

    /// Number of pages holding a slot.
    pub fn resident_pages(&self) -> usize {
        self.buffer.resident_count()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Drain the write-back failures recorded since the last call.
    pub fn take_flush_failures(&self) -> Vec<FlushFailure<S::Error>> {
        self.flusher
            .as_ref()
            .map(PageFlusher::take_failures)
            .unwrap_or_default()
    }

    /// Tear the region down, writing back every dirty page.
    ///
    /// Returns the final counters.
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::Store`] if the store could not be flushed.
    pub fn unmap(mut self) -> Result<StatsSnapshot, PagerError<S::Error>> {
        self.teardown();
        self.store.flush().map_err(PagerError::Store)?;
        Ok(self.stats.snapshot())
    }

    fn teardown(&mut self) {
        let Some(mut flusher) = self.flusher.take() else {
            return;
        };
        self.faults.close();
        if let Some(mut servicer) = self.servicer.take() {
            servicer.shutdown();
        }
        flusher.shutdown();
        for failure in flusher.take_failures() {
            log::error!("{}", failure);
        }
        log::info!(
            "Unmapped {:#x}+{:#x}: {}",
            self.layout.base(),
            self.layout.len(),
            self.stats.snapshot()
        );
    }
}

impl<S: Store> Drop for Region<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
