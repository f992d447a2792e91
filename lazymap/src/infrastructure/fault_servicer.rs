//! Fault servicing - turning fault events into resident pages.

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use super::flushers::Flushers;
use super::stats::PagerStats;
use super::worker_pool::{STOP_POLL_INTERVAL, StopToken, WorkerPool};
use crate::domain::{
    BufferError, FaultEvent, FaultSource, PageAddress, PageBuffer, PageDescriptor, PagerError,
    PoolError, Protection, RegionLayout, Store,
};

/// Resolves one fault at a time; shared by every servicing thread.
///
/// A fault on a page that is already present is either a race with another
/// thread (nothing to do) or a write to a read-only page (mark it dirty and
/// allow writes). A fault on a page that is filling or being evicted waits
/// for that to finish and looks again. Otherwise a slot is reserved, the
/// page is read from the Store outside the buffer lock, and installed.
pub struct FaultHandler<S: Store> {
    buffer: Arc<PageBuffer>,
    store: Arc<S>,
    faults: Arc<dyn FaultSource>,
    flushers: Arc<Flushers<S>>,
    layout: RegionLayout,
    stats: Arc<PagerStats>,
    slot_wait: Duration,
}

impl<S: Store> FaultHandler<S> {
    /// Create a handler for faults in `layout`.
    pub fn new(
        buffer: Arc<PageBuffer>,
        store: Arc<S>,
        faults: Arc<dyn FaultSource>,
        flushers: Arc<Flushers<S>>,
        layout: RegionLayout,
        stats: Arc<PagerStats>,
        slot_wait: Duration,
    ) -> Self {
        Self {
            buffer,
            store,
            faults,
            flushers,
            layout,
            stats,
            slot_wait,
        }
    }

    /// Make the page containing the faulting address accessible.
    ///
    /// # Errors
    ///
    /// - [`PagerError::OutOfBounds`] if the address is outside the region
    /// - [`PagerError::Store`] if the page could not be read
    /// - [`PagerError::SlotExhausted`] if no slot freed up in time
    /// - [`PagerError::Fault`] if the fault source refused the mapping
    /// - [`PagerError::ShuttingDown`] if eviction is no longer possible
    pub fn resolve(&self, event: FaultEvent) -> Result<(), PagerError<S::Error>> {
        let page = self.layout.page_of(event.address()).ok_or(PagerError::OutOfBounds {
            offset: event.address(),
            len: 1,
            limit: self.layout.base() + self.layout.len(),
        })?;
        self.stats.record_fault(event.is_write());

        let Some(reserved) = self.reserve(page, event.is_write())? else {
            return Ok(());
        };
        self.fill(reserved, event.is_write())
    }

    // Returns `None` when the page turned out to be present.
    fn reserve(&self, page: PageAddress, is_write: bool) -> Result<Option<PageDescriptor>, PagerError<S::Error>> {
        let started = Instant::now();
        let mut evicting = false;
        let mut guard = self.buffer.lock();
        loop {
            match guard.lookup(page) {
                Some(desc) if desc.is_present() => {
                    if is_write && !desc.is_dirty() {
                        guard.mark_dirty(page)?;
                        self.faults
                            .protect(page, Protection::READ | Protection::WRITE)
                            .map_err(PagerError::Fault)?;
                        log::debug!("{} is now dirty", page);
                    } else {
                        self.stats.record_spurious();
                    }
                    return Ok(None);
                }
                Some(_) => {
                    guard.wait_for_change(STOP_POLL_INTERVAL);
                    continue;
                }
                None => {}
            }

            match guard.reserve(page) {
                Ok(desc) => return Ok(Some(desc)),
                Err(BufferError::CapacityExceeded { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            if guard.leaving_count() == 0 {
                evicting = false;
            }
            if !evicting {
                if let Some(victim) = guard.claim_oldest_present(u64::MAX) {
                    drop(guard);
                    log::debug!("Evicting {} to make room for {}", victim.address(), page);
                    self.stats.record_pressure_eviction();
                    self.flushers.submit_claimed(victim, &self.store)?;
                    evicting = true;
                    guard = self.buffer.lock();
                    continue;
                }
            }

            let waited = started.elapsed();
            if waited >= self.slot_wait {
                log::warn!("No slot for {} after {:?}", page, waited);
                return Err(PagerError::SlotExhausted { waited });
            }
            guard.wait_for_change(self.slot_wait - waited);
        }
    }

    fn fill(&self, desc: PageDescriptor, is_write: bool) -> Result<(), PagerError<S::Error>> {
        let page = desc.address();
        let frame = self
            .buffer
            .frame(desc.slot())
            .ok_or(BufferError::SlotInUse(desc.slot()))?;

        let offset = self.layout.store_offset(page);
        let read = {
            let mut bytes = frame.lock();
            self.store.read_at(offset, &mut bytes)
        };
        if let Err(e) = read {
            self.stats.record_read_failure();
            self.abort(page);
            return Err(PagerError::Store(e));
        }

        let protection = if is_write {
            Protection::READ | Protection::WRITE
        } else {
            Protection::READ
        };
        if let Err(e) = self.faults.install_page(page, frame, protection) {
            self.abort(page);
            return Err(PagerError::Fault(e));
        }

        self.buffer.lock().complete_fill(page, is_write)?;
        self.stats.record_fill();
        log::debug!("Filled {} into {} (write={})", page, desc.slot(), is_write);
        Ok(())
    }

    fn abort(&self, page: PageAddress) {
        if let Err(e) = self.buffer.lock().abort_fill(page) {
            log::error!("Could not release the reservation for {}: {}", page, e);
        }
    }
}

/// The thread group that consumes fault events.
pub struct FaultServicer {
    pool: WorkerPool,
}

impl FaultServicer {
    /// Start `workers` threads resolving faults from `faults` with `handler`.
    ///
    /// A fault that cannot be resolved is rejected back to the fault source
    /// with the error's description.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread could not be created.
    pub fn start<S: Store>(
        workers: usize,
        faults: Arc<dyn FaultSource>,
        handler: Arc<FaultHandler<S>>,
    ) -> Result<Self, PoolError> {
        let mut pool = WorkerPool::new("fault");
        pool.start(workers, move |_, stop| serve(&*faults, &handler, &stop))?;
        Ok(Self { pool })
    }

    /// Stop the servicing threads and wait for them to exit.
    pub fn shutdown(&mut self) {
        self.pool.request_stop();
        if let Err(e) = self.pool.join() {
            log::error!("{}", e);
        }
    }
}

fn serve<S: Store>(faults: &dyn FaultSource, handler: &FaultHandler<S>, stop: &StopToken) {
    while !stop.should_stop() {
        match faults.next_fault(STOP_POLL_INTERVAL) {
            Ok(Some(event)) => {
                if let Err(e) = handler.resolve(event) {
                    log::warn!("Fault at {:#x} failed: {}", event.address(), e);
                    faults.reject(event, &e.to_string());
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Fault source failed: {}", e);
                if stop.wait_timeout(STOP_POLL_INTERVAL) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, SoftMmu};
    use std::thread;

    const PAGE: usize = 512;

    struct Fixture {
        buffer: Arc<PageBuffer>,
        store: Arc<MemoryStore>,
        mmu: Arc<SoftMmu>,
        handler: FaultHandler<MemoryStore>,
        layout: RegionLayout,
    }

    fn fixture(capacity: usize, pages: usize) -> Fixture {
        let layout = RegionLayout::new(0x8000, (pages * PAGE) as u64, PAGE).unwrap();
        let buffer = Arc::new(PageBuffer::new(capacity, PAGE).unwrap());
        let store = Arc::new(MemoryStore::from_vec(
            (0..pages * PAGE).map(|i| (i / PAGE) as u8).collect(),
        ));
        let mmu = Arc::new(SoftMmu::new(layout));
        let stats = Arc::new(PagerStats::new());
        let flushers = Arc::new(
            Flushers::start(2, 4, Arc::clone(&buffer), mmu.clone(), layout, Arc::clone(&stats))
                .unwrap(),
        );
        let handler = FaultHandler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            mmu.clone(),
            flushers,
            layout,
            stats,
            Duration::from_secs(5),
        );
        Fixture {
            buffer,
            store,
            mmu,
            handler,
            layout,
        }
    }

    #[test]
    fn test_read_fault_fills_clean_read_only_page() {
        let fx = fixture(2, 4);
        let page = fx.layout.page_at(2);
        fx.handler.resolve(FaultEvent::new(page.value() + 17, false)).unwrap();

        let desc = fx.buffer.lookup(page).unwrap();
        assert!(desc.is_present());
        assert!(!desc.is_dirty());
        assert_eq!(fx.mmu.protection(page), Some(Protection::READ));
        let mut byte = [0u8; 1];
        fx.mmu.read(page.value() + 3, &mut byte).unwrap();
        assert_eq!(byte[0], 2);
    }

    #[test]
    fn test_write_fault_on_present_page_marks_dirty() {
        let fx = fixture(2, 4);
        let page = fx.layout.page_at(0);
        fx.handler.resolve(FaultEvent::new(page.value(), false)).unwrap();
        fx.handler.resolve(FaultEvent::new(page.value(), true)).unwrap();

        assert!(fx.buffer.lookup(page).unwrap().is_dirty());
        assert_eq!(fx.mmu.protection(page), Some(Protection::READ | Protection::WRITE));
    }

    #[test]
    fn test_repeated_fault_is_spurious() {
        let fx = fixture(2, 4);
        let page = fx.layout.page_at(1);
        fx.handler.resolve(FaultEvent::new(page.value(), true)).unwrap();
        fx.handler.resolve(FaultEvent::new(page.value(), true)).unwrap();
        fx.handler.resolve(FaultEvent::new(page.value(), false)).unwrap();
        assert_eq!(fx.buffer.resident_count(), 1);
        assert_eq!(fx.handler.stats.snapshot().spurious_faults, 2);
        assert_eq!(fx.handler.stats.snapshot().fills, 1);
    }

    #[test]
    fn test_full_buffer_evicts_oldest_with_write_back() {
        let fx = fixture(2, 4);
        let a = fx.layout.page_at(0);
        let b = fx.layout.page_at(1);
        let c = fx.layout.page_at(2);

        fx.handler.resolve(FaultEvent::new(a.value(), true)).unwrap();
        fx.mmu.write(a.value(), &[0xEE; 4]).unwrap();
        fx.handler.resolve(FaultEvent::new(b.value(), false)).unwrap();
        fx.handler.resolve(FaultEvent::new(c.value(), false)).unwrap();

        assert_eq!(fx.buffer.resident_addresses(), vec![b, c]);
        let mut head = [0u8; 4];
        fx.store.read_at(0, &mut head).unwrap();
        assert_eq!(head, [0xEE; 4]);
    }

    #[test]
    fn test_fault_on_filling_page_waits_instead_of_filling() {
        let fx = Arc::new(fixture(2, 4));
        let page = fx.layout.page_at(3);
        let reserved = fx.buffer.lock().reserve(page).unwrap();

        let waiter = {
            let fx = Arc::clone(&fx);
            thread::spawn(move || fx.handler.resolve(FaultEvent::new(page.value() + 8, false)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        let frame = fx.buffer.frame(reserved.slot()).unwrap();
        fx.mmu.install_page(page, frame, Protection::READ).unwrap();
        fx.buffer.lock().complete_fill(page, false).unwrap();
        waiter.join().unwrap().unwrap();

        let stats = fx.handler.stats.snapshot();
        assert_eq!(stats.fills, 0);
        assert_eq!(stats.spurious_faults, 1);
        assert_eq!(fx.buffer.resident_count(), 1);
    }

    #[test]
    fn test_fault_on_leaving_page_waits_for_eviction_then_refills() {
        let fx = Arc::new(fixture(2, 4));
        let page = fx.layout.page_at(1);
        fx.handler.resolve(FaultEvent::new(page.value(), false)).unwrap();
        let claimed = fx.buffer.lock().claim(page).unwrap();
        fx.mmu.revoke(page).unwrap();

        let waiter = {
            let fx = Arc::clone(&fx);
            thread::spawn(move || fx.handler.resolve(FaultEvent::new(page.value(), true)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        assert_eq!(fx.handler.stats.snapshot().fills, 1);

        fx.buffer.remove(&claimed).unwrap();
        waiter.join().unwrap().unwrap();

        let desc = fx.buffer.lookup(page).unwrap();
        assert!(desc.is_present());
        assert!(desc.is_dirty());
        assert_ne!(desc.token(), claimed.token());
        assert_eq!(fx.handler.stats.snapshot().fills, 2);
        assert_eq!(fx.mmu.protection(page), Some(Protection::READ | Protection::WRITE));
    }

    #[test]
    fn test_out_of_region_fault() {
        let fx = fixture(1, 1);
        assert!(matches!(
            fx.handler.resolve(FaultEvent::new(0, false)),
            Err(PagerError::OutOfBounds { offset: 0, .. })
        ));
    }
}
