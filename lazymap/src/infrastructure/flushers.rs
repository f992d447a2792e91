//! Flushers - the write-back and eviction workers.
//!
//! Work arrives as [`WorkItem`]s on a bounded queue. For each page item a
//! worker:
//! 1. revokes the page so accesses fault instead of touching the frame,
//! 2. writes the frame to the Store when the item carries a target,
//! 3. removes the descriptor and frees the slot.
//!
//! A failed write puts the page back: it is re-installed writable, stays
//! dirty, and becomes the newest resident page so a later sweep retries it.

use core::fmt;
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use super::stats::PagerStats;
use super::work_queue::{Recv, WorkQueue};
use super::worker_pool::{STOP_POLL_INTERVAL, StopToken, WorkerPool};
use crate::domain::{
    FaultSource, PageAddress, PageBuffer, PageDescriptor, PagerError, PoolError, Protection,
    RegionLayout, Store,
};

/// A unit of work for the Flushers.
pub enum WorkItem<S> {
    /// Evict a claimed page, writing it back first when `target` is set.
    Page {
        /// The claimed page; the worker owns it until the item completes.
        page: PageDescriptor,
        /// Where to write the page, or `None` for a clean page.
        target: Option<Arc<S>>,
    },
    /// Wait for every other worker to reach its own fence.
    Fence(Arc<Barrier>),
}

impl<S> WorkItem<S> {
    /// Build the item for a claimed page: flush-then-evict when the page is
    /// dirty, evict-only otherwise.
    pub fn for_page(page: PageDescriptor, store: &Arc<S>) -> Self {
        let target = page.is_dirty().then(|| Arc::clone(store));
        Self::Page { page, target }
    }
}

impl<S> fmt::Debug for WorkItem<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page { page, target } => f
                .debug_struct("Page")
                .field("page", page)
                .field("write_back", &target.is_some())
                .finish(),
            Self::Fence(_) => f.write_str("Fence"),
        }
    }
}

/// A write-back that failed; the page was kept resident and dirty.
#[derive(Debug)]
pub struct FlushFailure<E> {
    /// The page that could not be written.
    pub page: PageAddress,
    /// Store offset of the attempted write.
    pub offset: u64,
    /// The Store's error.
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for FlushFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Write-back of {} at offset {:#x} failed: {}",
            self.page, self.offset, self.error
        )
    }
}

/// Everything a worker touches besides its queue.
struct FlushContext<S: Store> {
    buffer: Arc<PageBuffer>,
    faults: Arc<dyn FaultSource>,
    layout: RegionLayout,
    stats: Arc<PagerStats>,
    failures: Mutex<Vec<FlushFailure<S::Error>>>,
}

impl<S: Store> FlushContext<S> {
    fn run(&self, queue: &WorkQueue<WorkItem<S>>, stop: &StopToken) {
        loop {
            match queue.recv_timeout(STOP_POLL_INTERVAL) {
                Recv::Item(WorkItem::Page { page, target }) => self.process(page, target.as_deref()),
                Recv::Item(WorkItem::Fence(barrier)) => {
                    barrier.wait();
                }
                Recv::Empty if stop.should_stop() => break,
                Recv::Empty => {}
                Recv::Closed => break,
            }
        }
    }

    fn process(&self, page: PageDescriptor, target: Option<&S>) {
        let address = page.address();

        if let Err(e) = self.faults.revoke(address) {
            log::warn!("Could not revoke {}, keeping it resident: {}", address, e);
            self.restore(address);
            return;
        }

        if let Some(store) = target {
            let offset = self.layout.store_offset(address);
            let written = match self.buffer.frame(page.slot()) {
                Some(frame) => {
                    let bytes = frame.lock();
                    store.write_at(offset, &bytes)
                }
                None => {
                    log::error!("{} refers to missing {}", address, page.slot());
                    return;
                }
            };
            if let Err(error) = written {
                log::error!("Write-back of {} at offset {:#x} failed: {}", address, offset, error);
                self.stats.record_write_failure();
                self.failures.lock().push(FlushFailure {
                    page: address,
                    offset,
                    error,
                });
                self.restore(address);
                return;
            }
            self.stats.record_write_back();
        }

        let removed = {
            let mut guard = self.buffer.lock();
            if target.is_some() {
                if let Err(e) = guard.mark_clean(address) {
                    log::error!("Could not mark {} clean: {}", address, e);
                }
            }
            guard.remove(&page)
        };
        match removed {
            Ok(()) => {
                self.stats.record_eviction();
                log::debug!("Evicted {} from {}", address, page.slot());
            }
            Err(e) => log::error!("Eviction of {} failed: {}", address, e),
        }
    }

    // Re-installs the frame before the claim is dropped, so no fault sees a
    // present page without a mapping.
    fn restore(&self, address: PageAddress) {
        let mut guard = self.buffer.lock();
        let Some(desc) = guard.lookup(address) else {
            return;
        };
        let protection = if desc.is_dirty() {
            Protection::READ | Protection::WRITE
        } else {
            Protection::READ
        };
        if let Some(frame) = self.buffer.frame(desc.slot()) {
            if let Err(e) = self.faults.install_page(address, frame, protection) {
                log::error!("Could not re-install {}: {}", address, e);
            }
        }
        if let Err(e) = guard.release_claim(address) {
            log::error!("Could not return {} to the buffer: {}", address, e);
        }
    }
}

/// The pool of write-back workers and their bounded queue.
///
/// # Ordering
///
/// Items leave the queue in submission order, but with several workers
/// their completion order is unspecified. Use [`Flushers::fence`] to wait
/// for everything submitted so far.
pub struct Flushers<S: Store> {
    queue: Arc<WorkQueue<WorkItem<S>>>,
    context: Arc<FlushContext<S>>,
    pool: Mutex<WorkerPool>,
    fence_lock: Mutex<()>,
    workers: usize,
}

impl<S: Store> Flushers<S> {
    /// Start `workers` threads consuming a queue of `queue_depth` items.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread could not be created.
    pub fn start(
        workers: usize,
        queue_depth: usize,
        buffer: Arc<PageBuffer>,
        faults: Arc<dyn FaultSource>,
        layout: RegionLayout,
        stats: Arc<PagerStats>,
    ) -> Result<Self, PoolError> {
        let queue = Arc::new(WorkQueue::new(queue_depth));
        let context = Arc::new(FlushContext {
            buffer,
            faults,
            layout,
            stats,
            failures: Mutex::new(Vec::new()),
        });

        let mut pool = WorkerPool::new("flusher");
        {
            let queue = Arc::clone(&queue);
            let context = Arc::clone(&context);
            pool.start(workers, move |_, stop| context.run(&queue, &stop))?;
        }

        Ok(Self {
            queue,
            context,
            pool: Mutex::new(pool),
            fence_lock: Mutex::new(()),
            workers,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue `item`, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::ShuttingDown`] once [`shutdown`](Self::shutdown)
    /// has closed the queue. The item is dropped; a page it carried is
    /// still claimed and must be released by the caller.
    pub fn send_work(&self, item: WorkItem<S>) -> Result<(), PagerError<S::Error>> {
        self.queue.send(item).map_err(|_| PagerError::ShuttingDown)
    }

    /// Queue the item for a claimed page, releasing the claim if the queue
    /// is closed.
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::ShuttingDown`] if the queue is closed.
    pub fn submit_claimed(&self, page: PageDescriptor, store: &Arc<S>) -> Result<(), PagerError<S::Error>> {
        match self.send_work(WorkItem::for_page(page, store)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.context.restore(page.address());
                Err(e)
            }
        }
    }

    /// Block until every item queued before this call has completed.
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::ShuttingDown`] if the queue is closed.
    pub fn fence(&self) -> Result<(), PagerError<S::Error>> {
        let _serial = self.fence_lock.lock();
        if self.queue.is_closed() {
            return Err(PagerError::ShuttingDown);
        }
        let barrier = Arc::new(Barrier::new(self.workers + 1));
        for _ in 0..self.workers {
            self.send_work(WorkItem::Fence(Arc::clone(&barrier)))?;
        }
        barrier.wait();
        Ok(())
    }

    /// Drain and return the recorded write-back failures.
    pub fn take_failures(&self) -> Vec<FlushFailure<S::Error>> {
        core::mem::take(&mut *self.context.failures.lock())
    }

    /// Close the queue, let the workers drain it, and join them.
    ///
    /// Calling it again does nothing.
    pub fn shutdown(&self) {
        {
            let _serial = self.fence_lock.lock();
            self.queue.close();
        }
        let mut pool = self.pool.lock();
        pool.request_stop();
        if let Err(e) = pool.join() {
            log::error!("{}", e);
        }
    }
}

impl<S: Store> Drop for Flushers<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, SoftMmu};
    use core::time::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const PAGE: usize = 512;

    struct Fixture {
        buffer: Arc<PageBuffer>,
        store: Arc<MemoryStore>,
        mmu: Arc<SoftMmu>,
        layout: RegionLayout,
        stats: Arc<PagerStats>,
    }

    impl Fixture {
        fn new(pages: usize) -> Self {
            let layout = RegionLayout::new(0x10_0000, (pages * PAGE) as u64, PAGE).unwrap();
            Self {
                buffer: Arc::new(PageBuffer::new(pages, PAGE).unwrap()),
                store: Arc::new(MemoryStore::new(pages * PAGE)),
                mmu: Arc::new(SoftMmu::new(layout)),
                layout,
                stats: Arc::new(PagerStats::new()),
            }
        }

        fn flushers(&self, workers: usize, depth: usize) -> Flushers<MemoryStore> {
            Flushers::start(
                workers,
                depth,
                Arc::clone(&self.buffer),
                self.mmu.clone(),
                self.layout,
                Arc::clone(&self.stats),
            )
            .unwrap()
        }

        /// Make page `n` resident with every byte set to `fill`, and claim it.
        fn claimed(&self, n: u64, fill: u8, dirty: bool) -> PageDescriptor {
            let address = self.layout.page_at(n);
            let mut guard = self.buffer.lock();
            let desc = guard.reserve(address).unwrap();
            let frame = self.buffer.frame(desc.slot()).unwrap();
            frame.lock().fill(fill);
            self.mmu.install_page(address, frame, Protection::READ).unwrap();
            guard.complete_fill(address, dirty).unwrap();
            guard.claim(address).unwrap()
        }
    }

    #[test]
    fn test_dirty_page_is_written_then_evicted() {
        let fx = Fixture::new(4);
        let flushers = fx.flushers(2, 4);
        let page = fx.claimed(1, 0xAB, true);

        flushers.submit_claimed(page, &fx.store).unwrap();
        flushers.fence().unwrap();

        assert_eq!(fx.buffer.resident_count(), 0);
        assert!(!fx.mmu.is_installed(page.address()));
        let mut back = vec![0u8; PAGE];
        fx.store.read_at(PAGE as u64, &mut back).unwrap();
        assert!(back.iter().all(|b| *b == 0xAB));
        assert_eq!(fx.stats.snapshot().write_backs, 1);
    }

    #[test]
    fn test_clean_page_is_evicted_without_write() {
        let fx = Fixture::new(2);
        let flushers = fx.flushers(1, 2);
        let page = fx.claimed(0, 0xCD, false);

        flushers.submit_claimed(page, &fx.store).unwrap();
        flushers.fence().unwrap();

        assert_eq!(fx.buffer.resident_count(), 0);
        let mut back = vec![0xFFu8; PAGE];
        fx.store.read_at(0, &mut back).unwrap();
        assert!(back.iter().all(|b| *b == 0));
        assert_eq!(fx.stats.snapshot().write_backs, 0);
        assert_eq!(fx.stats.snapshot().evictions, 1);
    }

    #[test]
    fn test_backpressure_processes_every_item_once() {
        let fx = Fixture::new(16);
        let flushers = Arc::new(fx.flushers(2, 2));
        let pages: Vec<_> = (0..16).map(|n| fx.claimed(n, n as u8, true)).collect();

        let submitted = Arc::new(AtomicUsize::new(0));
        let submitter = {
            let flushers = Arc::clone(&flushers);
            let store = Arc::clone(&fx.store);
            let submitted = Arc::clone(&submitted);
            thread::spawn(move || {
                for page in pages {
                    flushers.submit_claimed(page, &store).unwrap();
                    submitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        submitter.join().unwrap();
        flushers.fence().unwrap();

        assert_eq!(submitted.load(Ordering::SeqCst), 16);
        assert_eq!(fx.stats.snapshot().write_backs, 16);
        assert_eq!(fx.buffer.resident_count(), 0);
        for n in 0..16u64 {
            let mut back = vec![0u8; PAGE];
            fx.store.read_at(n * PAGE as u64, &mut back).unwrap();
            assert!(back.iter().all(|b| *b == n as u8));
        }
    }

    #[test]
    fn test_send_after_shutdown_is_refused() {
        let fx = Fixture::new(2);
        let flushers = fx.flushers(1, 1);
        flushers.shutdown();
        flushers.shutdown();

        let page = fx.claimed(0, 1, true);
        assert!(matches!(
            flushers.submit_claimed(page, &fx.store),
            Err(PagerError::ShuttingDown)
        ));
        assert!(fx.buffer.lookup(page.address()).unwrap().is_present());
        assert!(matches!(flushers.fence(), Err(PagerError::ShuttingDown)));
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let fx = Fixture::new(8);
        let flushers = fx.flushers(1, 8);
        for n in 0..8 {
            let page = fx.claimed(n, 7, true);
            flushers.submit_claimed(page, &fx.store).unwrap();
        }
        flushers.shutdown();
        assert_eq!(fx.stats.snapshot().write_backs, 8);
        assert_eq!(fx.buffer.resident_count(), 0);
    }

    #[test]
    fn test_fence_with_idle_workers_returns() {
        let fx = Fixture::new(1);
        let flushers = fx.flushers(3, 1);
        for _ in 0..3 {
            flushers.fence().unwrap();
        }
        thread::sleep(Duration::from_millis(1));
        assert_eq!(flushers.workers(), 3);
    }
}
