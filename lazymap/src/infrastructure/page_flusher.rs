//! Page flusher - the sweep orchestrator.
//!
//! Owns the [`Flushers`] and a one-thread [`WorkerPool`] whose loop wakes
//! every sweep interval and evicts the oldest pages while residency is above
//! the high watermark. [`PageFlusher::flush_all`] sweeps the whole buffer on
//! demand.
//!
//! # Sweep protocol
//!
//! Each step locks the buffer, claims the oldest present page and unlocks
//! before handing the page to the Flushers. A claimed page is invisible to
//! `oldest_present`, so residency seen by the sweep shrinks monotonically
//! and the sweep terminates, while the lock is never held across a blocking
//! `send_work` (Flushers workers need it to finish their items).

use std::sync::Arc;

use super::flushers::{FlushFailure, Flushers};
use super::worker_pool::{StopToken, WorkerPool};
use crate::domain::{PageBuffer, PagerConfig, PagerError, PoolError, Store};

struct Sweeper<S: Store> {
    buffer: Arc<PageBuffer>,
    store: Arc<S>,
    flushers: Arc<Flushers<S>>,
    high_water: usize,
    low_water: usize,
}

impl<S: Store> Sweeper<S> {
    /// Claim and submit pages older than `before`, at most `limit` of them.
    fn sweep(&self, before: u64, limit: usize) -> Result<usize, PagerError<S::Error>> {
        let mut submitted = 0;
        while submitted < limit {
            let claimed = self.buffer.lock().claim_oldest_present(before);
            let Some(page) = claimed else {
                break;
            };
            self.flushers.submit_claimed(page, &self.store)?;
            submitted += 1;
        }
        Ok(submitted)
    }

    fn flush_all(&self) -> Result<usize, PagerError<S::Error>> {
        let before = self.buffer.lock().next_token();
        let submitted = self.sweep(before, usize::MAX)?;
        log::debug!("FlushAll submitted {} pages", submitted);
        Ok(submitted)
    }

    fn sweep_to_watermark(&self) -> Result<usize, PagerError<S::Error>> {
        let resident = {
            let guard = self.buffer.lock();
            guard.resident_count() - guard.leaving_count()
        };
        if resident <= self.high_water {
            return Ok(0);
        }
        let excess = resident - self.low_water;
        let submitted = self.sweep(u64::MAX, excess)?;
        log::debug!(
            "Watermark sweep: {} resident, high {}, evicting {}",
            resident,
            self.high_water,
            submitted
        );
        Ok(submitted)
    }

    fn run(&self, interval: core::time::Duration, stop: &StopToken) {
        while !stop.wait_timeout(interval) {
            if let Err(e) = self.sweep_to_watermark() {
                log::warn!("Periodic sweep stopped: {}", e);
            }
        }
    }
}

/// Drives write-back and eviction of a region's pages.
pub struct PageFlusher<S: Store> {
    sweeper: Arc<Sweeper<S>>,
    pool: WorkerPool,
    shut_down: bool,
}

impl<S: Store> PageFlusher<S> {
    /// Start the orchestrator thread over `flushers`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if the thread could not be created.
    pub fn start(
        buffer: Arc<PageBuffer>,
        store: Arc<S>,
        flushers: Arc<Flushers<S>>,
        config: &PagerConfig,
    ) -> Result<Self, PoolError> {
        let sweeper = Arc::new(Sweeper {
            buffer,
            store,
            flushers,
            high_water: config.high_water_pages(),
            low_water: config.low_water_pages(),
        });

        let mut pool = WorkerPool::new("page-flusher");
        let interval = config.sweep_interval();
        {
            let sweeper = Arc::clone(&sweeper);
            pool.start(1, move |_, stop| sweeper.run(interval, &stop))?;
        }

        Ok(Self {
            sweeper,
            pool,
            shut_down: false,
        })
    }

    /// Submit every page resident at the start of the call, oldest first:
    /// dirty pages for write-back then eviction, clean pages for eviction.
    ///
    /// Returns the number of pages submitted. Concurrent calls split the
    /// pages between them; each page is submitted once.
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::ShuttingDown`] if the Flushers are closed.
    pub fn flush_all(&self) -> Result<usize, PagerError<S::Error>> {
        self.sweeper.flush_all()
    }

    /// [`flush_all`](Self::flush_all), then wait until the Flushers have
    /// completed everything submitted so far.
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::ShuttingDown`] if the Flushers are closed.
    pub fn flush_all_and_wait(&self) -> Result<usize, PagerError<S::Error>> {
        let submitted = self.flush_all()?;
        self.sweeper.flushers.fence()?;
        Ok(submitted)
    }

    /// Drain and return the recorded write-back failures.
    pub fn take_failures(&self) -> Vec<FlushFailure<S::Error>> {
        self.sweeper.flushers.take_failures()
    }

    /// Stop the orchestrator, write back and evict every page, then stop
    /// the Flushers. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.pool.request_stop();
        if let Err(e) = self.pool.join() {
            log::error!("{}", e);
        }
        if let Err(e) = self.flush_all_and_wait() {
            log::error!("Final flush failed: {}", e);
        }
        self.sweeper.flushers.shutdown();

        let left = self.sweeper.buffer.resident_count();
        if left > 0 {
            log::error!("{} pages could not be written back and are lost", left);
        }
    }
}

impl<S: Store> Drop for PageFlusher<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
