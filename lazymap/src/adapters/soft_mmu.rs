//! Software MMU - an in-process [`FaultSource`].
//!
//! Application threads access the region through [`SoftMmu::read`] and
//! [`SoftMmu::write`] instead of raw pointers. An access to a page with no
//! mapping, or a write to a read-only mapping, queues a [`FaultEvent`] and
//! blocks until the engine installs the page, upgrades its protection or
//! rejects the fault.
//!
//! Lock order: the MMU lock is taken before a frame lock, never after.

use core::time::Duration;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::domain::{FaultEvent, FaultSource, Frame, PageAddress, Protection, RegionLayout};

struct Mapping {
    frame: Arc<Frame>,
    protection: Protection,
}

#[derive(Default)]
struct MmuState {
    table: HashMap<PageAddress, Mapping>,
    pending: VecDeque<FaultEvent>,
    queued: HashSet<(PageAddress, bool)>,
    rejected: HashMap<PageAddress, String>,
    closed: bool,
}

/// A page table plus a fault queue, standing in for hardware page faults.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use lazymap::adapters::{MemoryStore, SoftMmu};
/// use lazymap::domain::{PagerConfig, RegionLayout};
/// use lazymap::Region;
///
/// let layout = RegionLayout::new(0x4000_0000, 16 * 4096, 4096).unwrap();
/// let mmu = Arc::new(SoftMmu::new(layout));
/// let store = Arc::new(MemoryStore::new(16 * 4096));
/// let region = Region::map(store, mmu.clone(), layout, PagerConfig::new().with_buffer_pages(4)).unwrap();
///
/// mmu.write_u64(layout.base(), 42).unwrap();
/// assert_eq!(mmu.read_u64(layout.base()).unwrap(), 42);
/// region.unmap().unwrap();
/// ```
pub struct SoftMmu {
    layout: RegionLayout,
    state: Mutex<MmuState>,
    faults_ready: Condvar,
    resolved: Condvar,
}

impl SoftMmu {
    /// Create an empty page table covering `layout`.
    pub fn new(layout: RegionLayout) -> Self {
        Self {
            layout,
            state: Mutex::new(MmuState::default()),
            faults_ready: Condvar::new(),
            resolved: Condvar::new(),
        }
    }

    /// The region this MMU translates.
    pub fn layout(&self) -> RegionLayout {
        self.layout
    }

    /// Copy `buf.len()` bytes starting at `address` into `buf`.
    ///
    /// # Errors
    ///
    /// Fails if the range leaves the region, the fault was rejected, or the
    /// MMU was closed.
    pub fn read(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let at = address + done as u64;
            let (page, start, n) = self.chunk(at, buf.len() - done)?;
            let state = self.resolve(page, at, false)?;
            if let Some(mapping) = state.table.get(&page) {
                let mem = mapping.frame.lock();
                buf[done..done + n].copy_from_slice(&mem[start..start + n]);
            }
            drop(state);
            done += n;
        }
        Ok(())
    }

    /// Copy `data` into the region starting at `address`.
    ///
    /// # Errors
    ///
    /// Fails if the range leaves the region, the fault was rejected, or the
    /// MMU was closed.
    pub fn write(&self, address: u64, data: &[u8]) -> io::Result<()> {
        let mut done = 0;
        while done < data.len() {
            let at = address + done as u64;
            let (page, start, n) = self.chunk(at, data.len() - done)?;
            let state = self.resolve(page, at, true)?;
            if let Some(mapping) = state.table.get(&page) {
                let mut mem = mapping.frame.lock();
                mem[start..start + n].copy_from_slice(&data[done..done + n]);
            }
            drop(state);
            done += n;
        }
        Ok(())
    }

    /// Read a native-endian `u64` at `address`.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    pub fn read_u64(&self, address: u64) -> io::Result<u64> {
        let mut bytes = [0u8; 8];
        self.read(address, &mut bytes)?;
        Ok(u64::from_ne_bytes(bytes))
    }

    /// Write a native-endian `u64` at `address`.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_u64(&self, address: u64, value: u64) -> io::Result<()> {
        self.write(address, &value.to_ne_bytes())
    }

    /// Check whether `page` currently has a mapping.
    pub fn is_installed(&self, page: PageAddress) -> bool {
        self.state.lock().table.contains_key(&page)
    }

    /// Protection of `page`, if it is mapped.
    pub fn protection(&self, page: PageAddress) -> Option<Protection> {
        self.state.lock().table.get(&page).map(|m| m.protection)
    }

    /// Number of mapped pages.
    pub fn installed_count(&self) -> usize {
        self.state.lock().table.len()
    }

    fn chunk(&self, address: u64, remaining: usize) -> io::Result<(PageAddress, usize, usize)> {
        let page = self.layout.page_of(address).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("address {:#x} is outside the region", address),
            )
        })?;
        let start = (address - page.value()) as usize;
        let n = remaining.min(self.layout.page_size() - start);
        Ok((page, start, n))
    }

    // Returns with the MMU lock held and `page` mapped with the needed rights.
    fn resolve(&self, page: PageAddress, address: u64, is_write: bool) -> io::Result<MutexGuard<'_, MmuState>> {
        let needed = if is_write {
            Protection::WRITE
        } else {
            Protection::READ
        };
        let mut state = self.state.lock();
        let mut raised = false;
        loop {
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "the region is unmapped"));
            }
            if let Some(mapping) = state.table.get(&page) {
                if mapping.protection.contains(needed) {
                    return Ok(state);
                }
            }
            if raised {
                if let Some(reason) = state.rejected.get(&page) {
                    return Err(io::Error::other(format!("access to {} failed: {}", page, reason)));
                }
            }
            if !state.queued.contains(&(page, is_write)) {
                state.rejected.remove(&page);
                state.queued.insert((page, is_write));
                state.pending.push_back(FaultEvent::new(address, is_write));
                self.faults_ready.notify_one();
                raised = true;
            }
            self.resolved.wait(&mut state);
        }
    }
}

impl FaultSource for SoftMmu {
    fn next_fault(&self, timeout: Duration) -> io::Result<Option<FaultEvent>> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            self.faults_ready.wait_for(&mut state, timeout);
        }
        let Some(event) = state.pending.pop_front() else {
            return Ok(None);
        };
        let page = PageAddress::containing(event.address(), self.layout.page_size());
        state.queued.remove(&(page, event.is_write()));
        Ok(Some(event))
    }

    fn install_page(&self, page: PageAddress, frame: Arc<Frame>, protection: Protection) -> io::Result<()> {
        if self.layout.page_of(page.value()) != Some(page) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a page of the region", page),
            ));
        }
        let mut state = self.state.lock();
        state.rejected.remove(&page);
        state.table.insert(page, Mapping { frame, protection });
        drop(state);
        self.resolved.notify_all();
        Ok(())
    }

    fn protect(&self, page: PageAddress, protection: Protection) -> io::Result<()> {
        let mut state = self.state.lock();
        let mapping = state.table.get_mut(&page).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} is not mapped", page))
        })?;
        mapping.protection = protection;
        drop(state);
        self.resolved.notify_all();
        Ok(())
    }

    fn revoke(&self, page: PageAddress) -> io::Result<()> {
        self.state.lock().table.remove(&page);
        Ok(())
    }

    fn reject(&self, event: FaultEvent, reason: &str) {
        let page = PageAddress::containing(event.address(), self.layout.page_size());
        log::warn!("Rejected fault at {:#x}: {}", event.address(), reason);
        self.state.lock().rejected.insert(page, reason.to_string());
        self.resolved.notify_all();
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        state.queued.clear();
        drop(state);
        self.faults_ready.notify_all();
        self.resolved.notify_all();
    }
}

impl core::fmt::Debug for SoftMmu {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftMmu")
            .field("layout", &self.layout)
            .field("installed", &self.installed_count())
            .finish_non_exhaustive()
    }
}
