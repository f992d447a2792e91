//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use lazymap::adapters::{MemoryStore, SoftMmu};
use lazymap::domain::{PagerConfig, RegionLayout, Store};
use lazymap::Region;
use parking_lot::Mutex;

pub const PAGE: usize = 4096;
pub const BASE: u64 = 0x7f00_0000_0000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A memory store that counts writes per offset and can fail or stall on demand.
#[derive(Debug)]
pub struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<HashMap<u64, usize>>,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
}

impl RecordingStore {
    pub fn new(size: usize) -> Self {
        Self {
            inner: MemoryStore::new(size),
            writes: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            read_delay: Mutex::new(Duration::ZERO),
            write_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn writes_at(&self, offset: u64) -> usize {
        self.writes.lock().get(&offset).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.writes.lock().values().sum()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn slow_reads(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    pub fn slow_writes(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    pub fn u64_at(&self, offset: u64) -> u64 {
        let mut bytes = [0u8; 8];
        self.inner.read_at(offset, &mut bytes).unwrap();
        u64::from_ne_bytes(bytes)
    }
}

impl Store for RecordingStore {
    type Error = io::Error;

    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<(), Self::Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected read failure"));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(*self.read_delay.lock());
        self.inner.read_at(offset, dest).map_err(io::Error::other)
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected write failure"));
        }
        thread::sleep(*self.write_delay.lock());
        self.inner.write_at(offset, src).map_err(io::Error::other)?;
        *self.writes.lock().entry(offset).or_insert(0) += 1;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}

/// A region over a recording store, driven through a software MMU.
pub struct Harness {
    pub layout: RegionLayout,
    pub mmu: Arc<SoftMmu>,
    pub store: Arc<RecordingStore>,
    pub region: Region<RecordingStore>,
}

impl Harness {
    pub fn new(pages: u64, config: PagerConfig) -> Self {
        init_logging();
        let layout = RegionLayout::new(BASE, pages * PAGE as u64, PAGE).unwrap();
        let mmu = Arc::new(SoftMmu::new(layout));
        let store = Arc::new(RecordingStore::new(pages as usize * PAGE));
        let region = Region::map(Arc::clone(&store), mmu.clone(), layout, config).unwrap();
        Self {
            layout,
            mmu,
            store,
            region,
        }
    }

    /// Address of page `n`, plus `offset` bytes.
    pub fn addr(&self, n: u64, offset: u64) -> u64 {
        self.layout.page_at(n).value() + offset
    }
}

/// A configuration whose periodic sweep never fires during a test.
pub fn quiet_config(buffer_pages: usize) -> PagerConfig {
    PagerConfig::new()
        .with_buffer_pages(buffer_pages)
        .with_flusher_workers(2)
        .with_fault_workers(2)
        .with_sweep_interval(core::time::Duration::from_secs(3600))
}
