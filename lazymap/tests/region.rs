//! End-to-end tests of a mapped region.
//!
//! These tests cover:
//! - Eviction order and write-back before slot reuse
//! - Round-trip fidelity through the store
//! - Exactly-once write-back under concurrent sweeps and at unmap
//! - Faults that race a fill or an eviction of the same page
//! - Failed reads and writes
//! - Capacity under concurrent access

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use common::{Harness, PAGE, quiet_config};
use lazymap::domain::{PageAddress, PagerConfig, RegionLayout};
use lazymap::{ConfigError, ErrorClass, MemoryStore, PagerError, Region, SoftMmu};

#[test]
fn test_full_buffer_evicts_oldest_after_write_back() {
    let h = Harness::new(4, quiet_config(2).with_flusher_workers(1).with_fault_workers(1));
    let (a, b, c) = (h.addr(0, 0), h.addr(1, 0), h.addr(2, 0));

    h.mmu.write_u64(a, 0xAAAA).unwrap();
    assert_eq!(h.mmu.read_u64(b).unwrap(), 0);
    assert_eq!(h.store.writes_at(0), 0);

    assert_eq!(h.mmu.read_u64(c).unwrap(), 0);

    assert_eq!(h.store.writes_at(0), 1);
    assert_eq!(h.store.u64_at(0), 0xAAAA);
    assert_eq!(h.region.resident_pages(), 2);
    assert!(!h.mmu.is_installed(PageAddress::new(a)));
    assert!(h.mmu.is_installed(PageAddress::new(b)));
    assert!(h.mmu.is_installed(PageAddress::new(c)));
}

#[test]
fn test_clean_pages_are_evicted_without_writes() {
    let h = Harness::new(8, quiet_config(2));
    for n in 0..8 {
        assert_eq!(h.mmu.read_u64(h.addr(n, 8)).unwrap(), 0);
    }
    assert_eq!(h.store.total_writes(), 0);
    assert!(h.region.resident_pages() <= 2);
    assert_eq!(h.region.stats().fills, 8);
}

#[test]
fn test_flush_then_refault_reads_back_content() {
    let h = Harness::new(4, quiet_config(4));
    let addr = h.addr(3, 128);

    h.mmu.write_u64(addr, 0xDEAD_BEEF).unwrap();
    assert_eq!(h.region.flush_all().unwrap(), 1);

    assert_eq!(h.store.writes_at(3 * PAGE as u64), 1);
    assert_eq!(h.region.resident_pages(), 0);

    assert_eq!(h.mmu.read_u64(addr).unwrap(), 0xDEAD_BEEF);
    assert_eq!(h.region.stats().fills, 2);
}

#[test]
fn test_concurrent_flush_all_writes_once() {
    let h = Arc::new(Harness::new(4, quiet_config(4)));
    h.mmu.write_u64(h.addr(0, 0), 1).unwrap();

    let callers: Vec<_> = (0..2)
        .map(|_| {
            let h = Arc::clone(&h);
            thread::spawn(move || h.region.flush_all().unwrap())
        })
        .collect();
    let submitted: usize = callers.into_iter().map(|c| c.join().unwrap()).sum();

    assert_eq!(submitted, 1);
    assert_eq!(h.store.writes_at(0), 1);
    assert_eq!(h.region.resident_pages(), 0);
}

#[test]
fn test_concurrent_faults_on_one_page_fill_it_once() {
    const ROUNDS: u64 = 4;
    const THREADS: u64 = 8;
    let h = Arc::new(Harness::new(8, quiet_config(8)));
    h.store.slow_reads(Duration::from_millis(30));

    for round in 0..ROUNDS {
        let accessors: Vec<_> = (0..THREADS)
            .map(|t| {
                let h = Arc::clone(&h);
                thread::spawn(move || {
                    let addr = h.addr(round, t * 8);
                    if t % 2 == 0 {
                        h.mmu.write_u64(addr, round * 100 + t + 1).unwrap();
                    } else {
                        assert_eq!(h.mmu.read_u64(addr).unwrap(), 0);
                    }
                })
            })
            .collect();
        for a in accessors {
            a.join().unwrap();
        }
        assert_eq!(h.region.stats().fills, round + 1);
        assert_eq!(h.store.reads(), round as usize + 1);
    }

    let h = Arc::into_inner(h).unwrap();
    let store = Arc::clone(&h.store);
    h.region.unmap().unwrap();
    for round in 0..ROUNDS {
        let page = round * PAGE as u64;
        assert_eq!(store.writes_at(page), 1);
        for t in (0..THREADS).step_by(2) {
            assert_eq!(store.u64_at(page + t * 8), round * 100 + t + 1);
        }
    }
}

#[test]
fn test_fault_during_write_back_sees_written_data() {
    let h = Arc::new(Harness::new(4, quiet_config(4)));
    let addr = h.addr(1, 64);
    let page = PageAddress::new(h.addr(1, 0));
    h.mmu.write_u64(addr, 0x5151).unwrap();
    h.store.slow_writes(Duration::from_millis(100));

    let flush = {
        let h = Arc::clone(&h);
        thread::spawn(move || h.region.flush_all().unwrap())
    };
    while h.mmu.is_installed(page) {
        thread::yield_now();
    }
    assert_eq!(h.store.total_writes(), 0);

    assert_eq!(h.mmu.read_u64(addr).unwrap(), 0x5151);
    assert_eq!(h.store.writes_at(PAGE as u64), 1);
    assert_eq!(flush.join().unwrap(), 1);
    assert_eq!(h.region.stats().fills, 2);
    assert_eq!(h.store.reads(), 2);

    h.mmu.write_u64(addr, 0x6262).unwrap();
    h.store.slow_writes(Duration::ZERO);
    assert_eq!(h.region.flush_all().unwrap(), 1);
    assert_eq!(h.store.writes_at(PAGE as u64), 2);
    assert_eq!(h.store.u64_at(PAGE as u64 + 64), 0x6262);
}

#[test]
fn test_unmap_writes_every_dirty_page_once() {
    let h = Harness::new(16, quiet_config(8));
    for n in 0..5 {
        h.mmu.write_u64(h.addr(n, 16), n + 100).unwrap();
    }
    for n in 5..8 {
        h.mmu.read_u64(h.addr(n, 16)).unwrap();
    }

    let store = Arc::clone(&h.store);
    let stats = h.region.unmap().unwrap();

    assert_eq!(store.total_writes(), 5);
    assert_eq!(stats.write_backs, 5);
    assert_eq!(stats.evictions, 8);
    for n in 0..5 {
        assert_eq!(store.writes_at(n * PAGE as u64), 1);
        assert_eq!(store.u64_at(n * PAGE as u64 + 16), n + 100);
    }
}

#[test]
fn test_failed_write_keeps_page_dirty_and_resident() {
    let h = Harness::new(4, quiet_config(4));
    let addr = h.addr(1, 0);
    h.mmu.write_u64(addr, 77).unwrap();

    h.store.fail_writes(true);
    assert_eq!(h.region.flush_all().unwrap(), 1);
    assert_eq!(h.region.resident_pages(), 1);
    let failures = h.region.take_flush_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].offset, PAGE as u64);
    assert_eq!(h.region.stats().write_failures, 1);

    // Still readable and writable from memory.
    assert_eq!(h.mmu.read_u64(addr).unwrap(), 77);
    h.mmu.write_u64(addr, 78).unwrap();

    h.store.fail_writes(false);
    assert_eq!(h.region.flush_all().unwrap(), 1);
    assert_eq!(h.region.resident_pages(), 0);
    assert_eq!(h.store.u64_at(PAGE as u64), 78);
    assert!(h.region.take_flush_failures().is_empty());
}

#[test]
fn test_failed_read_rejects_access() {
    let h = Harness::new(4, quiet_config(4));
    let addr = h.addr(2, 0);

    h.store.fail_reads(true);
    let err = h.mmu.read_u64(addr).unwrap_err();
    assert!(err.to_string().contains("injected read failure"));
    assert_eq!(h.region.resident_pages(), 0);
    assert_eq!(h.region.stats().read_failures, 1);

    h.store.fail_reads(false);
    assert_eq!(h.mmu.read_u64(addr).unwrap(), 0);
    assert_eq!(h.region.resident_pages(), 1);
}

#[test]
fn test_capacity_holds_under_concurrent_access() {
    const PAGES: u64 = 64;
    const CAPACITY: usize = 4;
    let h = Arc::new(Harness::new(PAGES, quiet_config(CAPACITY).with_queue_depth(2)));

    let done = Arc::new(AtomicBool::new(false));
    let monitor = {
        let h = Arc::clone(&h);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut peak = 0;
            while !done.load(Ordering::SeqCst) {
                peak = peak.max(h.region.resident_pages());
                thread::yield_now();
            }
            peak
        })
    };

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                for round in 0..3u64 {
                    for n in (t..PAGES).step_by(4) {
                        h.mmu.write_u64(h.addr(n, t * 8), round * 1000 + n).unwrap();
                    }
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(monitor.join().unwrap() <= CAPACITY);

    let h = Arc::into_inner(h).unwrap();
    let store = Arc::clone(&h.store);
    h.region.unmap().unwrap();
    for n in 0..PAGES {
        let t = n % 4;
        assert_eq!(store.u64_at(n * PAGE as u64 + t * 8), 2000 + n);
    }
}

#[test]
fn test_map_rejects_region_larger_than_store() {
    let layout = RegionLayout::new(0x1000, 4 * PAGE as u64, PAGE).unwrap();
    let mmu = Arc::new(SoftMmu::new(layout));
    let store = Arc::new(MemoryStore::new(3 * PAGE));
    let err = Region::map(store, mmu, layout, PagerConfig::new()).err().unwrap();
    assert!(matches!(err, PagerError::OutOfBounds { limit, .. } if limit == 3 * PAGE as u64));
    assert_eq!(err.class(), ErrorClass::ContractViolation);
}

#[test]
fn test_map_rejects_mismatched_page_size() {
    let layout = RegionLayout::new(0x1000, 4 * PAGE as u64, PAGE).unwrap();
    let mmu = Arc::new(SoftMmu::new(layout));
    let store = Arc::new(MemoryStore::new(4 * PAGE));
    let config = PagerConfig::new().with_page_size(8192);
    let err = Region::map(store, mmu, layout, config).err().unwrap();
    assert!(matches!(
        err,
        PagerError::InvalidConfig(ConfigError::PageSizeMismatch { layout: 4096, config: 8192 })
    ));
}

#[test]
fn test_access_after_unmap_fails() {
    let h = Harness::new(2, quiet_config(2));
    h.mmu.write_u64(h.addr(0, 0), 5).unwrap();
    let mmu = Arc::clone(&h.mmu);
    drop(h);
    assert!(mmu.read_u64(0x7f00_0000_0000).is_err());
}
