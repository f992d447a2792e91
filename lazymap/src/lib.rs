//! User-space demand paging with hexagonal architecture.
//!
//! A [`Region`] is an address range whose pages are read from a pluggable
//! [`Store`](domain::Store) on first access and written back when they are
//! evicted. A bounded page buffer holds the resident pages; write-back runs
//! on a pool of flusher threads.
//!
//! # Architecture
//!
//! The crate is organized into three layers:
//!
//! ## Domain Layer (`domain`)
//! Residency rules with no threads of their own:
//! - **Entities**: `PageDescriptor` with its `PageState` lifecycle
//! - **Value Objects**: `PageAddress`, `SlotId`, `RegionLayout`, `PagerConfig`
//! - **Services**: `PageBuffer` and the `SlotArena` of page frames
//! - **Ports**: `Store` and `FaultSource` interfaces
//!
//! ## Infrastructure Layer (`infrastructure`)
//! The thread groups built on the domain:
//! - **`WorkerPool`**: named threads with a cooperative stop signal
//! - **`Flushers`**: write-back and eviction workers fed by a bounded queue
//! - **`PageFlusher`**: periodic and on-demand sweeps
//! - **`FaultServicer`**: turns fault events into resident pages
//!
//! ## Adapter Layer (`adapters`)
//! Port implementations:
//! - **`MemoryStore`** and **`FileStore`**: `Store` implementations
//! - **`SoftMmu`**: a software page table implementing `FaultSource`
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use lazymap::Region;
//! use lazymap::adapters::{MemoryStore, SoftMmu};
//! use lazymap::domain::{PagerConfig, RegionLayout};
//!
//! let layout = RegionLayout::new(0x1000_0000, 64 * 4096, 4096).unwrap();
//! let mmu = Arc::new(SoftMmu::new(layout));
//! let store = Arc::new(MemoryStore::new(64 * 4096));
//! let config = PagerConfig::new().with_buffer_pages(8);
//!
//! let region = Region::map(store, mmu.clone(), layout, config).unwrap();
//! mmu.write_u64(layout.base() + 40 * 4096, 7).unwrap();
//! assert_eq!(mmu.read_u64(layout.base() + 40 * 4096).unwrap(), 7);
//! assert!(region.resident_pages() <= 8);
//! region.unmap().unwrap();
//! ```

#![warn(missing_docs)]

// Core layers
pub mod domain;
pub mod adapters;
pub mod infrastructure;

mod region;

pub use region::Region;

// Re-export commonly used types for convenience
pub use domain::{
    BufferError, ConfigError, ErrorClass, FaultEvent, FaultSource, PageAddress, PagerConfig,
    PagerError, PoolError, Protection, RegionLayout, Store,
};

pub use adapters::{MemoryStore, SoftMmu, StoreError};

#[cfg(unix)]
pub use adapters::FileStore;

pub use infrastructure::{FlushFailure, StatsSnapshot};
