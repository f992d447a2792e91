//! Infrastructure layer - the threads that drive the domain.
//!
//! Every thread group is a [`WorkerPool`] running a different body:
//!
//! ```text
//!   FaultSource ──► FaultServicer ──fill──► PageBuffer ◄──remove── Flushers
//!                        │                      ▲                     ▲
//!                        └── pressure evict ────┼─────────────────────┤
//!                                               │                     │
//!                                  PageFlusher ─┴── sweeps ───────────┘
//! ```

mod fault_servicer;
mod flushers;
mod page_flusher;
mod stats;
mod work_queue;
mod worker_pool;

pub use fault_servicer::{FaultHandler, FaultServicer};
pub use flushers::{FlushFailure, Flushers, WorkItem};
pub use page_flusher::PageFlusher;
pub use stats::{PagerStats, StatsSnapshot};
pub use work_queue::{Recv, WorkQueue};
pub use worker_pool::{STOP_POLL_INTERVAL, StopToken, WorkerPool};
