//! Adapter layer - Concrete implementations of the domain's ports.
//!
//! # Hexagonal Architecture
//!
//! ```text
//!     ┌──────────────────────────────────┐
//!     │      Domain Layer                │
//!     │  - PageBuffer (service)          │
//!     │  - Store, FaultSource (ports)    │
//!     └────────────┬─────────────────────┘
//!                  │
//!                  │ implements
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │      Adapter Layer               │  ◄── This module
//!     │  - MemoryStore                   │
//!     │  - FileStore                     │
//!     │  - SoftMmu                       │
//!     └────────────┬─────────────────────┘
//!                  │
//!                  │ uses
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │  Files, block devices, memory    │
//!     └──────────────────────────────────┘
//! ```
//!
//! # Available Adapters
//!
//! - **`MemoryStore`**: `Store` over a byte vector, for tests and scratch data
//! - **`FileStore`**: `Store` over a file with positional I/O (unix)
//! - **`SoftMmu`**: `FaultSource` with a software page table

mod error;
mod memory_store;
mod soft_mmu;

#[cfg(unix)]
mod file_store;

pub use error::StoreError;
pub use memory_store::MemoryStore;
pub use soft_mmu::SoftMmu;

#[cfg(unix)]
pub use file_store::FileStore;
