//! Domain layer - residency rules with no threads and no I/O of their own.
//!
//! This is the core of the hexagonal architecture. The domain layer contains:
//! - **Entities**: Objects with identity (`PageDescriptor`, `PageState`)
//! - **Value Objects**: Validated data (`PageAddress`, `SlotId`, `PagerConfig`, `RegionLayout`)
//! - **Domain Services**: The capacity-bounded `PageBuffer` and its `SlotArena`
//! - **Ports**: Interfaces to the outside world (`Store`, `FaultSource`)
//! - **Domain Errors**: Contract violations and the engine's error taxonomy
//!
//! # Hexagonal Architecture
//!
//! ```text
//!     ┌──────────────────────────────────┐
//!     │      Domain Layer (Core)         │
//!     │                                  │
//!     │  ┌────────────────────────────┐  │
//!     │  │  Entities & Value Objects  │  │
//!     │  │  - PageDescriptor, etc.    │  │
//!     │  └────────────────────────────┘  │
//!     │              ▲                   │
//!     │              │                   │
//!     │  ┌────────────────────────────┐  │
//!     │  │    Domain Services         │  │
//!     │  │    - PageBuffer            │  │
//!     │  │    - SlotArena             │  │
//!     │  └────────────────────────────┘  │
//!     │              │                   │
//!     │              ▼                   │
//!     │  ┌────────────────────────────┐  │
//!     │  │    Ports (Interfaces)      │  │
//!     │  │    - Store                 │  │
//!     │  │    - FaultSource           │  │
//!     │  └────────────────────────────┘  │
//!     └──────────────────────────────────┘
//!                    ▲
//!                    │ driven by / implemented by
//!                    │
//!     ┌──────────────────────────────────┐
//!     │  Infrastructure      Adapters    │
//!     │  - Flushers          - FileStore │
//!     │  - PageFlusher     - MemoryStore │
//!     │  - FaultServicer     - SoftMmu   │
//!     └──────────────────────────────────┘
//! ```

pub mod entities;
pub mod value_objects;
pub mod ports;
pub mod error;

mod page_buffer;
mod slot_arena;

// Re-export commonly used types
pub use entities::{PageDescriptor, PageState};
pub use value_objects::{
    BLOCK_SIZE, ConfigError, DEFAULT_PAGE_SIZE, PageAddress, PagerConfig, RegionLayout, SlotId,
};
pub use ports::{FaultEvent, FaultSource, Protection, Store};
pub use error::{BufferError, ErrorClass, PagerError, PoolError};
pub use page_buffer::{BufferGuard, PageBuffer};
pub use slot_arena::{Block, Frame, PageMemory, SlotArena};
