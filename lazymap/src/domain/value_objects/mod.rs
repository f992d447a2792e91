//! Value objects for the domain layer.
//!
//! Value objects are immutable, validated data types that represent
//! concepts in the domain model. They provide type safety and encapsulate
//! validation logic.

mod page_address;
mod slot_id;
mod pager_config;
mod region_layout;

pub use page_address::PageAddress;
pub use slot_id::SlotId;
pub use pager_config::{BLOCK_SIZE, ConfigError, DEFAULT_PAGE_SIZE, PagerConfig};
pub use region_layout::RegionLayout;
