//! Domain entities for the page buffer.
//!
//! Entities are objects that have identity and lifecycle. In this domain,
//! the primary entity is a `PageDescriptor`, which tracks one resident
//! virtual page.

mod page_descriptor;
mod page_state;

pub use page_descriptor::PageDescriptor;
pub use page_state::PageState;
