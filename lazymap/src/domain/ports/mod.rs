//! Ports define the interfaces between the domain and the outside world.
//!
//! In hexagonal architecture, ports are the boundaries of the application:
//! - **Primary (Driving) Ports**: What the domain exposes to the outside world
//! - **Secondary (Driven) Ports**: What the domain needs from the outside world
//!
//! This module contains the **secondary (driven) ports** the engine
//! depends on: the backing medium and the fault interception mechanism.

mod fault_source;
mod store;

pub use fault_source::{FaultEvent, FaultSource, Protection};
pub use store::Store;
