//! Domain-level errors.
//!
//! These errors represent contract violations and lifecycle misuse, plus
//! the wrapper that carries infrastructure failures (which come through the
//! port error types) up to callers.

use crate::domain::value_objects::{ConfigError, PageAddress, SlotId};
use core::fmt;
use core::time::Duration;

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Programming error in the caller; not retried.
    ContractViolation,
    /// Backing medium failed; recoverable per page.
    StoreIo,
    /// No slot could be freed in time.
    ResourceExhaustion,
    /// A pool was started twice or joined before being started.
    LifecycleMisuse,
}

/// Page buffer contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Insert attempted while every slot is occupied; evict first.
    CapacityExceeded {
        /// Configured capacity in pages.
        capacity: usize,
    },
    /// The descriptor was already removed (double eviction).
    NotPresent(PageAddress),
    /// The page is not resident, or is owned by another thread.
    NotResident(PageAddress),
    /// The address already has a descriptor.
    AlreadyTracked(PageAddress),
    /// The requested slot is occupied or does not exist.
    SlotInUse(SlotId),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { capacity } => {
                write!(f, "Page buffer is full ({} pages); evict before inserting", capacity)
            }
            Self::NotPresent(addr) => write!(f, "{} was already removed from the buffer", addr),
            Self::NotResident(addr) => write!(f, "{} is not resident", addr),
            Self::AlreadyTracked(addr) => write!(f, "{} is already tracked by the buffer", addr),
            Self::SlotInUse(slot) => write!(f, "{} is not free", slot),
        }
    }
}

impl core::error::Error for BufferError {}

/// Worker pool lifecycle errors.
#[derive(Debug)]
pub enum PoolError {
    /// `start` was called on a pool that already has threads.
    AlreadyStarted(String),
    /// `join` was called on a pool that was never started.
    NotStarted(String),
    /// The OS refused to create a thread.
    Spawn(std::io::Error),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted(name) => write!(f, "Worker pool '{}' is already started", name),
            Self::NotStarted(name) => write!(f, "Worker pool '{}' was never started", name),
            Self::Spawn(e) => write!(f, "Failed to spawn worker thread: {}", e),
        }
    }
}

impl core::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors surfaced by the paging engine.
///
/// `E` is the error type of the [`Store`](crate::domain::Store) in use.
#[derive(Debug)]
#[non_exhaustive]
pub enum PagerError<E> {
    /// Page buffer contract violation.
    Buffer(BufferError),

    /// Worker pool lifecycle misuse.
    Pool(PoolError),

    /// Invalid configuration or region layout.
    InvalidConfig(ConfigError),

    /// An access or request fell outside the region or the Store.
    OutOfBounds {
        /// Start of the offending range.
        offset: u64,
        /// Length of the offending range.
        len: u64,
        /// The bound that was exceeded.
        limit: u64,
    },

    /// No slot became free within the configured wait.
    SlotExhausted {
        /// How long the fault waited.
        waited: Duration,
    },

    /// The fault source failed to install, protect or revoke a page.
    Fault(std::io::Error),

    /// The engine is shutting down and no longer accepts work.
    ShuttingDown,

    /// Storage error from the underlying Store implementation.
    Store(E),
}

impl<E> PagerError<E> {
    /// Classify the error according to the engine's failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Buffer(_) | Self::InvalidConfig(_) | Self::OutOfBounds { .. } => {
                ErrorClass::ContractViolation
            }
            Self::Pool(_) | Self::ShuttingDown => ErrorClass::LifecycleMisuse,
            Self::SlotExhausted { .. } => ErrorClass::ResourceExhaustion,
            Self::Fault(_) | Self::Store(_) => ErrorClass::StoreIo,
        }
    }
}

impl<E: fmt::Display> fmt::Display for PagerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(e) => write!(f, "Page buffer error: {}", e),
            Self::Pool(e) => write!(f, "Worker pool error: {}", e),
            Self::InvalidConfig(e) => write!(f, "Invalid configuration: {}", e),
            Self::OutOfBounds { offset, len, limit } => write!(
                f,
                "Range {:#x}+{:#x} exceeds bound {:#x}",
                offset, len, limit
            ),
            Self::SlotExhausted { waited } => {
                write!(f, "No free page slot after waiting {:?}", waited)
            }
            Self::Fault(e) => write!(f, "Fault source error: {}", e),
            Self::ShuttingDown => write!(f, "The pager is shutting down"),
            Self::Store(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for PagerError<E> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            Self::Pool(e) => Some(e),
            Self::InvalidConfig(e) => Some(e),
            Self::Fault(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<BufferError> for PagerError<E> {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl<E> From<PoolError> for PagerError<E> {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

impl<E> From<ConfigError> for PagerError<E> {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}

// Note: no blanket From<E>; store failures are wrapped explicitly with
// PagerError::Store so they are never confused with fault-source I/O.
