//! Adapter-level errors.

use core::fmt;
use std::io;

/// Errors raised by the bundled [`Store`](crate::domain::Store) adapters.
#[derive(Debug)]
pub enum StoreError {
    /// The requested range runs past the end of the medium.
    OutOfBounds {
        /// Start of the range.
        offset: u64,
        /// Length of the range.
        len: usize,
        /// Size of the medium.
        size: u64,
    },
    /// A created file does not have the requested size.
    SizeMismatch {
        /// Requested size in bytes.
        expected: u64,
        /// Size the file reports.
        actual: u64,
    },
    /// Operating system I/O error.
    Io(io::Error),
}

impl StoreError {
    pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), Self> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => Ok(()),
            _ => Err(Self::OutOfBounds { offset, len, size }),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset, len, size } => write!(
                f,
                "Range {:#x}+{:#x} exceeds store size {:#x}",
                offset, len, size
            ),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "File is {} bytes, expected {}",
                actual, expected
            ),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl core::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
