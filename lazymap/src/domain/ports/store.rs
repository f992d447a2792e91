//! Store port - secondary (driven) port for the backing medium.
//!
//! This port defines what the engine needs from a backing medium: byte
//! ranges addressed by offset, and the addressable size. Adapters implement
//! this trait for files, raw devices or memory.

use core::error::Error;

/// Port for byte-range storage operations.
///
/// This is a **secondary (driven) port** in hexagonal architecture terms.
/// The engine depends on this abstraction only; it never sees the concrete
/// medium and performs no medium-specific logic.
///
/// # Hexagonal Architecture
///
/// ```text
/// ┌─────────────────────┐
/// │   Engine            │
/// │ (Flushers, faults)  │
/// └──────────┬──────────┘
///            │ depends on
///            ▼
/// ┌─────────────────────┐
/// │    Store Port       │  ◄── This trait
/// └──────────┬──────────┘
///            │ implemented by
///            ▼
/// ┌─────────────────────┐
/// │  Adapter Layer      │
/// │ (FileStore, ...)    │
/// └─────────────────────┘
/// ```
///
/// # Concurrency
///
/// Methods take `&self` and are called from several threads at once, always
/// at disjoint page offsets. A medium that cannot serve concurrent requests
/// must serialize internally.
///
/// # Bounds
///
/// The engine never issues a request outside `0..size()`; such a request is
/// a caller bug, not a recoverable condition.
pub trait Store: Send + Sync + 'static {
    /// The error type for storage operations.
    ///
    /// This should be the underlying medium error type (e.g., `std::io::Error`).
    type Error: Error + Send + Sync + 'static;

    /// Read `dest.len()` bytes starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails to deliver the full range.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut page = vec![0u8; 4096];
    /// store.read_at(2 * 4096, &mut page)?;
    /// ```
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<(), Self::Error>;

    /// Write all of `src` starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails to persist the full range.
    fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), Self::Error>;

    /// Addressable size of the medium in bytes.
    fn size(&self) -> u64;

    /// Flush any cached writes to the underlying medium.
    ///
    /// The default implementation is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    // Mock store keyed by offset
    struct MockStore {
        data: Mutex<HashMap<u64, Vec<u8>>>,
    }

    #[derive(Debug)]
    struct MockError;

    impl fmt::Display for MockError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Mock store error")
        }
    }

    impl Error for MockError {}

    impl Store for MockStore {
        type Error = MockError;

        fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<(), Self::Error> {
            let data = self.data.lock();
            match data.get(&offset) {
                Some(bytes) if bytes.len() == dest.len() => dest.copy_from_slice(bytes),
                Some(_) => return Err(MockError),
                None => dest.fill(0),
            }
            Ok(())
        }

        fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), Self::Error> {
            self.data.lock().insert(offset, src.to_vec());
            Ok(())
        }

        fn size(&self) -> u64 {
            1024 * 1024
        }
    }

    #[test]
    fn test_mock_store_read_write() {
        let store = MockStore {
            data: Mutex::new(HashMap::new()),
        };

        store.write_at(4096, &[42u8; 512]).unwrap();

        let mut read = [0u8; 512];
        store.read_at(4096, &mut read).unwrap();
        assert_eq!(read, [42u8; 512]);

        store.read_at(0, &mut read).unwrap();
        assert_eq!(read, [0u8; 512]);
        assert!(store.flush().is_ok());
    }
}
