//! In-memory Store adapter.

use parking_lot::RwLock;

use super::error::StoreError;
use crate::domain::Store;

/// A [`Store`] backed by a byte vector.
///
/// Reads at disjoint offsets run concurrently; writes take the vector
/// exclusively.
///
/// # Examples
///
/// ```
/// use lazymap::adapters::MemoryStore;
/// use lazymap::domain::Store;
///
/// let store = MemoryStore::new(4096);
/// store.write_at(100, b"hello").unwrap();
///
/// let mut back = [0u8; 5];
/// store.read_at(100, &mut back).unwrap();
/// assert_eq!(&back, b"hello");
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    bytes: RwLock<Vec<u8>>,
}

impl MemoryStore {
    /// Create a zero-filled store of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_vec(vec![0u8; size])
    }

    /// Create a store holding `bytes`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Copy out the whole content.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl Store for MemoryStore {
    type Error = StoreError;

    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<(), Self::Error> {
        let bytes = self.bytes.read();
        StoreError::check_range(offset, dest.len(), bytes.len() as u64)?;
        let start = offset as usize;
        dest.copy_from_slice(&bytes[start..start + dest.len()]);
        Ok(())
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), Self::Error> {
        let mut bytes = self.bytes.write();
        StoreError::check_range(offset, src.len(), bytes.len() as u64)?;
        let start = offset as usize;
        bytes[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.bytes.read().len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_zeroed() {
        let store = MemoryStore::new(1024);
        assert_eq!(store.size(), 1024);
        let mut buf = [0xFFu8; 16];
        store.read_at(1008, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_out_of_bounds_is_rejected() {
        let store = MemoryStore::new(64);
        let mut buf = [0u8; 8];
        assert!(matches!(
            store.read_at(60, &mut buf),
            Err(StoreError::OutOfBounds { offset: 60, len: 8, size: 64 })
        ));
        assert!(store.write_at(64, &[1]).is_err());
        assert!(store.write_at(63, &[1]).is_ok());
    }

    #[test]
    fn test_from_vec_round_trip() {
        let store = MemoryStore::from_vec((0..=255).collect());
        store.write_at(0, &[9, 9]).unwrap();
        let data = store.to_vec();
        assert_eq!(&data[..3], &[9, 9, 2]);
        assert_eq!(data.len(), 256);
    }
}
