//! File-backed Store adapter.
//!
//! Uses positional I/O (`pread`/`pwrite`), so concurrent reads and writes
//! at disjoint offsets need no shared seek position and no lock.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use super::error::StoreError;
use crate::domain::Store;

/// A [`Store`] backed by a regular file or block device.
///
/// With `direct` set, the file is opened with `O_DIRECT` on Linux, so every
/// transfer must be block aligned; page frames always are.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    size: u64,
    path: PathBuf,
}

impl FileStore {
    /// Replace `path` with a new file of exactly `size` bytes.
    ///
    /// Any existing file is unlinked first, then the space is reserved up
    /// front so later write-backs cannot fail for lack of space.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be replaced or
    /// preallocated, and [`StoreError::SizeMismatch`] if the new file does
    /// not report the requested size.
    pub fn create(path: impl AsRef<Path>, size: u64, direct: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => log::info!("Deleted {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to unlink {}: {}", path.display(), e),
        }

        let file = Self::options(direct).create(true).truncate(true).open(path)?;
        preallocate(&file, size)?;

        let actual = file.metadata()?.len();
        if actual != size {
            return Err(StoreError::SizeMismatch {
                expected: size,
                actual,
            });
        }
        log::info!("Created {} ({} bytes, direct={})", path.display(), size, direct);
        Ok(Self {
            file,
            size,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing file; its current length is the store size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, direct: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = Self::options(direct).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            size,
            path: path.to_path_buf(),
        })
    }

    /// Path the store was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn options(direct: bool) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if direct {
            set_direct(&mut options);
        }
        options
    }
}

#[cfg(target_os = "linux")]
fn set_direct(options: &mut OpenOptions) {
    use nix::fcntl::OFlag;
    use std::os::unix::fs::OpenOptionsExt;

    options.custom_flags(OFlag::O_DIRECT.bits());
}

#[cfg(not(target_os = "linux"))]
fn set_direct(_options: &mut OpenOptions) {
    log::warn!("Direct I/O is not supported on this platform, using buffered I/O");
}

#[cfg(target_os = "linux")]
fn preallocate(file: &File, size: u64) -> Result<(), StoreError> {
    use nix::fcntl::posix_fallocate;
    use nix::libc::off_t;
    use std::os::fd::AsRawFd;

    if size == 0 {
        return Ok(());
    }
    let len = off_t::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file size overflows off_t"))?;
    posix_fallocate(file.as_raw_fd(), 0, len).map_err(io::Error::from)?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn preallocate(file: &File, size: u64) -> Result<(), StoreError> {
    file.set_len(size)?;
    Ok(())
}

impl Store for FileStore {
    type Error = StoreError;

    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<(), Self::Error> {
        StoreError::check_range(offset, dest.len(), self.size)?;
        self.file.read_exact_at(dest, offset)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> Result<(), Self::Error> {
        StoreError::check_range(offset, src.len(), self.size)?;
        self.file.write_all_at(src, offset)?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn flush(&self) -> Result<(), Self::Error> {
        self.file.sync_data()?;
        Ok(())
    }
}
