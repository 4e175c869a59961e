//! Block device layer with storage backend abstraction
//!
//! This module provides the raw storage layer under the filesystem. It
//! handles:
//! - Block-granular reads and writes over a byte-addressed backend
//! - Geometry validation (capacity must be a positive multiple of the
//!   block size) and bounds checks on every access
//! - Durable flush of the backing image on teardown
//!
//! ## Architecture
//!
//! ```text
//! +------------------+
//! |   Filesystem     |
//! +--------+---------+
//!          |
//! +--------v---------+
//! |   BlockDevice    |  <- This module
//! +--------+---------+
//!          |
//! +--------v---------+
//! | StorageBackend   |  (file, in-memory)
//! +------------------+
//! ```
//!
//! ## Backend Types
//!
//! - `FileBackend`: write-through I/O against a single image file. A file
//!   smaller than the requested capacity is grown; grown regions read as
//!   zero.
//! - `MemoryBackend`: a plain byte vector, used by tests.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

use crate::layout::BLOCK_SIZE;

/// Errors that can occur in the block device layer
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Capacity is zero or not a multiple of the block size
    #[error("invalid geometry: {capacity} bytes is not a positive multiple of {BLOCK_SIZE}")]
    InvalidGeometry { capacity: u64 },

    /// Block id outside the device
    #[error("block {block} out of range (device has {count} blocks)")]
    OutOfRange { block: u64, count: u64 },

    /// Backend I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Trait for storage backends
///
/// This abstraction lets the device work with different storage types:
/// - Local image files (`FileBackend`)
/// - In-memory buffers (`MemoryBackend`, for testing)
pub trait StorageBackend: Send {
    /// Reads exactly `buf.len()` bytes at the given byte offset.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Writes all of `data` at the given byte offset.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Makes all previous writes durable on the backing store.
    fn flush(&mut self) -> io::Result<()>;
}

/// File-based storage backend for local images
pub struct FileBackend {
    file: File,
}

impl FileBackend {
    /// Opens (creating if absent) an image file and grows it to `capacity`
    /// bytes when it is smaller. Newly grown regions read back as zero.
    pub fn open(path: &Path, capacity: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < capacity {
            file.set_len(capacity)?;
        }
        Ok(Self { file })
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// In-memory storage backend for testing
pub struct MemoryBackend {
    data: Vec<u8>,
}

impl MemoryBackend {
    /// Creates a new zero-filled memory backend with the given size
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Creates a memory backend from existing data
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns the underlying data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl StorageBackend for MemoryBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of memory backend",
            ));
        }
        buf.copy_from_slice(&self.data[offset..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let offset = offset as usize;
        let end = offset + data.len();
        if end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write past end of memory backend",
            ));
        }
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Block-granular device over a storage backend
///
/// All filesystem I/O goes through this type. Every access is bounds
/// checked against the device geometry; short writes are padded with
/// zeros to a full block.
pub struct BlockDevice {
    backend: Box<dyn StorageBackend>,
    block_count: u64,
}

impl BlockDevice {
    /// Creates a device over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGeometry` when `capacity` is zero or not a
    /// multiple of [`BLOCK_SIZE`].
    pub fn new(backend: Box<dyn StorageBackend>, capacity: u64) -> Result<Self> {
        if capacity == 0 || capacity % BLOCK_SIZE as u64 != 0 {
            return Err(DeviceError::InvalidGeometry { capacity });
        }
        Ok(Self {
            backend,
            block_count: capacity / BLOCK_SIZE as u64,
        })
    }

    /// Opens a file-backed device, growing the file to `capacity` if needed.
    pub fn open_file(path: &Path, capacity: u64) -> Result<Self> {
        if capacity == 0 || capacity % BLOCK_SIZE as u64 != 0 {
            return Err(DeviceError::InvalidGeometry { capacity });
        }
        let backend = FileBackend::open(path, capacity)?;
        Self::new(Box::new(backend), capacity)
    }

    /// Creates a memory-backed device of the given capacity.
    pub fn in_memory(capacity: u64) -> Result<Self> {
        if capacity == 0 || capacity % BLOCK_SIZE as u64 != 0 {
            return Err(DeviceError::InvalidGeometry { capacity });
        }
        let backend = MemoryBackend::new(capacity as usize);
        Self::new(Box::new(backend), capacity)
    }

    /// Number of blocks on this device
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn check_range(&self, block: u64) -> Result<u64> {
        if block >= self.block_count {
            return Err(DeviceError::OutOfRange {
                block,
                count: self.block_count,
            });
        }
        Ok(block * BLOCK_SIZE as u64)
    }

    /// Reads one block into `buf` (must be exactly one block long).
    pub fn read_block(&mut self, block: u64, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        let offset = self.check_range(block)?;
        self.backend.read_at(offset, buf)?;
        Ok(())
    }

    /// Reads one block into a fresh buffer.
    pub fn read_block_vec(&mut self, block: u64) -> Result<Vec<u8>> {
        let offset = self.check_range(block)?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        self.backend.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Writes one block. Data shorter than a block is zero-padded so a
    /// full block always lands on the backend.
    pub fn write_block(&mut self, block: u64, data: &[u8]) -> Result<()> {
        let offset = self.check_range(block)?;
        if data.len() == BLOCK_SIZE {
            self.backend.write_at(offset, data)?;
        } else {
            let mut padded = [0u8; BLOCK_SIZE];
            let len = data.len().min(BLOCK_SIZE);
            padded[..len].copy_from_slice(&data[..len]);
            self.backend.write_at(offset, &padded)?;
        }
        Ok(())
    }

    /// Fills one block with zeros.
    pub fn zero_block(&mut self, block: u64) -> Result<()> {
        self.write_block(block, &[0u8; BLOCK_SIZE])
    }

    /// Flushes all writes to the backing store.
    pub fn flush(&mut self) -> Result<()> {
        self.backend.flush()?;
        Ok(())
    }
}

impl Drop for BlockDevice {
    fn drop(&mut self) {
        // Best effort durability on teardown.
        let _ = self.backend.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_geometry() {
        assert!(matches!(
            BlockDevice::in_memory(0),
            Err(DeviceError::InvalidGeometry { .. })
        ));
        assert!(matches!(
            BlockDevice::in_memory(BLOCK_SIZE as u64 + 1),
            Err(DeviceError::InvalidGeometry { .. })
        ));
        assert!(BlockDevice::in_memory(8 * BLOCK_SIZE as u64).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        let mut dev = BlockDevice::in_memory(4 * BLOCK_SIZE as u64).unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        assert!(matches!(
            dev.read_block(4, &mut buf),
            Err(DeviceError::OutOfRange { block: 4, count: 4 })
        ));
        assert!(dev.read_block(3, &mut buf).is_ok());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut dev = BlockDevice::in_memory(4 * BLOCK_SIZE as u64).unwrap();
        let data = vec![0xAB; BLOCK_SIZE];
        dev.write_block(2, &data).unwrap();

        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(2, &mut buf).unwrap();
        assert_eq!(&buf[..], &data[..]);
    }

    #[test]
    fn test_short_write_pads_with_zeros() {
        let mut dev = BlockDevice::in_memory(2 * BLOCK_SIZE as u64).unwrap();
        dev.write_block(1, &[0xFF; BLOCK_SIZE]).unwrap();
        dev.write_block(1, b"short").unwrap();

        let block = dev.read_block_vec(1).unwrap();
        assert_eq!(&block[..5], b"short");
        assert!(block[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_file_backend_grows_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("dev.img");
        let capacity = 8 * BLOCK_SIZE as u64;

        {
            let mut dev = BlockDevice::open_file(&image, capacity).unwrap();
            dev.write_block(5, b"persisted").unwrap();
            dev.flush().unwrap();
        }

        assert_eq!(std::fs::metadata(&image).unwrap().len(), capacity);

        let mut dev = BlockDevice::open_file(&image, capacity).unwrap();
        let block = dev.read_block_vec(5).unwrap();
        assert_eq!(&block[..9], b"persisted");
        // A grown region reads back as zero.
        let untouched = dev.read_block_vec(7).unwrap();
        assert!(untouched.iter().all(|&b| b == 0));
    }
}
