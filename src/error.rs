//! Error types for filesystem operations.
//!
//! This module defines the error taxonomy surfaced by the filesystem core.
//! Device-level failures have their own type ([`DeviceError`]) and are
//! wrapped transparently.

use thiserror::Error;

use crate::device::DeviceError;
use crate::layout::{MAX_DIR_ENTRIES, MAX_FILE_SIZE};

/// Main error type for all filesystem operations.
#[derive(Error, Debug)]
pub enum FsError {
    /// Block device failure (bad geometry, out-of-range access, I/O).
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The superblock magic does not identify a formatted image.
    #[error("invalid image: superblock magic mismatch")]
    InvalidImage,

    /// An empty path was given to an operation that needs a name.
    #[error("invalid path: empty")]
    InvalidPath,

    /// An intermediate path component does not exist.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A non-directory inode was used as a path node or listing target.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Read/write applied to an inode that is not a regular file.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// Final path component did not resolve to a file.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Final path component did not resolve to a directory.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// Create with a name that already exists in the parent directory.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Write larger than the direct-block map can address.
    #[error("file too large: {0} bytes (max {MAX_FILE_SIZE})")]
    FileTooLarge(usize),

    /// Directory has exhausted all of its entry slots.
    #[error("directory full: {0} (max {MAX_DIR_ENTRIES} entries)")]
    DirectoryFull(String),

    /// No group could satisfy an inode allocation.
    #[error("no space: all inode slots in use")]
    NoSpace,

    /// The owning group could not satisfy a data block allocation.
    #[error("disk full: no free data blocks in group")]
    DiskFull,

    /// Access control rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Inode id does not belong to any group of this image.
    #[error("invalid inode id: {0}")]
    InvalidInode(u64),

    /// Block id does not belong to any group of this image.
    #[error("invalid block id: {0}")]
    InvalidBlock(u64),

    /// On-disk record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Type alias for Results using FsError.
pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FsError::PathNotFound("/a/b".to_string());
        assert_eq!(err.to_string(), "path not found: /a/b");
    }

    #[test]
    fn test_device_error_conversion() {
        let dev_err = DeviceError::OutOfRange { block: 9, count: 4 };
        let err: FsError = dev_err.into();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_file_too_large_mentions_limit() {
        let err = FsError::FileTooLarge(50_000);
        assert!(err.to_string().contains("49152"));
    }
}
