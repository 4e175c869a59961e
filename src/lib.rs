//! groupfs - a persistent block-group filesystem in a single image file
//!
//! This library implements a small POSIX-flavored filesystem stored in one
//! fixed-size image: files and directories, UNIX-style permission triads
//! with owner/group ids, path lookup from a root, and durable on-disk
//! state that survives process restart.
//!
//! # Features
//!
//! - **Block groups**: the image is cut into self-contained groups, each
//!   with its own inode bitmap, data bitmap, and inode table
//! - **Direct-only block maps**: files address up to 12 blocks (48 KiB)
//! - **Discretionary access control**: owner/group/other `rwx` triads
//!   with a uid-0 override
//! - **Typed on-disk records**: every structure is an explicitly
//!   serialized value with a pinned little-endian layout
//! - **Pluggable storage**: file-backed images or in-memory buffers
//!
//! # Example
//!
//! ```no_run
//! use groupfs::{BlockDevice, FileSystem};
//! use std::path::Path;
//!
//! let device = BlockDevice::open_file(Path::new("fs.img"), 16 * 1024 * 1024).unwrap();
//! let mut fs = FileSystem::format(device).unwrap();
//!
//! fs.create_dir("/home").unwrap();
//! fs.create_file("/home/config.txt").unwrap();
//! fs.write_file("/home/config.txt", b"hello").unwrap();
//! assert_eq!(fs.read_file("/home/config.txt").unwrap(), b"hello");
//! ```

// Block device layer: storage backends and block-granular access
pub mod device;

// Error taxonomy for filesystem operations
pub mod error;

// Filesystem core: namespace, lifecycle, access control
pub mod fs;

// Per-group allocator and inode table manager
pub mod group;

// On-disk data structures and geometry constants
pub mod layout;

// Path tokenizer
pub mod path;

// Re-export commonly used types
pub use device::{BlockDevice, DeviceError, FileBackend, MemoryBackend, StorageBackend};
pub use error::{FsError, Result};
pub use fs::{FileSystem, ListEntry};
pub use layout::{BLOCK_SIZE, MAX_FILE_SIZE};
