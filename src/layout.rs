//! On-disk format for the block-group filesystem
//!
//! This module defines the binary layout of every persistent structure in
//! the image. All records are serialized with bincode's fixed-width
//! little-endian encoding, so the byte layout is exactly the field list in
//! declaration order with no padding.
//!
//! ## Image Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ Block 0: Superblock (zero-padded to a full 4 KB block)              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │ Group 0                                                             │
//! │   block 0: superblock (above)                                       │
//! │   block 1: inode bitmap (1 bit per inode slot)                      │
//! │   block 2: data-block bitmap (1 bit per block in the group)         │
//! │   blocks 3..3+T: inode table (T = ⌈inodes_per_group × 128 / 4096⌉)  │
//! │   blocks 3+T..: data blocks                                         │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │ Group 1..N: same relative layout, block 0 unused                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bits for every metadata block (including the superblock and each
//! group's own bitmaps and inode table) are set in the data bitmaps at
//! format time, so an allocation scan never has to skip a reserved
//! region: the bitmap always reflects reality.

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

/// Block size in bytes. Fixed for the whole image.
pub const BLOCK_SIZE: usize = 4096;

/// Magic number identifying a formatted image (stored in the superblock).
pub const FS_MAGIC: u32 = 0xF551_3001;

/// Number of direct block pointers in an inode.
pub const DIRECT_BLOCKS: usize = 12;

/// Maximum file size addressable through the direct-only block map.
pub const MAX_FILE_SIZE: usize = DIRECT_BLOCKS * BLOCK_SIZE;

/// On-disk inode record size in bytes.
pub const INODE_SIZE: usize = 128;

/// Inode records per inode-table block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// On-disk directory entry size in bytes.
pub const DIR_ENTRY_SIZE: usize = 264;

/// Directory entries per directory data block.
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

/// Maximum entries a single directory can hold.
pub const MAX_DIR_ENTRIES: usize = DIRECT_BLOCKS * DIR_ENTRIES_PER_BLOCK;

/// Maximum name length stored in a directory entry. One byte of the
/// 255-byte buffer is kept as a trailing zero.
pub const MAX_NAME_LEN: usize = 254;

/// Reserved inode id, never allocated and never stored in a live entry.
/// A directory slot whose inode id is this value is an empty slot.
pub const RESERVED_INODE: u64 = 0;

/// Default group geometry: blocks and inode slots per group.
pub const DEFAULT_GROUP_SIZE: u64 = 4096;

/// Group-relative block of the inode bitmap.
pub const INODE_BITMAP_OFFSET: u64 = 1;

/// Group-relative block of the data-block bitmap.
pub const DATA_BITMAP_OFFSET: u64 = 2;

/// Group-relative block where the inode table starts.
pub const INODE_TABLE_OFFSET: u64 = 3;

/// Default permission bits for new directories.
pub const DEFAULT_DIR_MODE: u16 = 0o755;

/// Default permission bits for new regular files.
pub const DEFAULT_FILE_MODE: u16 = 0o644;

// ============================================================================
// Superblock
// ============================================================================

/// Image superblock, stored at block 0 and padded with zeros to a full
/// block (44 bytes serialized).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Superblock {
    /// Magic number for identification
    pub magic: u32,

    /// Total inode slots across all groups
    pub total_inodes: u64,

    /// Total block count of the image
    pub total_blocks: u64,

    /// Inode slots per block group
    pub inodes_per_group: u64,

    /// Blocks per block group
    pub blocks_per_group: u64,

    /// Global inode id of the root directory (0 until the root is allocated)
    pub home_dir_inode: u64,
}

impl Superblock {
    /// Builds the superblock for a fresh image of `total_blocks` blocks.
    ///
    /// Images smaller than the default group size collapse into a single
    /// group covering the whole device; larger images are cut into
    /// 4096-block groups.
    pub fn new(total_blocks: u64) -> Self {
        let group_size = if total_blocks < DEFAULT_GROUP_SIZE {
            total_blocks
        } else {
            DEFAULT_GROUP_SIZE
        };
        let group_count = total_blocks.div_ceil(group_size);

        Self {
            magic: FS_MAGIC,
            total_inodes: group_count * group_size,
            total_blocks,
            inodes_per_group: group_size,
            blocks_per_group: group_size,
            home_dir_inode: RESERVED_INODE,
        }
    }

    /// Number of block groups in the image.
    pub fn group_count(&self) -> u64 {
        self.total_blocks.div_ceil(self.blocks_per_group)
    }

    /// Blocks occupied by one group's inode table.
    pub fn inode_table_blocks(&self) -> u64 {
        (self.inodes_per_group * INODE_SIZE as u64).div_ceil(BLOCK_SIZE as u64)
    }

    /// Returns true when the magic identifies a formatted image.
    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }
}

// ============================================================================
// Inode
// ============================================================================

/// File type stored in the inode `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FileKind {
    /// Unallocated slot
    Free = 0,
    /// Regular file
    File = 1,
    /// Directory
    Directory = 2,
}

impl From<u16> for FileKind {
    fn from(v: u16) -> Self {
        match v {
            1 => FileKind::File,
            2 => FileKind::Directory,
            _ => FileKind::Free,
        }
    }
}

/// On-disk inode record (128 bytes).
///
/// `file_size` is the byte length for regular files; for directories it
/// is a running count of entries × entry size, kept for bookkeeping only
/// (iteration relies on empty-slot sentinels, never on this value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inode {
    /// Global inode id (`group × inodes_per_group + local index`)
    pub id: u64,

    /// File type (see [`FileKind`])
    pub kind: u16,

    /// Byte length for files; entry-count bookkeeping for directories
    pub file_size: u64,

    /// Owner user id
    pub uid: u16,

    /// Owner group id
    pub gid: u16,

    /// Low 9 bits used as `rwxrwxrwx` (owner/group/other)
    pub permissions: u16,

    /// Direct block pointers; 0 = unused slot
    pub direct: [u64; DIRECT_BLOCKS],

    /// Reserved, pads the record to 128 bytes
    pub reserved: [u8; 8],
}

impl Inode {
    /// Creates a zeroed inode carrying only its id.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            kind: FileKind::Free as u16,
            file_size: 0,
            uid: 0,
            gid: 0,
            permissions: 0,
            direct: [0; DIRECT_BLOCKS],
            reserved: [0; 8],
        }
    }

    /// Creates a regular file inode owned by `uid:gid` with default mode.
    pub fn new_file(id: u64, uid: u16, gid: u16) -> Self {
        Self {
            kind: FileKind::File as u16,
            uid,
            gid,
            permissions: DEFAULT_FILE_MODE,
            ..Self::new(id)
        }
    }

    /// Creates a directory inode owned by `uid:gid` with default mode.
    pub fn new_directory(id: u64, uid: u16, gid: u16) -> Self {
        Self {
            kind: FileKind::Directory as u16,
            uid,
            gid,
            permissions: DEFAULT_DIR_MODE,
            ..Self::new(id)
        }
    }

    /// Returns the file type
    pub fn file_kind(&self) -> FileKind {
        FileKind::from(self.kind)
    }

    /// Returns true if this is a directory
    pub fn is_dir(&self) -> bool {
        self.file_kind() == FileKind::Directory
    }

    /// Returns true if this is a regular file
    pub fn is_file(&self) -> bool {
        self.file_kind() == FileKind::File
    }
}

// ============================================================================
// Directory Entry
// ============================================================================

/// On-disk directory entry (264 bytes, 15 per block).
///
/// An entry with `inode_id == 0` is an empty slot. The name buffer is
/// zero-padded; at most [`MAX_NAME_LEN`] bytes are stored so a trailing
/// zero is always present, and readers never look past `name_len`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Referenced inode id (0 = empty slot)
    pub inode_id: u64,

    /// Length of the stored name in bytes
    pub name_len: u8,

    /// Name bytes, zero-padded
    #[serde(with = "BigArray")]
    pub name: [u8; 255],
}

impl DirEntry {
    /// Creates an entry binding `name` to `inode_id`. Names longer than
    /// [`MAX_NAME_LEN`] bytes are truncated.
    pub fn new(inode_id: u64, name: &[u8]) -> Self {
        let mut buf = [0u8; 255];
        let len = name.len().min(MAX_NAME_LEN);
        buf[..len].copy_from_slice(&name[..len]);
        Self {
            inode_id,
            name_len: len as u8,
            name: buf,
        }
    }

    /// An empty slot, used to clear a directory position.
    pub fn empty() -> Self {
        Self {
            inode_id: RESERVED_INODE,
            name_len: 0,
            name: [0u8; 255],
        }
    }

    /// Returns true if this slot holds no entry.
    pub fn is_empty_slot(&self) -> bool {
        self.inode_id == RESERVED_INODE
    }

    /// The stored name, bounded by `name_len`.
    pub fn name_bytes(&self) -> &[u8] {
        let len = (self.name_len as usize).min(self.name.len());
        &self.name[..len]
    }

    /// Bounded comparison against a candidate name.
    pub fn name_matches(&self, name: &[u8]) -> bool {
        self.name_bytes() == name
    }

    /// The name rendered for display; invalid UTF-8 is replaced.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }
}

impl Default for DirEntry {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// Bitmap Operations
// ============================================================================

/// Bitmap helper for block/inode allocation.
///
/// Wraps one bitmap block; bit `i` lives at `data[i / 8]`, position
/// `i % 8`.
#[derive(Debug, Clone)]
pub struct Bitmap {
    data: Vec<u8>,
}

impl Bitmap {
    /// Creates a bitmap from an existing bitmap block
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns the raw data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Checks if a bit is set
    pub fn is_set(&self, index: usize) -> bool {
        let byte_idx = index / 8;
        let bit_idx = index % 8;
        if byte_idx >= self.data.len() {
            return false;
        }
        (self.data[byte_idx] & (1 << bit_idx)) != 0
    }

    /// Sets a bit
    pub fn set(&mut self, index: usize) {
        let byte_idx = index / 8;
        let bit_idx = index % 8;
        if byte_idx < self.data.len() {
            self.data[byte_idx] |= 1 << bit_idx;
        }
    }

    /// Clears a bit
    pub fn clear(&mut self, index: usize) {
        let byte_idx = index / 8;
        let bit_idx = index % 8;
        if byte_idx < self.data.len() {
            self.data[byte_idx] &= !(1 << bit_idx);
        }
    }

    /// Finds the lowest clear bit below `limit`
    pub fn find_first_clear(&self, limit: usize) -> Option<usize> {
        let total_bits = (self.data.len() * 8).min(limit);
        (0..total_bits).find(|&i| !self.is_set(i))
    }

    /// Counts set bits below `limit`
    pub fn count_set(&self, limit: usize) -> usize {
        let total_bits = (self.data.len() * 8).min(limit);
        (0..total_bits).filter(|&i| self.is_set(i)).count()
    }
}

// ============================================================================
// Serialization helpers
// ============================================================================

/// Encodes an on-disk record with the pinned fixed-width little-endian
/// layout.
pub(crate) fn to_bytes<T: Serialize>(value: &T) -> crate::error::Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| crate::error::FsError::Serialization(e.to_string()))
}

/// Decodes an on-disk record. Trailing bytes in `bytes` (block padding)
/// are ignored.
pub(crate) fn from_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> crate::error::Result<T> {
    bincode::deserialize(bytes).map_err(|e| crate::error::FsError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superblock_serialized_size() {
        let sb = Superblock::new(4096);
        let bytes = bincode::serialize(&sb).unwrap();
        assert_eq!(bytes.len(), 44);
        assert!(bytes.len() <= BLOCK_SIZE);
    }

    #[test]
    fn test_inode_serialized_size() {
        let inode = Inode::new_file(7, 100, 100);
        let bytes = bincode::serialize(&inode).unwrap();
        assert_eq!(bytes.len(), INODE_SIZE);
    }

    #[test]
    fn test_dir_entry_serialized_size() {
        let entry = DirEntry::new(42, b"test.txt");
        let bytes = bincode::serialize(&entry).unwrap();
        assert_eq!(bytes.len(), DIR_ENTRY_SIZE);
        assert_eq!(DIR_ENTRIES_PER_BLOCK, 15);
    }

    #[test]
    fn test_superblock_geometry_tiny_image() {
        // Below the default group size, the whole image is one group.
        let sb = Superblock::new(1280);
        assert_eq!(sb.blocks_per_group, 1280);
        assert_eq!(sb.inodes_per_group, 1280);
        assert_eq!(sb.group_count(), 1);
        assert_eq!(sb.total_inodes, 1280);
    }

    #[test]
    fn test_superblock_geometry_multi_group() {
        let sb = Superblock::new(3 * 4096 + 100);
        assert_eq!(sb.blocks_per_group, 4096);
        assert_eq!(sb.group_count(), 4);
        assert_eq!(sb.total_inodes, 4 * 4096);
    }

    #[test]
    fn test_inode_kinds() {
        let file = Inode::new_file(1, 0, 0);
        assert!(file.is_file());
        assert!(!file.is_dir());
        assert_eq!(file.permissions, DEFAULT_FILE_MODE);

        let dir = Inode::new_directory(2, 0, 0);
        assert!(dir.is_dir());
        assert_eq!(dir.permissions, DEFAULT_DIR_MODE);

        assert_eq!(FileKind::from(0), FileKind::Free);
        assert_eq!(FileKind::from(9), FileKind::Free);
    }

    #[test]
    fn test_dir_entry_names() {
        let entry = DirEntry::new(3, b"config.txt");
        assert_eq!(entry.name_bytes(), b"config.txt");
        assert!(entry.name_matches(b"config.txt"));
        assert!(!entry.name_matches(b"config"));
        // A trailing zero always follows the stored bytes.
        assert_eq!(entry.name[entry.name_len as usize], 0);

        let long = vec![b'x'; 300];
        let truncated = DirEntry::new(4, &long);
        assert_eq!(truncated.name_len as usize, MAX_NAME_LEN);
        assert_eq!(truncated.name[254], 0);
    }

    #[test]
    fn test_dir_entry_roundtrip() {
        let entry = DirEntry::new(42, b"hello");
        let bytes = bincode::serialize(&entry).unwrap();
        let back: DirEntry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.inode_id, 42);
        assert!(back.name_matches(b"hello"));
    }

    #[test]
    fn test_bitmap() {
        let mut bitmap = Bitmap::from_data(vec![0u8; 16]);

        assert!(!bitmap.is_set(0));
        bitmap.set(42);
        assert!(bitmap.is_set(42));
        assert!(!bitmap.is_set(41));
        assert!(!bitmap.is_set(43));

        bitmap.clear(42);
        assert!(!bitmap.is_set(42));

        bitmap.set(0);
        bitmap.set(1);
        assert_eq!(bitmap.find_first_clear(128), Some(2));
        assert_eq!(bitmap.count_set(128), 2);
    }

    #[test]
    fn test_bitmap_scan_respects_limit() {
        let mut bitmap = Bitmap::from_data(vec![0xFF; 2]);
        assert_eq!(bitmap.find_first_clear(16), None);
        bitmap.clear(9);
        assert_eq!(bitmap.find_first_clear(8), None);
        assert_eq!(bitmap.find_first_clear(16), Some(9));
    }

    #[test]
    fn test_inode_decode_ignores_block_padding() {
        let inode = Inode::new_directory(5, 10, 20);
        let mut block = vec![0u8; BLOCK_SIZE];
        let bytes = bincode::serialize(&inode).unwrap();
        block[..bytes.len()].copy_from_slice(&bytes);

        let back: Inode = bincode::deserialize(&block).unwrap();
        assert_eq!(back.id, 5);
        assert!(back.is_dir());
        assert_eq!((back.uid, back.gid), (10, 20));
    }
}
