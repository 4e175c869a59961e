//! Filesystem core
//!
//! Ties the block groups together into a hierarchical namespace: format
//! and mount, path resolution, file and directory lifecycle, and the
//! discretionary access check.
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------+
//! | FileSystem              |
//! | - Superblock            |
//! | - Session (uid/gid)     |
//! | - Vec<BlockGroup>       |
//! +------------+------------+
//!              |
//! +------------v------------+
//! |       BlockDevice       |
//! +-------------------------+
//! ```
//!
//! Exactly one logical operation runs at a time; every public method
//! takes `&mut self` and runs to completion. Individual steps are not
//! atomic against process kill, and no rollback is attempted.

use log::{debug, info};

use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::group::BlockGroup;
use crate::layout::{
    self, DirEntry, FileKind, Inode, Superblock, BLOCK_SIZE, DIRECT_BLOCKS,
    DIR_ENTRIES_PER_BLOCK, DIR_ENTRY_SIZE,
};
use crate::path;

/// Read permission bit
pub const READ: u16 = 0o4;

/// Write permission bit
pub const WRITE: u16 = 0o2;

/// Execute permission bit
pub const EXEC: u16 = 0o1;

/// Identity used for access checks. uid 0 is root and bypasses the
/// permission triads.
#[derive(Debug, Clone, Copy, Default)]
struct Session {
    uid: u16,
    gid: u16,
}

/// One row of a directory listing.
#[derive(Debug, Clone)]
pub struct ListEntry {
    /// Entry name (lossily decoded for display; names are raw bytes on disk)
    pub name: String,
    /// Owner user id of the referenced inode
    pub uid: u16,
    /// Owner group id of the referenced inode
    pub gid: u16,
    /// Permission bits of the referenced inode
    pub permissions: u16,
    /// Whether the referenced inode is a directory
    pub is_directory: bool,
}

/// The mounted filesystem.
///
/// Constructed by [`FileSystem::format`] (fresh image) or
/// [`FileSystem::mount`] (existing image). Owns the backing device; all
/// mutations persist through it, and teardown flushes the image.
pub struct FileSystem {
    device: BlockDevice,
    superblock: Superblock,
    groups: Vec<BlockGroup>,
    session: Session,
}

impl FileSystem {
    // ========================================================================
    // Format and mount
    // ========================================================================

    /// Formats the device into a fresh filesystem and mounts it.
    ///
    /// Zeroes every block, writes the superblock, seeds the per-group
    /// bitmaps with their metadata blocks, and allocates the root
    /// directory inode.
    pub fn format(mut device: BlockDevice) -> Result<Self> {
        let block_count = device.block_count();
        info!("formatting image: {} blocks", block_count);

        for block in 0..block_count {
            device.zero_block(block)?;
        }

        let superblock = Superblock::new(block_count);
        Self::write_superblock_to(&mut device, &superblock)?;

        let groups: Vec<BlockGroup> = (0..superblock.group_count())
            .map(|g| BlockGroup::new(g, &superblock))
            .collect();
        for group in &groups {
            group.seed_metadata(&mut device)?;
        }

        let mut fs = Self {
            device,
            superblock,
            groups,
            session: Session::default(),
        };

        let root_id = fs.allocate_inode_any()?;
        fs.superblock.home_dir_inode = root_id;
        Self::write_superblock_to(&mut fs.device, &fs.superblock)?;

        fs.write_inode(&Inode::new_directory(root_id, 0, 0))?;
        info!(
            "formatted {} groups, root inode {}",
            fs.groups.len(),
            root_id
        );
        Ok(fs)
    }

    /// Mounts an existing image.
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` when block 0 does not carry the filesystem
    /// magic.
    pub fn mount(mut device: BlockDevice) -> Result<Self> {
        let block = device.read_block_vec(0)?;
        let superblock: Superblock = layout::from_bytes(&block)?;
        if !superblock.is_valid() {
            return Err(FsError::InvalidImage);
        }

        let groups: Vec<BlockGroup> = (0..superblock.group_count())
            .map(|g| BlockGroup::new(g, &superblock))
            .collect();
        info!(
            "mounted image: {} blocks, {} groups, root inode {}",
            superblock.total_blocks,
            groups.len(),
            superblock.home_dir_inode
        );

        Ok(Self {
            device,
            superblock,
            groups,
            session: Session::default(),
        })
    }

    /// The mounted image's superblock.
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// Flushes all pending writes to the backing store.
    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()?;
        Ok(())
    }

    // Serializes the superblock into a zero-padded full block at block 0.
    fn write_superblock_to(device: &mut BlockDevice, sb: &Superblock) -> Result<()> {
        let bytes = layout::to_bytes(sb)?;
        device.write_block(0, &bytes)?;
        Ok(())
    }

    // ========================================================================
    // Session / access control
    // ========================================================================

    /// Switches the session identity used for permission checks.
    pub fn login(&mut self, uid: u16, gid: u16) {
        self.session = Session { uid, gid };
    }

    /// Resets the session identity to root.
    pub fn logout(&mut self) {
        self.session = Session::default();
    }

    /// The current session uid.
    pub fn current_user(&self) -> u16 {
        self.session.uid
    }

    /// The current session gid.
    pub fn current_group(&self) -> u16 {
        self.session.gid
    }

    /// Checks `want` (a combination of [`READ`]/[`WRITE`]/[`EXEC`])
    /// against the inode's permission triads. uid 0 always passes.
    fn check_access(&self, inode: &Inode, want: u16, path: &str) -> Result<()> {
        if self.session.uid == 0 {
            return Ok(());
        }
        let bits = if inode.uid == self.session.uid {
            (inode.permissions >> 6) & 0o7
        } else if inode.gid == self.session.gid {
            (inode.permissions >> 3) & 0o7
        } else {
            inode.permissions & 0o7
        };
        if bits & want != 0 {
            Ok(())
        } else {
            Err(FsError::PermissionDenied(path.to_string()))
        }
    }

    // ========================================================================
    // Group routing
    // ========================================================================

    fn inode_group_index(&self, id: u64) -> Result<usize> {
        let idx = (id / self.superblock.inodes_per_group) as usize;
        if idx >= self.groups.len() {
            return Err(FsError::InvalidInode(id));
        }
        Ok(idx)
    }

    fn block_group_index(&self, block: u64) -> Result<usize> {
        let idx = (block / self.superblock.blocks_per_group) as usize;
        if idx >= self.groups.len() {
            return Err(FsError::InvalidBlock(block));
        }
        Ok(idx)
    }

    fn read_inode(&mut self, id: u64) -> Result<Inode> {
        let idx = self.inode_group_index(id)?;
        self.groups[idx].read_inode(&mut self.device, id)
    }

    fn write_inode(&mut self, inode: &Inode) -> Result<()> {
        let idx = self.inode_group_index(inode.id)?;
        self.groups[idx].write_inode(&mut self.device, inode)
    }

    /// Tries each group in order until one hands out an inode slot.
    fn allocate_inode_any(&mut self) -> Result<u64> {
        for idx in 0..self.groups.len() {
            if let Some(id) = self.groups[idx].allocate_inode(&mut self.device)? {
                return Ok(id);
            }
        }
        Err(FsError::NoSpace)
    }

    /// Allocates a data block from the group owning `inode_id`.
    fn allocate_block_near(&mut self, inode_id: u64) -> Result<u64> {
        let idx = self.inode_group_index(inode_id)?;
        self.groups[idx]
            .allocate_block(&mut self.device)?
            .ok_or(FsError::DiskFull)
    }

    fn free_data_block(&mut self, block: u64) -> Result<()> {
        let idx = self.block_group_index(block)?;
        self.groups[idx].free_block(&mut self.device, block)
    }

    fn free_inode_slot(&mut self, id: u64) -> Result<()> {
        let idx = self.inode_group_index(id)?;
        self.groups[idx].free_inode(&mut self.device, id)
    }

    /// Reads the allocation bit of an inode (offline-scrubber style probe).
    pub fn inode_allocated(&mut self, id: u64) -> Result<bool> {
        let idx = self.inode_group_index(id)?;
        self.groups[idx].is_inode_allocated(&mut self.device, id)
    }

    /// Reads the allocation bit of a data block.
    pub fn block_allocated(&mut self, block: u64) -> Result<bool> {
        let idx = self.block_group_index(block)?;
        self.groups[idx].is_block_allocated(&mut self.device, block)
    }

    // ========================================================================
    // Directory blocks
    // ========================================================================

    /// Decodes the 15 entry slots of a directory block.
    fn read_dir_block(&mut self, block: u64) -> Result<Vec<DirEntry>> {
        let buf = self.device.read_block_vec(block)?;
        let mut entries = Vec::with_capacity(DIR_ENTRIES_PER_BLOCK);
        for slot in 0..DIR_ENTRIES_PER_BLOCK {
            let offset = slot * DIR_ENTRY_SIZE;
            entries.push(layout::from_bytes(&buf[offset..offset + DIR_ENTRY_SIZE])?);
        }
        Ok(entries)
    }

    /// Rewrites a single entry slot inside a directory block.
    fn write_dir_slot(&mut self, block: u64, slot: usize, entry: &DirEntry) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.device.read_block(block, &mut buf)?;
        let bytes = layout::to_bytes(entry)?;
        let offset = slot * DIR_ENTRY_SIZE;
        buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
        self.device.write_block(block, &buf)?;
        Ok(())
    }

    /// Locates `name` inside `dir`: block id, slot index, and the entry.
    fn find_entry_slot(
        &mut self,
        dir: &Inode,
        name: &[u8],
    ) -> Result<Option<(u64, usize, DirEntry)>> {
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(format!("inode {}", dir.id)));
        }
        for &block in &dir.direct {
            if block == 0 {
                break;
            }
            for (slot, entry) in self.read_dir_block(block)?.into_iter().enumerate() {
                if !entry.is_empty_slot() && entry.name_matches(name) {
                    return Ok(Some((block, slot, entry)));
                }
            }
        }
        Ok(None)
    }

    /// Looks `name` up inside `dir`, yielding the referenced inode id.
    fn find_in_dir(&mut self, dir: &Inode, name: &[u8]) -> Result<Option<u64>> {
        Ok(self
            .find_entry_slot(dir, name)?
            .map(|(_, _, entry)| entry.inode_id))
    }

    /// Inserts an entry into the parent directory, growing it by one data
    /// block when the populated blocks are full.
    fn add_entry_to_dir(&mut self, parent_id: u64, child_id: u64, name: &[u8]) -> Result<()> {
        let mut parent = self.read_inode(parent_id)?;
        for i in 0..DIRECT_BLOCKS {
            if parent.direct[i] == 0 {
                // Fresh block: all 15 slots are empty.
                let block = self.allocate_block_near(parent.id)?;
                parent.direct[i] = block;
                self.write_inode(&parent)?;
            }
            let block = parent.direct[i];
            let entries = self.read_dir_block(block)?;
            if let Some(slot) = entries.iter().position(|e| e.is_empty_slot()) {
                self.write_dir_slot(block, slot, &DirEntry::new(child_id, name))?;
                parent.file_size += DIR_ENTRY_SIZE as u64;
                self.write_inode(&parent)?;
                return Ok(());
            }
        }
        Err(FsError::DirectoryFull(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }

    /// Clears the located entry slot and rolls the parent's bookkeeping
    /// size back by one entry.
    fn remove_entry_at(&mut self, parent_id: u64, block: u64, slot: usize) -> Result<()> {
        self.write_dir_slot(block, slot, &DirEntry::empty())?;
        let mut parent = self.read_inode(parent_id)?;
        parent.file_size = parent.file_size.saturating_sub(DIR_ENTRY_SIZE as u64);
        self.write_inode(&parent)
    }

    // ========================================================================
    // Path resolution
    // ========================================================================

    /// Walks all but the last component, returning the parent's inode id.
    /// Empty and single-component paths resolve to the root.
    fn traverse_to_parent(&mut self, parts: &[&str]) -> Result<u64> {
        let mut current = self.superblock.home_dir_inode;
        if parts.len() <= 1 {
            return Ok(current);
        }
        for component in &parts[..parts.len() - 1] {
            let inode = self.read_inode(current)?;
            current = self
                .find_in_dir(&inode, component.as_bytes())?
                .ok_or_else(|| FsError::PathNotFound((*component).to_string()))?;
        }
        Ok(current)
    }

    /// Resolves a whole path to an inode id; the empty path is the root.
    fn resolve(&mut self, path: &str) -> Result<Option<u64>> {
        let parts = path::components(path);
        let Some((name, _)) = parts.split_last() else {
            return Ok(Some(self.superblock.home_dir_inode));
        };
        let parent_id = self.traverse_to_parent(&parts)?;
        let parent = self.read_inode(parent_id)?;
        self.find_in_dir(&parent, name.as_bytes())
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Creates a regular file at `path`.
    pub fn create_file(&mut self, path: &str) -> Result<()> {
        self.create_node(path, FileKind::File)
    }

    /// Creates a directory at `path`.
    pub fn create_dir(&mut self, path: &str) -> Result<()> {
        self.create_node(path, FileKind::Directory)
    }

    fn create_node(&mut self, path: &str, kind: FileKind) -> Result<()> {
        let parts = path::components(path);
        let Some((&name, _)) = parts.split_last() else {
            return Err(FsError::InvalidPath);
        };
        let parent_id = self.traverse_to_parent(&parts)?;
        let parent = self.read_inode(parent_id)?;
        if self.find_in_dir(&parent, name.as_bytes())?.is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let new_id = self.allocate_inode_any()?;
        let inode = match kind {
            FileKind::Directory => {
                Inode::new_directory(new_id, self.session.uid, self.session.gid)
            }
            _ => Inode::new_file(new_id, self.session.uid, self.session.gid),
        };
        self.write_inode(&inode)?;
        self.add_entry_to_dir(parent_id, new_id, name.as_bytes())?;
        debug!("created {:?} at {} (inode {})", kind, path, new_id);
        Ok(())
    }

    // ========================================================================
    // Read / write
    // ========================================================================

    /// Replaces the contents of the file at `path` with `data`.
    ///
    /// Blocks beyond the new length are freed first, then missing blocks
    /// are allocated from the file's own group. A failed allocation
    /// partway through leaves the earlier mutations standing.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let id = self
            .resolve(path)?
            .ok_or_else(|| FsError::FileNotFound(path.to_string()))?;
        let mut inode = self.read_inode(id)?;
        if !inode.is_file() {
            return Err(FsError::NotAFile(path.to_string()));
        }
        self.check_access(&inode, WRITE, path)?;

        let used = data.len().div_ceil(BLOCK_SIZE);
        if used > DIRECT_BLOCKS {
            return Err(FsError::FileTooLarge(data.len()));
        }

        // Shrink: drop pointers past the new length. The cleared pointers
        // are persisted before any allocation can fail, so the on-disk
        // inode never references a freed block.
        for i in used..DIRECT_BLOCKS {
            if inode.direct[i] != 0 {
                self.free_data_block(inode.direct[i])?;
                inode.direct[i] = 0;
            }
        }
        self.write_inode(&inode)?;

        for (i, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
            if inode.direct[i] == 0 {
                inode.direct[i] = self.allocate_block_near(inode.id)?;
            }
            self.device.write_block(inode.direct[i], chunk)?;
        }

        inode.file_size = data.len() as u64;
        self.write_inode(&inode)?;
        Ok(())
    }

    /// Reads the whole file at `path`.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let id = self
            .resolve(path)?
            .ok_or_else(|| FsError::FileNotFound(path.to_string()))?;
        let inode = self.read_inode(id)?;
        if !inode.is_file() {
            return Err(FsError::NotAFile(path.to_string()));
        }
        self.check_access(&inode, READ, path)?;

        let mut data = Vec::with_capacity(inode.file_size as usize);
        for &block in &inode.direct {
            if block == 0 {
                break;
            }
            data.extend_from_slice(&self.device.read_block_vec(block)?);
        }
        data.truncate(inode.file_size as usize);
        Ok(data)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Removes the entry at `path` from its parent and releases the
    /// target's blocks and inode. Requires write access on the parent.
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let parts = path::components(path);
        let Some((&name, _)) = parts.split_last() else {
            return Err(FsError::InvalidPath);
        };
        let parent_id = self.traverse_to_parent(&parts)?;
        let parent = self.read_inode(parent_id)?;
        self.check_access(&parent, WRITE, path)?;

        let (block, slot, entry) = self
            .find_entry_slot(&parent, name.as_bytes())?
            .ok_or_else(|| FsError::FileNotFound(path.to_string()))?;

        self.release_file_resources(entry.inode_id)?;
        self.remove_entry_at(parent_id, block, slot)?;
        debug!("deleted file {} (inode {})", path, entry.inode_id);
        Ok(())
    }

    /// Removes the directory at `path` and everything beneath it.
    /// Requires write access on the parent; sub-items are not re-checked.
    pub fn delete_dir(&mut self, path: &str) -> Result<()> {
        let parts = path::components(path);
        let Some((&name, _)) = parts.split_last() else {
            return Err(FsError::InvalidPath);
        };
        let parent_id = self.traverse_to_parent(&parts)?;
        let parent = self.read_inode(parent_id)?;
        self.check_access(&parent, WRITE, path)?;

        let (block, slot, entry) = self
            .find_entry_slot(&parent, name.as_bytes())?
            .ok_or_else(|| FsError::DirectoryNotFound(path.to_string()))?;
        let target = self.read_inode(entry.inode_id)?;
        if !target.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        self.release_tree(entry.inode_id)?;
        self.remove_entry_at(parent_id, block, slot)?;
        debug!("deleted directory {} (inode {})", path, entry.inode_id);
        Ok(())
    }

    /// Frees every data block of an inode, then its slot. The record's
    /// other fields are left as-is.
    fn release_file_resources(&mut self, id: u64) -> Result<()> {
        let mut inode = self.read_inode(id)?;
        for i in 0..DIRECT_BLOCKS {
            if inode.direct[i] != 0 {
                self.free_data_block(inode.direct[i])?;
                inode.direct[i] = 0;
            }
        }
        self.write_inode(&inode)?;
        self.free_inode_slot(id)
    }

    /// Tears down a directory subtree with an explicit work stack, so
    /// arbitrarily deep trees cannot exhaust the call stack.
    fn release_tree(&mut self, dir_id: u64) -> Result<()> {
        let mut stack = vec![dir_id];
        while let Some(id) = stack.pop() {
            let mut dir = self.read_inode(id)?;
            for i in 0..DIRECT_BLOCKS {
                let block = dir.direct[i];
                if block == 0 {
                    continue;
                }
                for entry in self.read_dir_block(block)? {
                    if entry.is_empty_slot() {
                        continue;
                    }
                    let child = self.read_inode(entry.inode_id)?;
                    if child.is_dir() {
                        stack.push(entry.inode_id);
                    } else {
                        self.release_file_resources(entry.inode_id)?;
                    }
                }
                self.free_data_block(block)?;
                dir.direct[i] = 0;
            }
            self.write_inode(&dir)?;
            self.free_inode_slot(id)?;
        }
        Ok(())
    }

    // ========================================================================
    // List / stat
    // ========================================================================

    /// Lists the directory at `path` (the empty path or `/` is the root).
    /// Requires read access on the directory.
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<ListEntry>> {
        let target_id = self
            .resolve(path)?
            .ok_or_else(|| FsError::DirectoryNotFound(path.to_string()))?;
        let dir = self.read_inode(target_id)?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        self.check_access(&dir, READ, path)?;

        let mut listing = Vec::new();
        for &block in &dir.direct {
            if block == 0 {
                break;
            }
            for entry in self.read_dir_block(block)? {
                if entry.is_empty_slot() {
                    continue;
                }
                let child = self.read_inode(entry.inode_id)?;
                listing.push(ListEntry {
                    name: entry.name_lossy(),
                    uid: child.uid,
                    gid: child.gid,
                    permissions: child.permissions,
                    is_directory: child.is_dir(),
                });
            }
        }
        Ok(listing)
    }

    /// Attributes of the node at `path` (the empty path is the root).
    pub fn stat(&mut self, path: &str) -> Result<ListEntry> {
        let id = self
            .resolve(path)?
            .ok_or_else(|| FsError::FileNotFound(path.to_string()))?;
        let inode = self.read_inode(id)?;
        let name = path::components(path).last().copied().unwrap_or("/");
        Ok(ListEntry {
            name: name.to_string(),
            uid: inode.uid,
            gid: inode.gid,
            permissions: inode.permissions,
            is_directory: inode.is_dir(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MAX_FILE_SIZE;

    fn test_fs() -> FileSystem {
        let device = BlockDevice::in_memory(16 * 1024 * 1024).unwrap();
        FileSystem::format(device).unwrap()
    }

    #[test]
    fn test_fresh_root_is_empty_with_default_mode() {
        let mut fs = test_fs();
        assert!(fs.list_dir("/").unwrap().is_empty());

        let root = fs.stat("/").unwrap();
        assert!(root.is_directory);
        assert_eq!(root.permissions, 0o755);
        assert_eq!((root.uid, root.gid), (0, 0));
    }

    #[test]
    fn test_mount_rejects_blank_image() {
        let device = BlockDevice::in_memory(1024 * 1024).unwrap();
        assert!(matches!(
            FileSystem::mount(device),
            Err(FsError::InvalidImage)
        ));
    }

    #[test]
    fn test_create_and_list() {
        let mut fs = test_fs();
        fs.create_dir("/home").unwrap();
        fs.create_file("/home/notes.txt").unwrap();

        let root = fs.list_dir("/").unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].name, "home");
        assert!(root[0].is_directory);
        assert_eq!(root[0].permissions, 0o755);

        let home = fs.list_dir("/home").unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].name, "notes.txt");
        assert!(!home[0].is_directory);
        assert_eq!(home[0].permissions, 0o644);
    }

    #[test]
    fn test_duplicate_create_fails_without_state_change() {
        let mut fs = test_fs();
        fs.create_dir("/etc").unwrap();
        assert!(matches!(
            fs.create_dir("/etc"),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.create_file("/etc"),
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(fs.list_dir("/").unwrap().len(), 1);
    }

    #[test]
    fn test_create_with_missing_parent() {
        let mut fs = test_fs();
        assert!(matches!(
            fs.create_file("/no/such/file"),
            Err(FsError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_create_through_a_file() {
        let mut fs = test_fs();
        fs.create_file("/blob").unwrap();
        assert!(matches!(
            fs.create_file("/blob/child"),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let mut fs = test_fs();
        assert!(matches!(fs.create_file(""), Err(FsError::InvalidPath)));
        assert!(matches!(fs.create_dir("/"), Err(FsError::InvalidPath)));
        assert!(matches!(fs.delete_file(""), Err(FsError::InvalidPath)));
        assert!(matches!(fs.delete_dir("/"), Err(FsError::InvalidPath)));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut fs = test_fs();
        fs.create_file("/data.bin").unwrap();

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs.write_file("/data.bin", &payload).unwrap();
        assert_eq!(fs.read_file("/data.bin").unwrap(), payload);
    }

    #[test]
    fn test_overwrite_shrinks_file() {
        let mut fs = test_fs();
        fs.create_file("/f").unwrap();
        fs.write_file("/f", &vec![7u8; 3 * BLOCK_SIZE]).unwrap();
        fs.write_file("/f", b"tiny").unwrap();
        assert_eq!(fs.read_file("/f").unwrap(), b"tiny");

        fs.write_file("/f", &[]).unwrap();
        assert!(fs.read_file("/f").unwrap().is_empty());
    }

    #[test]
    fn test_write_too_large() {
        let mut fs = test_fs();
        fs.create_file("/big").unwrap();
        let data = vec![0u8; MAX_FILE_SIZE + 1];
        assert!(matches!(
            fs.write_file("/big", &data),
            Err(FsError::FileTooLarge(_))
        ));
    }

    #[test]
    fn test_write_read_on_directory() {
        let mut fs = test_fs();
        fs.create_dir("/d").unwrap();
        assert!(matches!(
            fs.write_file("/d", b"x"),
            Err(FsError::NotAFile(_))
        ));
        assert!(matches!(fs.read_file("/d"), Err(FsError::NotAFile(_))));
        assert!(matches!(fs.read_file("/"), Err(FsError::NotAFile(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let mut fs = test_fs();
        assert!(matches!(
            fs.read_file("/ghost"),
            Err(FsError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_delete_file_releases_resources() {
        let mut fs = test_fs();
        fs.create_file("/tmp.bin").unwrap();
        fs.write_file("/tmp.bin", &vec![1u8; 2 * BLOCK_SIZE]).unwrap();
        fs.delete_file("/tmp.bin").unwrap();

        assert!(matches!(
            fs.read_file("/tmp.bin"),
            Err(FsError::FileNotFound(_))
        ));
        assert!(fs.list_dir("/").unwrap().is_empty());

        // The freed slots are reusable.
        fs.create_file("/tmp.bin").unwrap();
        fs.write_file("/tmp.bin", b"again").unwrap();
        assert_eq!(fs.read_file("/tmp.bin").unwrap(), b"again");
    }

    #[test]
    fn test_delete_missing_entries() {
        let mut fs = test_fs();
        assert!(matches!(
            fs.delete_file("/nope"),
            Err(FsError::FileNotFound(_))
        ));
        assert!(matches!(
            fs.delete_dir("/nope"),
            Err(FsError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_delete_dir_on_file() {
        let mut fs = test_fs();
        fs.create_file("/f").unwrap();
        assert!(matches!(
            fs.delete_dir("/f"),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_recursive_delete() {
        let mut fs = test_fs();
        fs.create_dir("/a").unwrap();
        fs.create_dir("/a/b").unwrap();
        fs.create_dir("/a/b/c").unwrap();
        fs.create_file("/a/b/c/leaf.txt").unwrap();
        fs.write_file("/a/b/c/leaf.txt", b"deep").unwrap();
        fs.create_file("/a/sibling").unwrap();

        fs.delete_dir("/a").unwrap();
        assert!(fs.list_dir("/").unwrap().is_empty());

        // No allocator leak: everything is creatable again.
        fs.create_file("/x").unwrap();
        fs.write_file("/x", b"fresh").unwrap();
        assert_eq!(fs.read_file("/x").unwrap(), b"fresh");
    }

    #[test]
    fn test_directory_grows_past_one_block() {
        let mut fs = test_fs();
        fs.create_dir("/many").unwrap();
        // More entries than a single block's 15 slots.
        for i in 0..20 {
            fs.create_file(&format!("/many/file_{i}")).unwrap();
        }
        let listing = fs.list_dir("/many").unwrap();
        assert_eq!(listing.len(), 20);
    }

    #[test]
    fn test_directory_full() {
        let mut fs = test_fs();
        fs.create_dir("/cap").unwrap();
        for i in 0..DIRECT_BLOCKS * DIR_ENTRIES_PER_BLOCK {
            fs.create_file(&format!("/cap/f{i}")).unwrap();
        }
        assert!(matches!(
            fs.create_file("/cap/overflow"),
            Err(FsError::DirectoryFull(_))
        ));
    }

    #[test]
    fn test_login_logout() {
        let mut fs = test_fs();
        assert_eq!(fs.current_user(), 0);
        fs.login(100, 200);
        assert_eq!(fs.current_user(), 100);
        assert_eq!(fs.current_group(), 200);
        fs.logout();
        assert_eq!(fs.current_user(), 0);
        assert_eq!(fs.current_group(), 0);
    }

    #[test]
    fn test_owner_and_other_triads() {
        let mut fs = test_fs();
        fs.create_dir("/shared").unwrap();

        fs.login(100, 100);
        fs.create_file("/shared/u.txt").unwrap();
        fs.write_file("/shared/u.txt", b"s").unwrap();

        fs.login(200, 200);
        // Default 0o644: others read but never write.
        assert_eq!(fs.read_file("/shared/u.txt").unwrap(), b"s");
        assert!(matches!(
            fs.write_file("/shared/u.txt", b"h"),
            Err(FsError::PermissionDenied(_))
        ));
        // Parent /shared is root-owned 0o755: no write bit for others.
        assert!(matches!(
            fs.delete_file("/shared/u.txt"),
            Err(FsError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_group_triad() {
        let mut fs = test_fs();
        fs.login(100, 50);
        fs.create_file("/g.txt").unwrap();

        // Same gid, different uid: group triad of 0o644 is read-only.
        fs.login(101, 50);
        assert!(fs.read_file("/g.txt").is_ok());
        assert!(matches!(
            fs.write_file("/g.txt", b"x"),
            Err(FsError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_root_overrides_permissions() {
        let mut fs = test_fs();
        fs.login(100, 100);
        fs.create_file("/mine.txt").unwrap();
        fs.write_file("/mine.txt", b"owned").unwrap();

        fs.logout();
        // uid 0 can touch anything regardless of the triads.
        fs.write_file("/mine.txt", b"root was here").unwrap();
        fs.delete_file("/mine.txt").unwrap();
    }
}
