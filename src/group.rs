//! Block-group manager
//!
//! One [`BlockGroup`] instance owns the metadata of one group: the inode
//! bitmap, the data-block bitmap, and the inode table. It hands out and
//! reclaims inode slots and data blocks, and reads/writes inode records
//! by global id.
//!
//! Every group uses the same relative layout (bitmaps at blocks 1 and 2,
//! inode table from block 3); metadata bits are seeded into the data
//! bitmap at format time, so allocation scans always start at bit 0 and
//! the bitmaps are authoritative for the whole group.
//!
//! Groups never call upward into the filesystem core; they only touch the
//! device they are handed.

use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::layout::{
    self, Bitmap, Inode, Superblock, BLOCK_SIZE, DATA_BITMAP_OFFSET, INODES_PER_BLOCK,
    INODE_BITMAP_OFFSET, INODE_SIZE, INODE_TABLE_OFFSET, RESERVED_INODE,
};

/// Manager for one block group.
#[derive(Debug, Clone)]
pub struct BlockGroup {
    group_id: u64,
    inodes_per_group: u64,
    blocks_per_group: u64,
    /// Blocks of this group that actually exist on the device; only the
    /// trailing group of an image can be partial.
    local_block_count: u64,
    inode_table_blocks: u64,
}

impl BlockGroup {
    /// Builds the manager for group `group_id` from the image geometry.
    pub fn new(group_id: u64, sb: &Superblock) -> Self {
        let base = group_id * sb.blocks_per_group;
        let local_block_count = sb.blocks_per_group.min(sb.total_blocks - base);
        Self {
            group_id,
            inodes_per_group: sb.inodes_per_group,
            blocks_per_group: sb.blocks_per_group,
            local_block_count,
            inode_table_blocks: sb.inode_table_blocks(),
        }
    }

    /// Group id of this manager.
    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    fn base_block(&self) -> u64 {
        self.group_id * self.blocks_per_group
    }

    fn inode_bitmap_block(&self) -> u64 {
        self.base_block() + INODE_BITMAP_OFFSET
    }

    fn data_bitmap_block(&self) -> u64 {
        self.base_block() + DATA_BITMAP_OFFSET
    }

    fn inode_table_start(&self) -> u64 {
        self.base_block() + INODE_TABLE_OFFSET
    }

    fn read_bitmap(&self, device: &mut BlockDevice, block: u64) -> Result<Bitmap> {
        Ok(Bitmap::from_data(device.read_block_vec(block)?))
    }

    fn write_bitmap(&self, device: &mut BlockDevice, block: u64, bitmap: &Bitmap) -> Result<()> {
        device.write_block(block, bitmap.data())?;
        Ok(())
    }

    // ========================================================================
    // Format-time seeding
    // ========================================================================

    /// Seeds the group's bitmaps with its metadata blocks.
    ///
    /// The relative block 0 (the image superblock in group 0, unused
    /// elsewhere), both bitmap blocks, and the inode table are marked used
    /// in the data bitmap. Group 0 additionally reserves inode slot 0 so
    /// the reserved id is never handed out.
    pub fn seed_metadata(&self, device: &mut BlockDevice) -> Result<()> {
        let mut data_bitmap = self.read_bitmap(device, self.data_bitmap_block())?;
        let metadata_blocks = (INODE_TABLE_OFFSET + self.inode_table_blocks)
            .min(self.local_block_count);
        for local in 0..metadata_blocks {
            data_bitmap.set(local as usize);
        }
        self.write_bitmap(device, self.data_bitmap_block(), &data_bitmap)?;

        if self.group_id == 0 {
            let mut inode_bitmap = self.read_bitmap(device, self.inode_bitmap_block())?;
            inode_bitmap.set(RESERVED_INODE as usize);
            self.write_bitmap(device, self.inode_bitmap_block(), &inode_bitmap)?;
        }

        Ok(())
    }

    // ========================================================================
    // Inode allocation
    // ========================================================================

    /// Allocates the lowest free inode slot of this group.
    ///
    /// The slot's record is zeroed and stamped with its global id before
    /// the id is returned. `None` means the group is full.
    pub fn allocate_inode(&self, device: &mut BlockDevice) -> Result<Option<u64>> {
        let mut bitmap = self.read_bitmap(device, self.inode_bitmap_block())?;
        let local = match bitmap.find_first_clear(self.inodes_per_group as usize) {
            Some(local) => local,
            None => return Ok(None),
        };
        bitmap.set(local);
        self.write_bitmap(device, self.inode_bitmap_block(), &bitmap)?;

        let global_id = self.group_id * self.inodes_per_group + local as u64;
        self.write_inode(device, &Inode::new(global_id))?;
        Ok(Some(global_id))
    }

    /// Clears the bitmap bit of `global_id`.
    ///
    /// Inode bytes are not scrubbed; callers must already have released
    /// the inode's data blocks.
    pub fn free_inode(&self, device: &mut BlockDevice, global_id: u64) -> Result<()> {
        let local = self.check_inode_range(global_id)?;
        let mut bitmap = self.read_bitmap(device, self.inode_bitmap_block())?;
        bitmap.clear(local as usize);
        self.write_bitmap(device, self.inode_bitmap_block(), &bitmap)
    }

    /// Reads the allocation bit of `global_id`.
    pub fn is_inode_allocated(&self, device: &mut BlockDevice, global_id: u64) -> Result<bool> {
        let local = self.check_inode_range(global_id)?;
        let bitmap = self.read_bitmap(device, self.inode_bitmap_block())?;
        Ok(bitmap.is_set(local as usize))
    }

    // ========================================================================
    // Data block allocation
    // ========================================================================

    /// Allocates the lowest free data block of this group and zeroes it.
    ///
    /// Metadata blocks are already set in the bitmap, so the scan starts
    /// at bit 0. `None` means the group has no free blocks.
    pub fn allocate_block(&self, device: &mut BlockDevice) -> Result<Option<u64>> {
        let mut bitmap = self.read_bitmap(device, self.data_bitmap_block())?;
        let local = match bitmap.find_first_clear(self.local_block_count as usize) {
            Some(local) => local,
            None => return Ok(None),
        };
        bitmap.set(local);
        self.write_bitmap(device, self.data_bitmap_block(), &bitmap)?;

        let global_id = self.base_block() + local as u64;
        device.zero_block(global_id)?;
        Ok(Some(global_id))
    }

    /// Clears the bitmap bit of data block `global_id`.
    pub fn free_block(&self, device: &mut BlockDevice, global_id: u64) -> Result<()> {
        let local = global_id % self.blocks_per_group;
        let mut bitmap = self.read_bitmap(device, self.data_bitmap_block())?;
        bitmap.clear(local as usize);
        self.write_bitmap(device, self.data_bitmap_block(), &bitmap)
    }

    /// Reads the allocation bit of data block `global_id`.
    pub fn is_block_allocated(&self, device: &mut BlockDevice, global_id: u64) -> Result<bool> {
        let local = global_id % self.blocks_per_group;
        let bitmap = self.read_bitmap(device, self.data_bitmap_block())?;
        Ok(bitmap.is_set(local as usize))
    }

    // ========================================================================
    // Inode table access
    // ========================================================================

    fn check_inode_range(&self, global_id: u64) -> Result<u64> {
        let start = self.group_id * self.inodes_per_group;
        let end = start + self.inodes_per_group;
        if global_id < start || global_id >= end {
            return Err(FsError::InvalidInode(global_id));
        }
        Ok(global_id - start)
    }

    /// Location of an inode record: table block and byte offset within it.
    fn inode_location(&self, local: u64) -> (u64, usize) {
        let block = self.inode_table_start() + local / INODES_PER_BLOCK as u64;
        let offset = (local % INODES_PER_BLOCK as u64) as usize * INODE_SIZE;
        (block, offset)
    }

    /// Reads the inode record of `global_id` from the table.
    pub fn read_inode(&self, device: &mut BlockDevice, global_id: u64) -> Result<Inode> {
        let local = self.check_inode_range(global_id)?;
        let (block, offset) = self.inode_location(local);
        let mut buf = [0u8; BLOCK_SIZE];
        device.read_block(block, &mut buf)?;
        layout::from_bytes(&buf[offset..offset + INODE_SIZE])
    }

    /// Writes an inode record back into the table (read-modify-write of
    /// the containing block).
    pub fn write_inode(&self, device: &mut BlockDevice, inode: &Inode) -> Result<()> {
        let local = self.check_inode_range(inode.id)?;
        let (block, offset) = self.inode_location(local);
        let mut buf = [0u8; BLOCK_SIZE];
        device.read_block(block, &mut buf)?;
        let bytes = layout::to_bytes(inode)?;
        buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
        device.write_block(block, &buf)?;
        Ok(())
    }
}
