//! In-memory projection of one mounted ext2 partition.
//!
//! Grounded in `mkfs/src/ext2.rs`'s `Ext2Fs` writer (which already owns a
//! superblock + group-descriptor table + per-group bitmap/inode-table
//! buffers while building a filesystem from scratch) — this module mirrors
//! that same cache shape but mounts an *existing* filesystem read-through
//! instead of laying one out, and adds the block-list / directory-entry
//! walkers the repair engine needs (grounded in the kernel's
//! `file/fs/ext2/inode.rs` indirection walk and `dirent.rs` iteration).

use crate::error::{FsckError, FsckResult};
use crate::sector::{SectorDevice, SECTOR_SIZE};

use super::dirent::{self, DirEntry};
use super::group::{set_bit, test_bit, Group, GroupDesc, GROUP_DESC_SIZE};
use super::inode::{Inode, DIRECT_BLOCKS_COUNT, INODE_SIZE, ROOT_INODE};
use super::superblock::{Superblock, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};

#[cfg(test)]
use crate::testutil::temp_file;

/// An in-memory mount of one ext2 partition: the superblock, per-group
/// descriptors/bitmaps/inode tables, and a handle back to the device for
/// block-granular I/O.
pub struct Ext2Fs {
    dev: SectorDevice,
    /// Absolute sector of the start of this partition on the underlying
    /// image, as returned by the partition locator.
    base_sector: u32,
    pub superblock: Superblock,
    groups: Vec<Group>,
    /// First block of the group descriptor table, and how many blocks it
    /// spans — reserved space, same as the superblock and per-group
    /// bitmaps/inode tables.
    gdt_block: u32,
    gdt_blocks: u32,
}

impl Ext2Fs {
    /// Mounts the partition starting at `base_sector` on `dev`, reading the
    /// superblock, group descriptor table, and every group's bitmaps and
    /// inode table into memory.
    ///
    /// Returns `NotExt2` if the superblock magic does not match — the
    /// caller (the `-f` dispatch path) turns that into the exact
    /// `"Trying to run fsck on an invalid partition"` diagnostic.
    pub fn mount(mut dev: SectorDevice, base_sector: u32) -> FsckResult<Self> {
        let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
        read_at(&mut dev, base_sector, SUPERBLOCK_OFFSET, &mut sb_buf)?;
        let superblock = match Superblock::decode(&sb_buf) {
            Ok(sb) => sb,
            Err(FsckError::Malformed(_)) => return Err(FsckError::NotExt2),
            Err(e) => return Err(e),
        };

        let block_size = superblock.block_size();
        let group_count = superblock.group_count();

        // The group descriptor table starts immediately after the block
        // containing the superblock.
        let gdt_block = if block_size == 1024 { 2 } else { 1 };
        let gdt_bytes = group_count as usize * GROUP_DESC_SIZE;
        let gdt_blocks = (gdt_bytes as u32).div_ceil(block_size);
        let mut gdt_buf = vec![0u8; (gdt_blocks * block_size) as usize];
        read_blocks_raw(&mut dev, base_sector, block_size, gdt_block, gdt_blocks, &mut gdt_buf)?;

        let mut groups = Vec::with_capacity(group_count as usize);
        for g in 0..group_count {
            let off = g as usize * GROUP_DESC_SIZE;
            let desc = GroupDesc::decode(&gdt_buf[off..off + GROUP_DESC_SIZE]);

            let mut block_bitmap = vec![0u8; block_size as usize];
            read_blocks_raw(&mut dev, base_sector, block_size, desc.block_bitmap, 1, &mut block_bitmap)?;

            let mut inode_bitmap = vec![0u8; block_size as usize];
            read_blocks_raw(&mut dev, base_sector, block_size, desc.inode_bitmap, 1, &mut inode_bitmap)?;

            let inode_table_blocks = (superblock.inodes_per_group as u64 * INODE_SIZE as u64)
                .div_ceil(block_size as u64) as u32;
            let mut inode_table = vec![0u8; (inode_table_blocks * block_size) as usize];
            read_blocks_raw(
                &mut dev,
                base_sector,
                block_size,
                desc.inode_table,
                inode_table_blocks,
                &mut inode_table,
            )?;

            groups.push(Group {
                id: g,
                desc,
                block_bitmap,
                inode_bitmap,
                inode_table,
            });
        }

        Ok(Self {
            dev,
            base_sector,
            superblock,
            groups,
            gdt_block,
            gdt_blocks,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.superblock.block_size()
    }

    pub fn blocks_per_group(&self) -> u32 {
        self.superblock.blocks_per_group
    }

    pub fn inodes_per_group(&self) -> u32 {
        self.superblock.inodes_per_group
    }

    pub fn group_count(&self) -> u32 {
        self.groups.len() as u32
    }

    pub fn blocks_count(&self) -> u32 {
        self.superblock.blocks_count
    }

    pub fn inodes_count(&self) -> u32 {
        self.superblock.inodes_count
    }

    /// Reads `count` consecutive blocks starting at `block_id`.
    pub fn read_block(&mut self, block_id: u32, count: u32) -> FsckResult<Vec<u8>> {
        let block_size = self.block_size();
        let mut buf = vec![0u8; (count * block_size) as usize];
        read_blocks_raw(&mut self.dev, self.base_sector, block_size, block_id, count, &mut buf)?;
        Ok(buf)
    }

    /// Writes `bytes` (exactly `count * block_size` long) to `count`
    /// consecutive blocks starting at `block_id`.
    pub fn write_block(&mut self, block_id: u32, count: u32, bytes: &[u8]) -> FsckResult<()> {
        let block_size = self.block_size();
        write_blocks_raw(&mut self.dev, self.base_sector, block_size, block_id, count, bytes)
    }

    fn group_of_inode(&self, id: u32) -> (usize, u32) {
        let idx = id - 1;
        (
            (idx / self.inodes_per_group()) as usize,
            idx % self.inodes_per_group(),
        )
    }

    /// Reads inode `id` (1-based) from the cached inode table.
    pub fn get_inode(&self, id: u32) -> Inode {
        let (group_idx, offset) = self.group_of_inode(id);
        let off = offset as usize * INODE_SIZE;
        let buf = &self.groups[group_idx].inode_table[off..off + INODE_SIZE];
        Inode::decode(buf)
    }

    /// Writes `inode` back into inode `id`'s slot and flushes the enclosing
    /// block of the inode table to disk. The in-memory group cache is
    /// updated in place so subsequent `get_inode` calls observe the write.
    pub fn put_inode(&mut self, id: u32, inode: &Inode) -> FsckResult<()> {
        let (group_idx, offset) = self.group_of_inode(id);
        let off = offset as usize * INODE_SIZE;
        inode.encode_into(&mut self.groups[group_idx].inode_table[off..off + INODE_SIZE]);

        let block_size = self.block_size();
        let block_in_table = off as u32 / block_size;
        let table_start = self.groups[group_idx].desc.inode_table;
        let block_off = (block_in_table * block_size) as usize;
        let block_bytes = self.groups[group_idx].inode_table
            [block_off..block_off + block_size as usize]
            .to_vec();
        self.write_block(table_start + block_in_table, 1, &block_bytes)
    }

    pub fn block_allocated(&self, block_id: u32) -> bool {
        let rel = block_id - self.superblock.first_data_block;
        let group_idx = (rel / self.blocks_per_group()) as usize;
        let bit = rel % self.blocks_per_group();
        match self.groups.get(group_idx) {
            Some(g) => g.block_bit(bit),
            None => false,
        }
    }

    pub fn inode_allocated(&self, inode_id: u32) -> bool {
        let (group_idx, offset) = self.group_of_inode(inode_id);
        self.groups[group_idx].inode_bit(offset)
    }

    /// Sets or clears block `block_id`'s allocation bit in the in-memory
    /// group cache (caller is responsible for persisting via
    /// [`Self::flush_block_bitmap`]).
    pub fn set_block_bit(&mut self, block_id: u32, value: bool) {
        let rel = block_id - self.superblock.first_data_block;
        let group_idx = (rel / self.blocks_per_group()) as usize;
        let bit = rel % self.blocks_per_group();
        set_bit(&mut self.groups[group_idx].block_bitmap, bit, value);
    }

    pub fn block_bit_in_group(&self, group_idx: usize, bit: u32) -> bool {
        test_bit(&self.groups[group_idx].block_bitmap, bit)
    }

    /// Writes one group's in-memory block bitmap back to disk.
    pub fn flush_block_bitmap(&mut self, group_idx: usize) -> FsckResult<()> {
        let block_id = self.groups[group_idx].desc.block_bitmap;
        let bytes = self.groups[group_idx].block_bitmap.clone();
        self.write_block(block_id, 1, &bytes)
    }

    /// Whether block `block_id` belongs to filesystem-reserved space for
    /// some group: its superblock/group-descriptor-table copy, or that
    /// group's block bitmap, inode bitmap, or inode table blocks.
    ///
    /// Only group 0 carries the superblock and the primary group descriptor
    /// table in this checker's mounted layout (no sparse-superblock backup
    /// handling — see `DESIGN.md`).
    pub fn is_reserved_block(&self, block_id: u32) -> bool {
        let block_size = self.block_size();
        if block_id == 0 {
            return false;
        }
        if block_id * block_size < SUPERBLOCK_OFFSET as u32 + SUPERBLOCK_SIZE as u32 {
            return true;
        }
        if block_id >= self.gdt_block && block_id < self.gdt_block + self.gdt_blocks {
            return true;
        }
        for g in &self.groups {
            let inode_table_blocks = (self.inodes_per_group() as u64 * INODE_SIZE as u64)
                .div_ceil(block_size as u64) as u32;
            if block_id == g.desc.block_bitmap
                || block_id == g.desc.inode_bitmap
                || (block_id >= g.desc.inode_table && block_id < g.desc.inode_table + inode_table_blocks)
            {
                return true;
            }
        }
        false
    }

    pub fn is_dir(&self, inode_id: u32) -> bool {
        self.get_inode(inode_id).is_dir()
    }

    pub fn is_symlink(&self, inode_id: u32) -> bool {
        self.get_inode(inode_id).is_symlink()
    }

    /// Walks `inode`'s block pointers: 12 direct entries, then
    /// single/double/triple indirection, stopping at the first zero
    /// encountered at any level (direct or within an indirect index block).
    pub fn blocks_of(&mut self, inode: &Inode) -> FsckResult<Vec<u32>> {
        let mut out = Vec::new();

        for &b in &inode.block[..DIRECT_BLOCKS_COUNT] {
            if b == 0 {
                return Ok(out);
            }
            out.push(b);
        }

        let single = inode.block[12];
        if single == 0 {
            return Ok(out);
        }
        self.walk_indirect(single, 1, &mut out)?;

        Ok(out)
    }

    /// Recursively walks an indirect block at `level` (1 = single, 2 =
    /// double, 3 = triple), appending leaf data block ids to `out`. Stops at
    /// the first zero pointer encountered within any index block.
    fn walk_indirect(&mut self, block_id: u32, level: u32, out: &mut Vec<u32>) -> FsckResult<()> {
        let buf = self.read_block(block_id, 1)?;
        for chunk in buf.chunks_exact(4) {
            let ptr = u32::from_le_bytes(chunk.try_into().unwrap());
            if ptr == 0 {
                return Ok(());
            }
            if level == 1 {
                out.push(ptr);
            } else {
                self.walk_indirect(ptr, level - 1, out)?;
            }
        }
        Ok(())
    }

    /// Iterates the directory entries of `dir_inode`'s first data block.
    ///
    /// Per the spec's one-block directory assumption, only the first data
    /// block is consulted; a directory spanning more blocks is out of scope
    /// for the repair engine's rewrite path (see `"warning: more than one
    /// block"` in the repair engine).
    pub fn child_dir_entries(&mut self, dir_inode: u32) -> FsckResult<Vec<DirEntry>> {
        let inode = self.get_inode(dir_inode);
        let blocks = self.blocks_of(&inode)?;
        let Some(&first) = blocks.first() else {
            return Ok(Vec::new());
        };
        let block = self.read_block(first, 1)?;
        Ok(dirent::iter_block(&block).collect())
    }

    /// Convenience wrapper returning just the referenced inode numbers of
    /// `dir_inode`'s children, in entry order.
    pub fn child_inodes(&mut self, dir_inode: u32) -> FsckResult<Vec<u32>> {
        Ok(self
            .child_dir_entries(dir_inode)?
            .into_iter()
            .map(|e| e.inode)
            .collect())
    }

    /// Rewrites `dir_inode`'s first data block with `entries`, laid out
    /// consecutively per `dirent::layout_single_block`.
    pub fn write_dir_entries(&mut self, dir_inode: u32, entries: &[DirEntry]) -> FsckResult<()> {
        let inode = self.get_inode(dir_inode);
        let blocks = self.blocks_of(&inode)?;
        let Some(&first) = blocks.first() else {
            return Err(FsckError::Malformed(format!(
                "directory inode {dir_inode} has no data blocks"
            )));
        };
        let mut block = vec![0u8; self.block_size() as usize];
        dirent::layout_single_block(&mut block, entries)
            .map_err(|msg| FsckError::Malformed(format!("inode {dir_inode}: {msg}")))?;
        self.write_block(first, 1, &block)
    }

    /// Scans root's children for the literal name `lost+found`.
    pub fn lost_found_inode(&mut self) -> FsckResult<u32> {
        for entry in self.child_dir_entries(ROOT_INODE)? {
            if entry.name_is("lost+found") {
                return Ok(entry.inode);
            }
        }
        Err(FsckError::Malformed(
            "no lost+found entry under root".to_string(),
        ))
    }
}

fn read_at(dev: &mut SectorDevice, base_sector: u32, byte_off: u64, dst: &mut [u8]) -> FsckResult<()> {
    let abs_byte = base_sector as u64 * SECTOR_SIZE + byte_off;
    let start_sector = abs_byte / SECTOR_SIZE;
    let sector_off = (abs_byte % SECTOR_SIZE) as usize;
    let sectors_needed = (sector_off + dst.len()).div_ceil(SECTOR_SIZE as usize) as u64;
    let mut buf = vec![0u8; sectors_needed as usize * SECTOR_SIZE as usize];
    dev.read_sectors(start_sector, sectors_needed, &mut buf)?;
    dst.copy_from_slice(&buf[sector_off..sector_off + dst.len()]);
    Ok(())
}

fn read_blocks_raw(
    dev: &mut SectorDevice,
    base_sector: u32,
    block_size: u32,
    block_id: u32,
    count: u32,
    dst: &mut [u8],
) -> FsckResult<()> {
    let byte_off = block_id as u64 * block_size as u64;
    read_at(dev, base_sector, byte_off, &mut dst[..(count * block_size) as usize])
}

fn write_blocks_raw(
    dev: &mut SectorDevice,
    base_sector: u32,
    block_size: u32,
    block_id: u32,
    count: u32,
    src: &[u8],
) -> FsckResult<()> {
    let abs_byte = base_sector as u64 * SECTOR_SIZE + block_id as u64 * block_size as u64;
    let start_sector = abs_byte / SECTOR_SIZE;
    debug_assert_eq!(abs_byte % SECTOR_SIZE, 0);
    let sectors = (count as u64 * block_size as u64) / SECTOR_SIZE;
    dev.write_sectors(start_sector, sectors, src)
}

/// Builds a minimal single-group ext2 image: 1024-byte blocks, one group
/// covering `blocks_count` blocks, root directory at inode 2 with a proper
/// `.`/`..`/`lost+found` layout. Shared by this module's own tests and by
/// the repair-pass tests, which need a ready-mounted filesystem rather than
/// hand-rolling partition/superblock bytes themselves.
#[cfg(test)]
pub(crate) fn build_minimal_image() -> (SectorDevice, u32) {
    const BLOCK_SIZE: u32 = 1024;
    const BLOCKS_COUNT: u32 = 64;
    const INODES_COUNT: u32 = 32;
    const INODES_PER_GROUP: u32 = 32;

    let total_bytes = BLOCKS_COUNT as u64 * BLOCK_SIZE as u64;
    let file = temp_file(total_bytes);
    let mut dev = SectorDevice::new(file);

    // Layout (in blocks, 1024-byte): 0 = boot/unused, 1 = superblock,
    // 2 = group descriptor table, 3 = block bitmap, 4 = inode bitmap,
    // 5 = inode table (1 block fits 32 * 128 = 4096 bytes -> needs 4
    // blocks), so inode table spans 5..9, root data block = 9,
    // lost+found data block = 10.
    let gdt_block = 2u32;
    let block_bitmap_block = 3u32;
    let inode_bitmap_block = 4u32;
    let inode_table_start = 5u32;
    let inode_table_blocks = (INODES_PER_GROUP as u64 * INODE_SIZE as u64)
        .div_ceil(BLOCK_SIZE as u64) as u32;
    let root_data_block = inode_table_start + inode_table_blocks;
    let lf_data_block = root_data_block + 1;

    let mut sb = [0u8; SUPERBLOCK_SIZE];
    sb[0..4].copy_from_slice(&INODES_COUNT.to_le_bytes());
    sb[4..8].copy_from_slice(&BLOCKS_COUNT.to_le_bytes());
    sb[20..24].copy_from_slice(&1u32.to_le_bytes()); // first_data_block
    sb[24..28].copy_from_slice(&0u32.to_le_bytes()); // log_block_size -> 1024
    sb[32..36].copy_from_slice(&BLOCKS_COUNT.to_le_bytes()); // blocks_per_group
    sb[40..44].copy_from_slice(&INODES_PER_GROUP.to_le_bytes());
    sb[56..58].copy_from_slice(&super::superblock::EXT2_MAGIC.to_le_bytes());

    let mut gdt = vec![0u8; BLOCK_SIZE as usize];
    gdt[0..4].copy_from_slice(&block_bitmap_block.to_le_bytes());
    gdt[4..8].copy_from_slice(&inode_bitmap_block.to_le_bytes());
    gdt[8..12].copy_from_slice(&inode_table_start.to_le_bytes());

    let mut block_bitmap = vec![0u8; BLOCK_SIZE as usize];
    // Mark reserved blocks + root/lost+found data blocks allocated.
    // rel = block_id - first_data_block(1).
    for b in 0..=lf_data_block {
        if b == 0 {
            continue;
        }
        set_bit(&mut block_bitmap, b - 1, true);
    }

    let mut inode_bitmap = vec![0u8; BLOCK_SIZE as usize];
    set_bit(&mut inode_bitmap, ROOT_INODE - 1, true);
    set_bit(&mut inode_bitmap, 10, true); // lost+found = inode 11

    let mut inode_table = vec![0u8; (inode_table_blocks * BLOCK_SIZE) as usize];
    let write_inode = |table: &mut [u8], id: u32, inode: &Inode| {
        let off = (id - 1) as usize * INODE_SIZE;
        inode.encode_into(&mut table[off..off + INODE_SIZE]);
    };
    write_inode(
        &mut inode_table,
        ROOT_INODE,
        &Inode {
            mode: super::inode::MODE_DIRECTORY,
            links_count: 3,
            blocks: (BLOCK_SIZE / 512),
            size: BLOCK_SIZE,
            block: {
                let mut b = [0u32; 15];
                b[0] = root_data_block;
                b
            },
        },
    );
    write_inode(
        &mut inode_table,
        11,
        &Inode {
            mode: super::inode::MODE_DIRECTORY,
            links_count: 2,
            blocks: (BLOCK_SIZE / 512),
            size: BLOCK_SIZE,
            block: {
                let mut b = [0u32; 15];
                b[0] = lf_data_block;
                b
            },
        },
    );

    let mut root_block = vec![0u8; BLOCK_SIZE as usize];
    dirent::layout_single_block(
        &mut root_block,
        &[
            DirEntry { inode: ROOT_INODE, rec_len: 0, file_type: dirent::FT_DIR, name: b".".to_vec() },
            DirEntry { inode: ROOT_INODE, rec_len: 0, file_type: dirent::FT_DIR, name: b"..".to_vec() },
            DirEntry { inode: 11, rec_len: 0, file_type: dirent::FT_DIR, name: b"lost+found".to_vec() },
        ],
    )
    .unwrap();

    let mut lf_block = vec![0u8; BLOCK_SIZE as usize];
    dirent::layout_single_block(
        &mut lf_block,
        &[
            DirEntry { inode: 11, rec_len: 0, file_type: dirent::FT_DIR, name: b".".to_vec() },
            DirEntry { inode: ROOT_INODE, rec_len: 0, file_type: dirent::FT_DIR, name: b"..".to_vec() },
        ],
    )
    .unwrap();

    {
        let mut f = dev.test_clone_file();
        crate::testutil::write_at(&mut f, SUPERBLOCK_OFFSET, &sb);
        crate::testutil::write_at(&mut f, gdt_block as u64 * BLOCK_SIZE as u64, &gdt);
        crate::testutil::write_at(&mut f, block_bitmap_block as u64 * BLOCK_SIZE as u64, &block_bitmap);
        crate::testutil::write_at(&mut f, inode_bitmap_block as u64 * BLOCK_SIZE as u64, &inode_bitmap);
        crate::testutil::write_at(&mut f, inode_table_start as u64 * BLOCK_SIZE as u64, &inode_table);
        crate::testutil::write_at(&mut f, root_data_block as u64 * BLOCK_SIZE as u64, &root_block);
        crate::testutil::write_at(&mut f, lf_data_block as u64 * BLOCK_SIZE as u64, &lf_block);
    }

    (dev, 0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mounts_and_reads_root() {
        let (dev, base) = build_minimal_image();
        let mut fs = Ext2Fs::mount(dev, base).unwrap();
        assert_eq!(fs.block_size(), 1024);
        assert!(fs.is_dir(ROOT_INODE));

        let entries = fs.child_dir_entries(ROOT_INODE).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].name_is("."));
        assert!(entries[1].name_is(".."));
        assert!(entries[2].name_is("lost+found"));

        assert_eq!(fs.lost_found_inode().unwrap(), 11);
    }

    #[test]
    fn blocks_of_stops_at_zero() {
        let (dev, base) = build_minimal_image();
        let mut fs = Ext2Fs::mount(dev, base).unwrap();
        let root = fs.get_inode(ROOT_INODE);
        let blocks = fs.blocks_of(&root).unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn put_inode_round_trips_through_disk() {
        let (dev, base) = build_minimal_image();
        let mut fs = Ext2Fs::mount(dev, base).unwrap();
        let mut root = fs.get_inode(ROOT_INODE);
        root.links_count = 5;
        fs.put_inode(ROOT_INODE, &root).unwrap();
        assert_eq!(fs.get_inode(ROOT_INODE).links_count, 5);
    }

    #[test]
    fn reserved_blocks_include_bitmaps_and_inode_table() {
        let (dev, base) = build_minimal_image();
        let fs = Ext2Fs::mount(dev, base).unwrap();
        assert!(fs.is_reserved_block(2)); // group descriptor table
        assert!(fs.is_reserved_block(3)); // block bitmap
        assert!(fs.is_reserved_block(4)); // inode bitmap
        assert!(fs.is_reserved_block(5)); // first inode table block
        assert!(!fs.is_reserved_block(9)); // root data block, not reserved
    }
}
