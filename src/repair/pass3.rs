//! Pass 3 — block allocation bitmap reconciliation (invariant I3).
//!
//! Grounded in `original_source/handin/src/check.c`'s scratch-bitmap build
//! and compare loop; the original's single flat cross-group bitmap is
//! replaced with a scratch `Vec<bool>` indexed by absolute block id, then
//! compared group-by-group against each group's own on-disk bitmap buffer
//! (see design notes on aliased bitmap layout in `SPEC_FULL.md`).

use crate::error::FsckResult;
use crate::ext2::inode::ROOT_INODE;
use crate::ext2::Ext2Fs;

use super::breadth_search_dirs;

pub fn run(fs: &mut Ext2Fs) -> FsckResult<()> {
    let blocks_count = fs.blocks_count();
    let mut scratch = vec![false; blocks_count as usize];

    mark_blocks_of(fs, ROOT_INODE, &mut scratch)?;
    breadth_search_dirs(fs, |fs, dir| {
        for child in fs.child_inodes(dir)? {
            if child == 0 || child > fs.inodes_count() {
                continue;
            }
            if fs.is_symlink(child) {
                continue;
            }
            mark_blocks_of(fs, child, &mut scratch)?;
        }
        Ok(())
    })?;

    let first_data_block = fs.superblock.first_data_block;
    let mut dirty_groups = vec![false; fs.group_count() as usize];
    let mut any_diff = false;

    for b in 1..blocks_count {
        let rel = b.checked_sub(first_data_block);
        let wanted = scratch[b as usize];
        let Some(rel) = rel else { continue };

        let group_idx = (rel / fs.blocks_per_group()) as usize;
        let bit = rel % fs.blocks_per_group();
        if group_idx >= fs.group_count() as usize {
            continue;
        }
        let on_disk = fs.block_bit_in_group(group_idx, bit);

        if wanted == on_disk {
            continue;
        }

        if fs.is_reserved_block(b) {
            // Filesystem-reserved space is always force-on in the scratch
            // map; any mismatch here is silently corrected without a
            // diagnostic.
            fs.set_block_bit(b, true);
            dirty_groups[group_idx] = true;
            continue;
        }

        if b >= blocks_count {
            fs.set_block_bit(b, on_disk);
            dirty_groups[group_idx] = true;
            continue;
        }

        if wanted {
            println!("Block bitmap differences +{b}");
        } else {
            println!("Block bitmap differences -{b}");
        }
        fs.set_block_bit(b, wanted);
        dirty_groups[group_idx] = true;
        any_diff = true;
    }

    if any_diff {
        println!("fixed");
    }

    for (idx, dirty) in dirty_groups.into_iter().enumerate() {
        if dirty {
            fs.flush_block_bitmap(idx)?;
        }
    }

    Ok(())
}

fn mark_blocks_of(fs: &mut Ext2Fs, inode_id: u32, scratch: &mut [bool]) -> FsckResult<()> {
    let inode = fs.get_inode(inode_id);
    for b in fs.blocks_of(&inode)? {
        if (b as usize) < scratch.len() {
            scratch[b as usize] = true;
        }
    }
    Ok(())
}
