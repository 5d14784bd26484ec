//! Pass 1 — directory self/parent pointer structure (invariant I1).
//!
//! Grounded in `original_source/handin/src/check.c`'s root/child directory
//! pointer repair logic, rewritten against the `VecDeque`-based BFS walker
//! in `repair::breadth_search_dirs` instead of the original's recursive
//! function-pointer visitor.

use crate::error::FsckResult;
use crate::ext2::dirent::{DirEntry, FT_DIR};
use crate::ext2::inode::ROOT_INODE;
use crate::ext2::Ext2Fs;

use super::breadth_search_dirs;

pub fn run(fs: &mut Ext2Fs) -> FsckResult<()> {
    breadth_search_dirs(fs, |fs, dir| {
        let mut entries = fs.child_dir_entries(dir)?;
        if entries.len() < 2 {
            return Ok(());
        }

        let mut changed = false;

        if dir == ROOT_INODE {
            changed |= fix_self(&mut entries, 0, ROOT_INODE, "root self ptr error");
            changed |= fix_parent(&mut entries, 1, ROOT_INODE, "root parent ptr error");
        }

        // Every directory's entries from the third onward that reference a
        // subdirectory get that subdirectory's own `.`/`..` checked — this
        // applies to root's children too, not just non-root directories.
        if entries.len() > 2 {
            let targets: Vec<u32> = entries[2..].iter().map(|e| e.inode).collect();
            for child in targets {
                if child == 0 || child == dir || child > fs.inodes_count() || !fs.is_dir(child) {
                    continue;
                }
                let mut child_entries = fs.child_dir_entries(child)?;
                if child_entries.len() < 2 {
                    continue;
                }

                let mut child_changed = fix_self(
                    &mut child_entries,
                    0,
                    child,
                    &format!("self ptr error for inode {child}"),
                );

                let prior_parent = child_entries[1].inode;
                let parent_changed = fix_parent(
                    &mut child_entries,
                    1,
                    dir,
                    &format!(
                        "parent ptr error for inode {child}, should point to {dir}, found {prior_parent}"
                    ),
                );
                if parent_changed && prior_parent != dir && prior_parent != 0 {
                    detach_stale_child(fs, prior_parent, child)?;
                }
                child_changed |= parent_changed;

                if child_changed {
                    fs.write_dir_entries(child, &child_entries)?;
                    println!("fixed");
                }
            }
        }

        if changed {
            fs.write_dir_entries(dir, &entries)?;
            println!("fixed");
        }
        Ok(())
    })
}

/// Ensures `entries[idx]` is `{inode=expect, name="."}`. If the name isn't
/// `.`, the original record is preserved by pushing it back as a regular
/// entry before the fresh self-entry is written in its slot.
fn fix_self(entries: &mut Vec<DirEntry>, idx: usize, expect: u32, diag: &str) -> bool {
    let entry = &entries[idx];
    if entry.inode == expect && entry.name_is(".") {
        return false;
    }
    println!("{diag}");
    let preserved = entries[idx].clone();
    entries[idx] = DirEntry {
        inode: expect,
        rec_len: 0,
        file_type: FT_DIR,
        name: b".".to_vec(),
    };
    if !preserved.name_is(".") {
        entries.push(preserved);
    }
    true
}

/// Ensures `entries[idx]` is `{inode=expect, name=".."}`, same preservation
/// rule as `fix_self`.
fn fix_parent(entries: &mut Vec<DirEntry>, idx: usize, expect: u32, diag: &str) -> bool {
    let entry = &entries[idx];
    if entry.inode == expect && entry.name_is("..") {
        return false;
    }
    println!("{diag}");
    let preserved = entries[idx].clone();
    entries[idx] = DirEntry {
        inode: expect,
        rec_len: 0,
        file_type: FT_DIR,
        name: b"..".to_vec(),
    };
    if !preserved.name_is("..") {
        entries.push(preserved);
    }
    true
}

/// Removes any entry referencing `child` from `stale_parent`'s directory,
/// since `child`'s real parent was just determined to be someone else.
fn detach_stale_child(fs: &mut Ext2Fs, stale_parent: u32, child: u32) -> FsckResult<()> {
    if stale_parent == 0 || stale_parent > fs.inodes_count() || !fs.is_dir(stale_parent) {
        return Ok(());
    }
    let mut entries = fs.child_dir_entries(stale_parent)?;
    let before = entries.len();
    entries.retain(|e| e.inode != child);
    if entries.len() != before {
        fs.write_dir_entries(stale_parent, &entries)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ext2::dirent::{self, DirEntry};
    use crate::ext2::inode::{Inode, MODE_DIRECTORY};
    use crate::ext2::superblock::{EXT2_MAGIC, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
    use crate::sector::SectorDevice;
    use crate::testutil::{temp_file, write_at};

    const BLOCK_SIZE: u32 = 1024;

    /// Minimal two-directory image: root (inode 2) with a broken self
    /// pointer, no other children. Used to exercise the root-special-case
    /// repair path end to end.
    fn image_with_broken_root_self_ptr() -> (SectorDevice, u32) {
        const BLOCKS_COUNT: u32 = 16;
        const INODES_PER_GROUP: u32 = 16;

        let file = temp_file(BLOCKS_COUNT as u64 * BLOCK_SIZE as u64);
        let mut dev = SectorDevice::new(file);

        let gdt_block = 2u32;
        let block_bitmap_block = 3u32;
        let inode_bitmap_block = 4u32;
        let inode_table_start = 5u32;
        let inode_table_blocks =
            (INODES_PER_GROUP as u64 * 128).div_ceil(BLOCK_SIZE as u64) as u32;
        let root_data_block = inode_table_start + inode_table_blocks;

        let mut sb = [0u8; SUPERBLOCK_SIZE];
        sb[0..4].copy_from_slice(&INODES_PER_GROUP.to_le_bytes());
        sb[4..8].copy_from_slice(&BLOCKS_COUNT.to_le_bytes());
        sb[20..24].copy_from_slice(&1u32.to_le_bytes());
        sb[32..36].copy_from_slice(&BLOCKS_COUNT.to_le_bytes());
        sb[40..44].copy_from_slice(&INODES_PER_GROUP.to_le_bytes());
        sb[56..58].copy_from_slice(&EXT2_MAGIC.to_le_bytes());

        let mut gdt = vec![0u8; BLOCK_SIZE as usize];
        gdt[0..4].copy_from_slice(&block_bitmap_block.to_le_bytes());
        gdt[4..8].copy_from_slice(&inode_bitmap_block.to_le_bytes());
        gdt[8..12].copy_from_slice(&inode_table_start.to_le_bytes());

        let mut inode_table = vec![0u8; (inode_table_blocks * BLOCK_SIZE) as usize];
        let root = Inode {
            mode: MODE_DIRECTORY,
            links_count: 2,
            blocks: BLOCK_SIZE / 512,
            size: BLOCK_SIZE,
            block: {
                let mut b = [0u32; 15];
                b[0] = root_data_block;
                b
            },
        };
        root.encode_into(&mut inode_table[..128]);

        let mut root_block = vec![0u8; BLOCK_SIZE as usize];
        // Broken: first entry is named "x" instead of ".".
        dirent::layout_single_block(
            &mut root_block,
            &[
                DirEntry { inode: 2, rec_len: 0, file_type: FT_DIR, name: b"x".to_vec() },
                DirEntry { inode: 2, rec_len: 0, file_type: FT_DIR, name: b"..".to_vec() },
            ],
        )
        .unwrap();

        let mut f = dev.test_clone_file();
        write_at(&mut f, SUPERBLOCK_OFFSET, &sb);
        write_at(&mut f, gdt_block as u64 * BLOCK_SIZE as u64, &gdt);
        write_at(&mut f, inode_table_start as u64 * BLOCK_SIZE as u64, &inode_table);
        write_at(&mut f, root_data_block as u64 * BLOCK_SIZE as u64, &root_block);

        (dev, 0)
    }

    #[test]
    fn repairs_root_self_pointer_and_preserves_misplaced_entry() {
        let (dev, base) = image_with_broken_root_self_ptr();
        let mut fs = crate::ext2::Ext2Fs::mount(dev, base).unwrap();
        run(&mut fs).unwrap();

        let entries = fs.child_dir_entries(ROOT_INODE).unwrap();
        assert!(entries[0].name_is("."));
        assert_eq!(entries[0].inode, 2);
        assert!(entries[1].name_is(".."));
        assert_eq!(entries[1].inode, 2);
        // The misplaced "x" entry survives as a trailing regular entry.
        assert!(entries.iter().any(|e| e.name_is("x")));
    }
}
