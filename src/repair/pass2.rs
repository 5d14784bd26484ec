//! Pass 2 — inode link-count reconciliation and orphan recovery (invariants
//! I2, I4).
//!
//! Grounded in `original_source/handin/src/check.c`'s reference-counting
//! walk and `lost+found` adoption logic; the original's flat
//! `unsigned int ref[]` global becomes a locally owned `Vec<u32>` scoped to
//! one pass invocation.

use crate::error::FsckResult;
use crate::ext2::dirent::DirEntry;
use crate::ext2::Ext2Fs;

use super::breadth_search_dirs;

/// Runs one reconciliation pass. Returns `true` if at least one orphan was
/// adopted into `lost+found`, signalling the caller to re-run Pass 1 and
/// Pass 2 once more.
pub fn run(fs: &mut Ext2Fs) -> FsckResult<bool> {
    let inodes_count = fs.inodes_count();
    let mut refs = vec![0u32; inodes_count as usize + 1];

    breadth_search_dirs(fs, |fs, dir| {
        for entry in fs.child_dir_entries(dir)? {
            if entry.inode != 0 && (entry.inode as usize) < refs.len() {
                refs[entry.inode as usize] += 1;
            }
        }
        Ok(())
    })?;

    let mut orphans = Vec::new();

    for i in 2..=inodes_count {
        let inode = fs.get_inode(i);
        if !inode.is_live() {
            continue;
        }
        let expected = refs[i as usize];
        if inode.links_count as u32 == expected {
            continue;
        }

        println!("Inode {i} ref count is {}, should be {expected}.", inode.links_count);

        if inode.links_count > 0 && expected == 0 {
            println!("Unconnected directory inode {i}");
            orphans.push(i);
        }

        let mut fixed = inode;
        fixed.links_count = expected as u16;
        fs.put_inode(i, &fixed)?;
    }

    if orphans.is_empty() {
        return Ok(false);
    }

    adopt_orphans(fs, &orphans)?;
    Ok(true)
}

/// Appends one directory entry per orphan into `lost+found`, named by the
/// orphan's decimal inode number.
fn adopt_orphans(fs: &mut Ext2Fs, orphans: &[u32]) -> FsckResult<()> {
    let lost_found = fs.lost_found_inode()?;
    let mut entries = fs.child_dir_entries(lost_found)?;

    for &orphan in orphans {
        let inode = fs.get_inode(orphan);
        entries.push(DirEntry {
            inode: orphan,
            rec_len: 0,
            file_type: inode.dirent_file_type(),
            name: orphan.to_string().into_bytes(),
        });
    }

    fs.write_dir_entries(lost_found, &entries)?;
    Ok(())
}
