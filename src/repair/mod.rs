//! The four-pass consistency checker and repair engine.
//!
//! Grounded in `original_source/handin/src/check.c`'s `do_check` orchestrator
//! for the overall pass ordering and header-printing discipline, reworked
//! per `SPEC_FULL.md`'s design notes: the original's `extern int device` /
//! global pass counter becomes an explicit `RepairEngine` struct field, and
//! the function-pointer BFS visitor becomes a `VecDeque`-based traversal
//! returning owned `Vec<u32>`s.

mod pass1;
mod pass2;
mod pass3;

use std::collections::VecDeque;

use crate::error::FsckResult;
use crate::ext2::inode::ROOT_INODE;
use crate::ext2::Ext2Fs;

/// Drives the three structural passes against one mounted filesystem,
/// tracking the running pass counter and which pass headers have already
/// been printed (recursive re-entries from Pass 2's orphan adoption stay
/// quiet on the second run).
pub struct RepairEngine<'a> {
    pub fs: &'a mut Ext2Fs,
    pub pass_number: u32,
    headers_printed: [bool; 3],
}

impl<'a> RepairEngine<'a> {
    pub fn new(fs: &'a mut Ext2Fs) -> Self {
        Self {
            fs,
            pass_number: 0,
            headers_printed: [false; 3],
        }
    }

    /// Runs Pass 1, Pass 2, Pass 3 in order. This is the entry point the
    /// driver calls once per partition.
    pub fn run(&mut self) -> FsckResult<()> {
        self.run_pass1()?;
        self.run_pass2()?;
        self.run_pass3()?;
        Ok(())
    }

    fn begin_pass(&mut self, idx: usize, title: &str) {
        self.pass_number += 1;
        if !self.headers_printed[idx] {
            println!("Pass {}: {title}", self.pass_number);
            self.headers_printed[idx] = true;
        }
    }

    fn run_pass1(&mut self) -> FsckResult<()> {
        self.begin_pass(0, "Checking directory structure");
        pass1::run(self.fs)
    }

    fn run_pass2(&mut self) -> FsckResult<bool> {
        self.begin_pass(1, "Checking directory connectivity");
        let adopted = pass2::run(self.fs)?;
        if adopted {
            // Orphan adoption added new lost+found entries; re-validate
            // directory structure and connectivity before Pass 3 sees them.
            self.run_pass1()?;
            pass2::run(self.fs)?;
        }
        Ok(adopted)
    }

    fn run_pass3(&mut self) -> FsckResult<()> {
        self.begin_pass(2, "Checking block bitmaps");
        pass3::run(self.fs)
    }
}

/// Breadth-first traversal over directory inodes reachable from the root,
/// calling `visit` once per directory in visitation order. Mirrors
/// `original_source/handin/src/check.c`'s `breadth_search`, but as a typed
/// closure-taking walker over a `VecDeque` instead of an untyped function
/// pointer plus `void*` context.
pub fn breadth_search_dirs(fs: &mut Ext2Fs, mut visit: impl FnMut(&mut Ext2Fs, u32) -> FsckResult<()>) -> FsckResult<()> {
    let mut queue = VecDeque::new();
    let mut seen = vec![false; fs.inodes_count() as usize + 1];
    queue.push_back(ROOT_INODE);
    seen[ROOT_INODE as usize] = true;

    while let Some(dir) = queue.pop_front() {
        visit(fs, dir)?;
        for child in fs.child_inodes(dir)? {
            if child == 0 || child as usize >= seen.len() {
                continue;
            }
            if child == dir {
                continue;
            }
            if fs.is_dir(child) && !seen[child as usize] {
                seen[child as usize] = true;
                queue.push_back(child);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ext2::dirent::{DirEntry, FT_DIR};
    use crate::ext2::inode::{Inode, MODE_DIRECTORY};

    /// End-to-end: two directories A and B both contain an entry for
    /// directory C, but C's on-disk `..` still points at A. Running the
    /// full engine should make C's parent pointer match whichever of A/B
    /// is reached first in BFS order (A, since it is linked into root
    /// first) and remove C's entry from B.
    #[test]
    fn mis_linked_child_is_claimed_by_its_traversed_parent() {
        let (dev, base) = crate::ext2::filesystem::build_minimal_image();
        let mut fs = Ext2Fs::mount(dev, base).unwrap();

        let (a, b, c) = (12u32, 13u32, 14u32);
        for id in [a, b, c] {
            fs.put_inode(
                id,
                &Inode {
                    mode: MODE_DIRECTORY,
                    links_count: 2,
                    blocks: 2,
                    size: fs.block_size(),
                    block: [0u32; 15],
                },
            )
            .unwrap();
        }

        // Root gains entries for A and B.
        let mut root_entries = fs.child_dir_entries(ROOT_INODE).unwrap();
        root_entries.push(DirEntry { inode: a, rec_len: 0, file_type: FT_DIR, name: b"a".to_vec() });
        root_entries.push(DirEntry { inode: b, rec_len: 0, file_type: FT_DIR, name: b"b".to_vec() });
        fs.write_dir_entries(ROOT_INODE, &root_entries).unwrap();

        // A and B both claim C as a child; A's data block must exist for
        // write_dir_entries to target it, so give A and B real data blocks.
        let free_block_a = 30u32;
        let free_block_b = 31u32;
        for (dir_id, block_id) in [(a, free_block_a), (b, free_block_b)] {
            let mut inode = fs.get_inode(dir_id);
            inode.block[0] = block_id;
            fs.put_inode(dir_id, &inode).unwrap();
        }

        fs.write_dir_entries(
            a,
            &[
                DirEntry { inode: a, rec_len: 0, file_type: FT_DIR, name: b".".to_vec() },
                DirEntry { inode: ROOT_INODE, rec_len: 0, file_type: FT_DIR, name: b"..".to_vec() },
                DirEntry { inode: c, rec_len: 0, file_type: FT_DIR, name: b"c".to_vec() },
            ],
        )
        .unwrap();
        fs.write_dir_entries(
            b,
            &[
                DirEntry { inode: b, rec_len: 0, file_type: FT_DIR, name: b".".to_vec() },
                DirEntry { inode: ROOT_INODE, rec_len: 0, file_type: FT_DIR, name: b"..".to_vec() },
                DirEntry { inode: c, rec_len: 0, file_type: FT_DIR, name: b"c".to_vec() },
            ],
        )
        .unwrap();

        // C's own data block: self ptr correct, parent ptr wrongly points
        // at A already (consistent with A having created it), but we drive
        // the interesting case by giving C a *stale* parent pointer of A
        // while it is B's child-list insertion order that reaches C first.
        let c_block = 32u32;
        let mut c_inode = fs.get_inode(c);
        c_inode.block[0] = c_block;
        fs.put_inode(c, &c_inode).unwrap();
        fs.write_dir_entries(
            c,
            &[
                DirEntry { inode: c, rec_len: 0, file_type: FT_DIR, name: b".".to_vec() },
                DirEntry { inode: a, rec_len: 0, file_type: FT_DIR, name: b"..".to_vec() },
            ],
        )
        .unwrap();

        let mut engine = RepairEngine::new(&mut fs);
        engine.run().unwrap();

        // BFS reaches A before B (root's entries list A first), so Pass 1
        // confirms A as the real parent: no rewrite needed since C already
        // points at A, and B's stale "c" entry is removed.
        let b_entries = fs.child_dir_entries(b).unwrap();
        assert!(!b_entries.iter().any(|e| e.name_is("c")));
        let c_entries = fs.child_dir_entries(c).unwrap();
        assert_eq!(c_entries[1].inode, a);
    }

    /// Running the engine twice back to back on an already-clean image
    /// reports no changes on the second run (property P4).
    #[test]
    fn second_run_on_clean_image_is_a_no_op() {
        let (dev, base) = crate::ext2::filesystem::build_minimal_image();
        let mut fs = Ext2Fs::mount(dev, base).unwrap();

        {
            let mut engine = RepairEngine::new(&mut fs);
            engine.run().unwrap();
        }
        let before = fs.child_dir_entries(ROOT_INODE).unwrap();

        {
            let mut engine = RepairEngine::new(&mut fs);
            engine.run().unwrap();
        }
        let after = fs.child_dir_entries(ROOT_INODE).unwrap();

        assert_eq!(before, after);
    }
}
