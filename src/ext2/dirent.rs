//! Directory entry records.
//!
//! Grounded in the kernel's `file/fs/ext2/dirent.rs` / `directory_entry.rs`
//! for the variable-length record shape (`inode`, `rec_len`, `name_len`,
//! `file_type`, `name`), adapted from the kernel's page-backed, zero-copy
//! accessors to plain owned structs decoded out of a `Vec<u8>` block buffer
//! — this checker never needs in-place mutation of entries it isn't about
//! to rewrite wholesale.

/// Fixed header size before the variable-length `name` field.
pub const NAME_OFF: usize = 8;

pub const FT_UNKNOWN: u8 = 0;
pub const FT_REG_FILE: u8 = 1;
pub const FT_DIR: u8 = 2;
pub const FT_CHRDEV: u8 = 3;
pub const FT_BLKDEV: u8 = 4;
pub const FT_FIFO: u8 = 5;
pub const FT_SOCK: u8 = 6;
pub const FT_SYMLINK: u8 = 7;

/// A decoded directory entry, owning its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub file_type: u8,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Minimum physical length required to store this entry:
    /// `round_up_to_4(8 + name_len)`.
    pub fn min_len(&self) -> u16 {
        round_up_to_4(NAME_OFF as u16 + self.name.len() as u16)
    }

    pub fn name_is(&self, s: &str) -> bool {
        self.name == s.as_bytes()
    }
}

/// Rounds `n` up to the next multiple of 4.
pub fn round_up_to_4(n: u16) -> u16 {
    (n + 3) & !3
}

/// Decodes one directory entry at `off` within `block`.
///
/// Returns `None` if `rec_len` is zero (block terminator) or `off` has
/// reached the end of the block.
pub fn decode_at(block: &[u8], off: usize) -> Option<(DirEntry, usize)> {
    if off + NAME_OFF > block.len() {
        return None;
    }
    let inode = u32::from_le_bytes(block[off..off + 4].try_into().unwrap());
    let rec_len = u16::from_le_bytes(block[off + 4..off + 6].try_into().unwrap());
    if rec_len == 0 {
        return None;
    }
    let name_len = block[off + 6] as usize;
    let file_type = block[off + 7];
    let name_end = (off + NAME_OFF + name_len).min(block.len());
    let name = block[off + NAME_OFF..name_end].to_vec();

    Some((
        DirEntry {
            inode,
            rec_len,
            file_type,
            name,
        },
        off + rec_len as usize,
    ))
}

/// Encodes `entry` at `off` within `block`, using `entry.rec_len` as the
/// on-disk record length (the caller is responsible for having set it to
/// cover the correct span, e.g. to fill the rest of the block for the last
/// entry).
pub fn encode_at(block: &mut [u8], off: usize, entry: &DirEntry) {
    block[off..off + 4].copy_from_slice(&entry.inode.to_le_bytes());
    block[off + 4..off + 6].copy_from_slice(&entry.rec_len.to_le_bytes());
    block[off + 6] = entry.name.len() as u8;
    block[off + 7] = entry.file_type;
    let name_end = off + NAME_OFF + entry.name.len();
    block[off + NAME_OFF..name_end].copy_from_slice(&entry.name);
}

/// Iterates the entries of one directory data block, stopping at
/// `offset >= block.len()`, a decoded `rec_len == 0`, or an entry whose
/// `inode == 0`.
pub fn iter_block(block: &[u8]) -> impl Iterator<Item = DirEntry> + '_ {
    let mut off = 0usize;
    std::iter::from_fn(move || {
        if off >= block.len() {
            return None;
        }
        let (entry, next_off) = decode_at(block, off)?;
        if entry.inode == 0 {
            return None;
        }
        off = next_off;
        Some(entry)
    })
}

/// Lays out `entries` consecutively starting at offset 0 of `block`, each
/// sized to its `min_len()`, except the last entry's `rec_len` which is
/// expanded to cover the remainder of the block.
///
/// Returns an error message if the entries (at minimum size) would not fit
/// in one block — callers surface this as the `"warning: more than one
/// block"` diagnostic and leave the directory untouched.
pub fn layout_single_block(block: &mut [u8], entries: &[DirEntry]) -> Result<(), String> {
    let block_len = block.len();
    let total_min: u32 = entries.iter().map(|e| e.min_len() as u32).sum();
    if total_min as usize > block_len || entries.is_empty() {
        return Err(format!(
            "directory entries require {total_min} bytes, block is {block_len}"
        ));
    }

    block.fill(0);
    let mut off = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        let is_last = i + 1 == entries.len();
        let mut e = entry.clone();
        e.rec_len = if is_last {
            (block_len - off) as u16
        } else {
            e.min_len()
        };
        encode_at(block, off, &e);
        off += e.rec_len as usize;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(inode: u32, name: &str, rec_len: u16, file_type: u8) -> DirEntry {
        DirEntry {
            inode,
            rec_len,
            file_type,
            name: name.as_bytes().to_vec(),
        }
    }

    #[test]
    fn round_up() {
        assert_eq!(round_up_to_4(8), 8);
        assert_eq!(round_up_to_4(9), 12);
        assert_eq!(round_up_to_4(12), 12);
        assert_eq!(round_up_to_4(13), 16);
    }

    #[test]
    fn layout_and_iterate_block() {
        let mut block = vec![0u8; 1024];
        let entries = vec![
            entry(2, ".", 0, FT_DIR),
            entry(2, "..", 0, FT_DIR),
            entry(11, "lost+found", 0, FT_DIR),
        ];
        layout_single_block(&mut block, &entries).unwrap();

        let decoded: Vec<_> = iter_block(&block).collect();
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].name_is("."));
        assert_eq!(decoded[0].inode, 2);
        assert!(decoded[1].name_is(".."));
        assert!(decoded[2].name_is("lost+found"));
        assert_eq!(decoded[2].inode, 11);
        // Last entry's rec_len covers the remainder of the block.
        let used: u16 = decoded[..2].iter().map(|e| e.min_len()).sum();
        assert_eq!(decoded[2].rec_len, block.len() as u16 - used);
    }

    #[test]
    fn too_many_entries_reports_error() {
        let mut block = vec![0u8; 16];
        let entries = vec![
            entry(2, "a-long-enough-name", 0, FT_DIR),
            entry(3, "another-long-name", 0, FT_DIR),
        ];
        assert!(layout_single_block(&mut block, &entries).is_err());
    }

    #[test]
    fn iteration_stops_on_zero_inode() {
        let mut block = vec![0u8; 32];
        encode_at(
            &mut block,
            0,
            &DirEntry {
                inode: 5,
                rec_len: 16,
                file_type: FT_REG_FILE,
                name: b"a".to_vec(),
            },
        );
        // Remaining bytes are zero: inode 0 terminates iteration even
        // though rec_len is nonzero-looking garbage from a prior layout.
        let decoded: Vec<_> = iter_block(&block).collect();
        assert_eq!(decoded.len(), 1);
    }
}
