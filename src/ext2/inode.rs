//! The ext2 inode record and file-type derivation.
//!
//! Layout grounded in `mkfs/src/ext2.rs`'s `INode` struct; indirection-walk
//! semantics grounded in the kernel's `file/fs/ext2/inode.rs`
//! (`indirections_offsets`), simplified here to the checker's actual need:
//! an ordered list of data block ids rather than a random-access offset
//! lookup.

pub const INODE_SIZE: usize = 128;
pub const DIRECT_BLOCKS_COUNT: usize = 12;

pub const MODE_TYPE_MASK: u16 = 0xf000;
pub const MODE_FIFO: u16 = 0x1000;
pub const MODE_CHAR_DEVICE: u16 = 0x2000;
pub const MODE_DIRECTORY: u16 = 0x4000;
pub const MODE_BLOCK_DEVICE: u16 = 0x6000;
pub const MODE_REGULAR: u16 = 0x8000;
pub const MODE_SYMLINK: u16 = 0xa000;
pub const MODE_SOCKET: u16 = 0xc000;

/// The root directory's inode number.
pub const ROOT_INODE: u32 = 2;

/// A decoded ext2 inode.
#[derive(Debug, Clone, Copy)]
pub struct Inode {
    pub mode: u16,
    pub links_count: u16,
    pub blocks: u32,
    pub size: u32,
    /// Direct (0..12), single-indirect (12), double-indirect (13),
    /// triple-indirect (14) block pointers. `0` means unused.
    pub block: [u32; 15],
}

impl Inode {
    pub fn decode(buf: &[u8]) -> Self {
        let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let u16_at = |off: usize| u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());

        let mut block = [0u32; 15];
        for (i, slot) in block.iter_mut().enumerate() {
            *slot = u32_at(40 + i * 4);
        }

        Self {
            mode: u16_at(0),
            links_count: u16_at(26),
            blocks: u32_at(28),
            size: u32_at(4),
            block,
        }
    }

    /// Encodes this inode's fields back into a 128-byte on-disk record,
    /// starting from the existing bytes so fields this checker does not
    /// model (timestamps, UID/GID, ACL, etc.) survive unmodified.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.mode.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[26..28].copy_from_slice(&self.links_count.to_le_bytes());
        buf[28..32].copy_from_slice(&self.blocks.to_le_bytes());
        for (i, b) in self.block.iter().enumerate() {
            buf[40 + i * 4..44 + i * 4].copy_from_slice(&b.to_le_bytes());
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_DIRECTORY
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_SYMLINK
    }

    /// Whether this inode is live (has a non-zero file-type in `mode`).
    pub fn is_live(&self) -> bool {
        self.mode & MODE_TYPE_MASK != 0
    }

    /// The directory-entry `file_type` byte this inode's mode implies.
    ///
    /// Order matches the spec: socket, symlink, regular, block device,
    /// directory, char device, FIFO, else unknown.
    pub fn dirent_file_type(&self) -> u8 {
        match self.mode & MODE_TYPE_MASK {
            MODE_SOCKET => super::dirent::FT_SOCK,
            MODE_SYMLINK => super::dirent::FT_SYMLINK,
            MODE_REGULAR => super::dirent::FT_REG_FILE,
            MODE_BLOCK_DEVICE => super::dirent::FT_BLKDEV,
            MODE_DIRECTORY => super::dirent::FT_DIR,
            MODE_CHAR_DEVICE => super::dirent::FT_CHRDEV,
            MODE_FIFO => super::dirent::FT_FIFO,
            _ => super::dirent::FT_UNKNOWN,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_encode_round_trip() {
        let mut buf = [0u8; INODE_SIZE];
        buf[0..2].copy_from_slice(&MODE_DIRECTORY.to_le_bytes());
        buf[26..28].copy_from_slice(&3u16.to_le_bytes());
        buf[40..44].copy_from_slice(&55u32.to_le_bytes());

        let inode = Inode::decode(&buf);
        assert!(inode.is_dir());
        assert_eq!(inode.links_count, 3);
        assert_eq!(inode.block[0], 55);

        let mut out = buf;
        let mut changed = inode;
        changed.links_count = 9;
        changed.encode_into(&mut out);
        let redecoded = Inode::decode(&out);
        assert_eq!(redecoded.links_count, 9);
        assert_eq!(redecoded.block[0], 55);
    }

    #[test]
    fn file_type_derivation() {
        let mk = |mode| Inode {
            mode,
            links_count: 0,
            blocks: 0,
            size: 0,
            block: [0; 15],
        };
        assert_eq!(mk(MODE_SOCKET).dirent_file_type(), super::super::dirent::FT_SOCK);
        assert_eq!(mk(MODE_SYMLINK).dirent_file_type(), super::super::dirent::FT_SYMLINK);
        assert_eq!(mk(MODE_REGULAR).dirent_file_type(), super::super::dirent::FT_REG_FILE);
        assert_eq!(mk(MODE_DIRECTORY).dirent_file_type(), super::super::dirent::FT_DIR);
        assert_eq!(mk(0).dirent_file_type(), super::super::dirent::FT_UNKNOWN);
    }
}
