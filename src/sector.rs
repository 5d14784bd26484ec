//! Sector-granular positioned read/write on the raw image file.
//!
//! Grounded in the teacher's `fdisk`/`mkfs` tools, which both open the
//! target device with `std::fs::File` and seek to a byte offset before each
//! access (`fdisk/src/partition.rs`, `mkfs/src/ext2.rs`). This module
//! generalizes that pattern into a small positioned-I/O wrapper: no
//! buffering, no caching — the filesystem model above it owns the only
//! cache (§4.4 of the design).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::FsckResult;

/// Size in bytes of one sector. Fixed per the image format: the source
/// format never varies this.
pub const SECTOR_SIZE: u64 = 512;

/// A positioned sector-granular view over the image file.
///
/// Short reads/writes are fatal: `read_exact`/`write_all` surface them as
/// `io::Error` rather than silently truncating, matching the spec's "must
/// fully satisfy the requested length" contract.
pub struct SectorDevice {
    file: File,
}

impl SectorDevice {
    /// Wraps an already-open, read-write image file handle.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Returns a duplicate handle to the backing file, for tests that need
    /// to seed fixture bytes via a plain `std::fs::File` API.
    #[cfg(test)]
    pub fn test_clone_file(&self) -> File {
        self.file.try_clone().unwrap()
    }

    /// Reads `count` sectors starting at absolute sector `start` into `dst`.
    ///
    /// `dst` must be exactly `count * SECTOR_SIZE` bytes.
    pub fn read_sectors(&mut self, start: u64, count: u64, dst: &mut [u8]) -> FsckResult<()> {
        debug_assert_eq!(dst.len() as u64, count * SECTOR_SIZE);
        self.file.seek(SeekFrom::Start(start * SECTOR_SIZE))?;
        self.file.read_exact(dst)?;
        Ok(())
    }

    /// Writes `count` sectors starting at absolute sector `start` from `src`.
    ///
    /// `src` must be exactly `count * SECTOR_SIZE` bytes.
    pub fn write_sectors(&mut self, start: u64, count: u64, src: &[u8]) -> FsckResult<()> {
        debug_assert_eq!(src.len() as u64, count * SECTOR_SIZE);
        self.file.seek(SeekFrom::Start(start * SECTOR_SIZE))?;
        self.file.write_all(src)?;
        Ok(())
    }
}
