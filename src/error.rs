//! Error types shared across the sector I/O, partition, ext2 decoding and
//! repair layers.

use std::fmt;
use std::io;

/// An error produced while locating partitions, decoding ext2 metadata, or
/// performing sector I/O.
///
/// `Repairable` conditions (I1/I2/I3 violations from the filesystem spec) are
/// never represented here: they are recorded as diagnostics and fixed in
/// place by the repair engine, not propagated as errors.
#[derive(Debug)]
pub enum FsckError {
    /// Usage violation: bad flag, out-of-range partition index, path too
    /// long.
    BadArgs(String),
    /// A sector read or write did not fully satisfy the requested length, or
    /// the underlying file operation failed.
    Io(io::Error),
    /// An allocation could not be satisfied.
    OutOfMemory,
    /// The requested partition exists but is not an ext2 partition.
    NotExt2,
    /// A decoded on-disk structure violates a hard invariant (bad magic,
    /// corrupt group count, etc).
    Malformed(String),
    /// The partition index does not exist in the partition table or chain.
    NoSuchPartition,
}

impl fmt::Display for FsckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadArgs(msg) => write!(f, "bad arguments: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::NotExt2 => write!(f, "Trying to run fsck on an invalid partition"),
            Self::Malformed(msg) => write!(f, "malformed filesystem: {msg}"),
            Self::NoSuchPartition => write!(f, "no such partition"),
        }
    }
}

impl std::error::Error for FsckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FsckError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type FsckResult<T> = Result<T, FsckError>;

/// Aborts the process with a message on stderr and a non-zero exit code.
///
/// Used at fatal boundaries (I/O failure, malformed superblock) where the
/// teacher's C lineage called `error_at_line` with `__FILE__`/`__LINE__`
/// context; `#[track_caller]` gives us the closest idiomatic equivalent.
#[track_caller]
pub fn fatal(err: &FsckError) -> ! {
    let loc = std::panic::Location::caller();
    eprintln!("e2fsck: {err} ({}:{})", loc.file(), loc.line());
    std::process::exit(1);
}
