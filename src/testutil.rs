//! Test-only helpers for building throwaway backing files and synthetic
//! images. Not compiled into the shipped binary.

#![cfg(test)]

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU32, Ordering};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Creates a fresh read-write-capable temporary file of the given size,
/// zero-filled, unlinked as soon as the process exits.
pub fn temp_file(size: u64) -> File {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("e2fsck-test-{}-{n}.img", std::process::id()));
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    file.set_len(size).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    // Best-effort cleanup: tests run in a shared temp dir, so remove the
    // backing path immediately. On Unix this leaves the open fd usable.
    let _ = std::fs::remove_file(&path);
    file
}

/// Writes `data` at byte offset `at` in `file`, leaving the cursor
/// unspecified afterwards.
pub fn write_at(file: &mut File, at: u64, data: &[u8]) {
    file.seek(SeekFrom::Start(at)).unwrap();
    file.write_all(data).unwrap();
}
