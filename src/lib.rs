//! Core library for the offline ext2 consistency checker and repair tool:
//! sector I/O, MBR/extended partition parsing, the ext2 on-disk decoder and
//! in-memory filesystem model, and the four-pass repair engine. `main.rs`
//! is a thin CLI shell over this library, mirroring the teacher's own
//! lib/bin split (`fdisk`'s `fdisk_common` + `fdisk` binary).

pub mod error;
pub mod ext2;
pub mod partition;
pub mod repair;
pub mod sector;

#[cfg(test)]
mod testutil;
