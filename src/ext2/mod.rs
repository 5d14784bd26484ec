//! Read-only in-memory ext2 mount: on-disk structure decoders plus the
//! `Ext2Fs` model the repair passes operate against.

pub mod dirent;
pub mod filesystem;
pub mod group;
pub mod inode;
pub mod superblock;

pub use filesystem::Ext2Fs;
