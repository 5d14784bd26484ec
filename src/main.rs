//! Command-line front end: selects the disk image, partition, and mode
//! (print partition info vs. check/repair), then dispatches into
//! `e2fsck_core`.
//!
//! Grounded in the teacher's `mount`/`mkfs`/`fdisk` `main.rs` files: a plain
//! `Args` struct populated by a hand-rolled loop over `env::args()`,
//! `eprintln!` + `exit(1)` for usage errors, no external argument-parsing
//! crate.

use std::fs::OpenOptions;
use std::process::exit;

use e2fsck_core::error::{fatal, FsckError, FsckResult};
use e2fsck_core::ext2::Ext2Fs;
use e2fsck_core::partition::{self, Partition};
use e2fsck_core::repair::RepairEngine;
use e2fsck_core::sector::SectorDevice;

const MAX_PATH_LEN: usize = 255;

struct Args {
    image: String,
    print_partition: Option<u32>,
    fsck_partition: Option<u32>,
}

fn usage() -> ! {
    eprintln!("usage: e2fsck -i <image> [-p <partition>] [-f <partition>]");
    std::process::exit(1);
}

fn parse_args() -> FsckResult<Args> {
    let mut image = None;
    let mut print_partition = None;
    let mut fsck_partition = None;

    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        match flag.as_str() {
            "-i" => {
                let path = it.next().ok_or_else(|| FsckError::BadArgs("-i requires a path".into()))?;
                if path.len() > MAX_PATH_LEN {
                    return Err(FsckError::BadArgs(format!(
                        "image path exceeds {MAX_PATH_LEN} characters"
                    )));
                }
                image = Some(path);
            }
            "-p" => {
                let n = it.next().ok_or_else(|| FsckError::BadArgs("-p requires a partition number".into()))?;
                let n: u32 = n.parse().map_err(|_| FsckError::BadArgs(format!("invalid partition number: {n}")))?;
                print_partition = Some(n);
            }
            "-f" => {
                let n = it.next().ok_or_else(|| FsckError::BadArgs("-f requires a partition number".into()))?;
                let n: u32 = n.parse().map_err(|_| FsckError::BadArgs(format!("invalid partition number: {n}")))?;
                fsck_partition = Some(n);
            }
            other => return Err(FsckError::BadArgs(format!("unrecognized argument: {other}"))),
        }
    }

    let image = image.ok_or_else(|| FsckError::BadArgs("-i <image> is required".into()))?;
    if print_partition.is_none() && fsck_partition.is_none() {
        usage();
    }

    Ok(Args {
        image,
        print_partition,
        fsck_partition,
    })
}

fn open_device(path: &str) -> FsckResult<SectorDevice> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    Ok(SectorDevice::new(file))
}

/// Prints partition `n`'s info as `0x<sys_ind> <absolute-start-sector>
/// <sector-count>`, or `-1` if `n` is out of range. An unused primary slot
/// (all-zero entry) is a legitimate on-disk state, not an error, and is
/// printed like any other entry.
fn print_partition_info(dev: &mut SectorDevice, n: u32) {
    match partition::locate(dev, n) {
        Ok((p, base)) => println!("0x{:02x} {} {}", p.sys_ind, base + p.start_sector, p.sector_count),
        Err(_) => println!("-1"),
    }
}

/// Runs the repair engine on one ext2 partition, fully. Returns `NotExt2`
/// if the partition is not ext2.
fn fsck_one(dev: SectorDevice, partition: &Partition, base: u32) -> FsckResult<()> {
    if !partition.is_ext2() {
        return Err(FsckError::NotExt2);
    }
    let mut fs = Ext2Fs::mount(dev, base)?;
    let mut engine = RepairEngine::new(&mut fs);
    engine.run()
}

fn run_fsck(dev: &mut SectorDevice, image_path: &str, n: u32) -> FsckResult<()> {
    if n == 0 {
        for (_, p, base) in partition::enumerate_ext2(dev)? {
            let dev = open_device(image_path)?;
            fsck_one(dev, &p, base)?;
        }
        return Ok(());
    }

    let (p, base) = partition::locate(dev, n)?;
    let fresh = open_device(image_path)?;
    fsck_one(fresh, &p, base)
}

fn main() {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => fatal(&e),
    };

    let mut dev = match open_device(&args.image) {
        Ok(d) => d,
        Err(e) => fatal(&e),
    };

    if let Some(n) = args.print_partition {
        print_partition_info(&mut dev, n);
    }

    if let Some(n) = args.fsck_partition {
        if let Err(e) = run_fsck(&mut dev, &args.image, n) {
            match e {
                FsckError::NotExt2 => {
                    eprintln!("{e}");
                    exit(1);
                }
                other => fatal(&other),
            }
        }
    }
}
