/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! `fsctl` formats a plain file with the in-memory filesystem core and
//! runs operations against it from the command line. There is no kernel
//! integration here; this is how the image format gets exercised without
//! mounting anything.

use std::env;
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::process::exit;
use std::ptr;

use inmemfs::{bind_handle, ops, FsError};

/// Writes an error to stderr, then exits, in the same convention the
/// rest of this repository's commands use.
fn error(msg: impl std::fmt::Display) -> ! {
    eprintln!("fsctl: error: {msg}");
    exit(1);
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(" fsctl <image> mkdir <path>");
    eprintln!(" fsctl <image> mknod <path>");
    eprintln!(" fsctl <image> rm <path>");
    eprintln!(" fsctl <image> rmdir <path>");
    eprintln!(" fsctl <image> ls <path>");
    eprintln!(" fsctl <image> stat <path>");
    eprintln!(" fsctl <image> cat <path>");
    eprintln!(" fsctl <image> write <path> <text>");
    eprintln!(" fsctl <image> mv <from> <to>");
    eprintln!(" fsctl <image> truncate <path> <size>");
    eprintln!(" fsctl <image> df");
}

fn errno_name(e: FsError) -> &'static str {
    match e {
        FsError::Fault => "EFAULT",
        FsError::NotFound => "ENOENT",
        FsError::Exists => "EEXIST",
        FsError::Invalid => "EINVAL",
        FsError::NotDir => "ENOTDIR",
        FsError::NotEmpty => "ENOTEMPTY",
        FsError::TooBig => "EFBIG",
        FsError::NoSpace => "ENOSPC",
    }
}

/// Default size for an image file that does not already exist.
const DEFAULT_IMAGE_SIZE: u64 = 4 * 1024 * 1024;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        print_usage();
        exit(1);
    }
    let image_path = &args[1];
    let command = args[2].as_str();
    let rest = &args[3..];

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(image_path)
        .unwrap_or_else(|e| error(format!("{image_path}: {e}")));

    let len = file.metadata().unwrap_or_else(|e| error(e)).len();
    let size = if len == 0 { DEFAULT_IMAGE_SIZE } else { len };
    if len == 0 {
        file.set_len(size).unwrap_or_else(|e| error(e));
    }

    let map = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size as usize,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if map == libc::MAP_FAILED {
        error("mmap failed");
    }
    let base = map as *mut u8;

    let handle = bind_handle(base, size as usize).unwrap_or_else(|e| {
        error(format!("failed to bind region: {}", errno_name(e)));
    });

    let result = match command {
        "mkdir" => rest.first().map(|p| ops::mkdir(&handle, p)),
        "mknod" => rest.first().map(|p| ops::mknod(&handle, p)),
        "rm" => rest.first().map(|p| ops::unlink(&handle, p)),
        "rmdir" => rest.first().map(|p| ops::rmdir(&handle, p)),
        "ls" => rest.first().map(|p| {
            ops::readdir(&handle, p).map(|names| {
                for name in names {
                    println!("{name}");
                }
            })
        }),
        "stat" => rest.first().map(|p| {
            ops::getattr(&handle, p, 0, 0).map(|st| {
                println!(
                    "mode={:o} nlink={} size={} mtime={}.{:09}",
                    st.mode, st.nlink, st.size, st.mtime.0, st.mtime.1
                );
            })
        }),
        "cat" => rest.first().map(|p| {
            ops::getattr(&handle, p, 0, 0)
                .and_then(|st| ops::read(&handle, p, st.size as usize, 0))
                .map(|data| {
                    use std::io::Write;
                    std::io::stdout().write_all(&data).ok();
                })
        }),
        "write" => {
            if rest.len() < 2 {
                print_usage();
                exit(1);
            }
            Some(ops::write(&handle, &rest[0], rest[1].as_bytes(), 0).map(|_| ()))
        }
        "mv" => {
            if rest.len() < 2 {
                print_usage();
                exit(1);
            }
            Some(ops::rename(&handle, &rest[0], &rest[1]))
        }
        "truncate" => {
            if rest.len() < 2 {
                print_usage();
                exit(1);
            }
            let size: u64 = rest[1].parse().unwrap_or_else(|_| error("bad size"));
            Some(ops::truncate(&handle, &rest[0], size))
        }
        "df" => Some(ops::statfs(&handle).map(|st| {
            println!(
                "block_size={} total_blocks={} free_blocks={} name_max={}",
                st.block_size, st.total_blocks, st.free_blocks, st.name_max
            );
        })),
        _ => {
            print_usage();
            exit(1);
        }
    };

    match result {
        Some(Ok(())) => {}
        Some(Err(e)) => error(errno_name(e)),
        None => {
            print_usage();
            exit(1);
        }
    }

    unsafe { libc::munmap(map, size as usize) };
}
