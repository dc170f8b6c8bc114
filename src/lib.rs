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

//! An in-memory, POSIX-style hierarchical filesystem that lives entirely
//! inside a single caller-supplied memory region.
//!
//! The region may be backed by an anonymous mapping or by a file; this
//! crate only organizes bytes inside it. A file is an inode plus a
//! singly-linked chain of fixed-size blocks addressed by byte offset
//! rather than pointer, so the image is position-independent and can be
//! remapped at a different address between calls. A directory is an
//! inode whose payload is a plain-text `name:offset\n` table.
//!
//! Acquiring the region, enforcing a single-writer lock around each call,
//! and presenting the operations through a kernel VFS shim are the
//! host's job, not this crate's. [`ffi`] is the C ABI the host calls
//! through; [`ops`] is the safe Rust API underneath it.

pub mod block;
pub mod dir;
pub mod errno;
pub mod ffi;
pub mod inode;
pub mod layout;
pub mod offset;
pub mod ops;
pub mod region;

pub use errno::{FsError, FsResult};
pub use ops::{Stat, StatFs};
pub use region::{bind_handle, Handle};

#[cfg(test)]
mod tests {
    use super::*;

    fn new_region(size: usize) -> Vec<u8> {
        vec![0u8; size]
    }

    #[test]
    fn format_then_rebind_is_idempotent() {
        let mut region = new_region(64 * 1024);
        let h1 = bind_handle(region.as_mut_ptr(), region.len()).unwrap();
        let inode_count_1 = h1.inode_count;
        let h2 = bind_handle(region.as_mut_ptr(), region.len()).unwrap();
        assert_eq!(inode_count_1, h2.inode_count);
        assert_eq!(h1.block_segment_offset, h2.block_segment_offset);
    }

    #[test]
    fn region_too_small_is_rejected() {
        let mut region = new_region(16);
        let err = bind_handle(region.as_mut_ptr(), region.len()).unwrap_err();
        assert_eq!(err, FsError::Fault);
    }

    #[test]
    fn full_lifecycle() {
        let mut region = new_region(256 * 1024);
        let h = bind_handle(region.as_mut_ptr(), region.len()).unwrap();

        ops::mkdir(&h, "/docs").unwrap();
        ops::mknod(&h, "/docs/readme.txt").unwrap();
        ops::write(&h, "/docs/readme.txt", b"hello world", 0).unwrap();

        let data = ops::read(&h, "/docs/readme.txt", 5, 0).unwrap();
        assert_eq!(&data, b"hello");

        let names = ops::readdir(&h, "/docs").unwrap();
        assert_eq!(names, vec!["readme.txt".to_string()]);

        ops::rename(&h, "/docs/readme.txt", "/docs/README.md").unwrap();
        assert!(ops::getattr(&h, "/docs/readme.txt", 0, 0).is_err());
        let st = ops::getattr(&h, "/docs/README.md", 0, 0).unwrap();
        assert_eq!(st.size, 11);

        ops::unlink(&h, "/docs/README.md").unwrap();
        ops::rmdir(&h, "/docs").unwrap();
        assert!(ops::getattr(&h, "/docs", 0, 0).is_err());
    }
}
