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

//! Image & Handle layer: formatting and recognizing a raw memory region.

use std::ptr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::block::RawBlockHeader;
use crate::errno::{FsError, FsResult};
use crate::inode::RawInode;
use crate::layout::{
    self, BLOCKS_PER_INODE, BLOCK_SIZE, HEADER_SIZE, INODE_SIZE, MAGIC, MIN_REGION_SIZE,
};
use crate::offset::Offset;

/// On-disk region header, stored at offset `0` of every formatted region.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct RegionHeader {
    pub magic: u32,
    /// Reserved padding, kept for host-native alignment of the fields that
    /// follow; unused by this implementation.
    _reserved: u32,
    pub usable_size: u64,
    pub inode_count: u32,
    pub block_count: u32,
    pub inode_segment_offset: u64,
    pub block_segment_offset: u64,
}

/// A transient, typed view over a region, bound for the duration of one
/// core operation. It carries no state beyond what was read from the
/// header at bind time, so binding is idempotent: calling it twice in a
/// row on the same region yields identical handles.
#[derive(Debug)]
pub struct Handle {
    pub base: *mut u8,
    pub region_size: usize,
    pub usable_size: u64,
    pub inode_count: u32,
    pub block_count: u32,
    pub inode_segment_offset: u64,
    pub block_segment_offset: u64,
}

impl Handle {
    fn from_header(base: *mut u8, region_size: usize, hdr: &RegionHeader) -> FsResult<Self> {
        let inode_count = hdr.inode_count;
        let block_count = hdr.block_count;
        let inode_segment_offset = hdr.inode_segment_offset;
        let block_segment_offset = hdr.block_segment_offset;
        let usable_size = hdr.usable_size;

        let inode_segment_len = inode_count as u64 * INODE_SIZE as u64;
        let block_segment_len = block_count as u64 * BLOCK_SIZE as u64;
        let region_end = HEADER_SIZE as u64 + usable_size;

        let inodes_ok = inode_segment_offset == HEADER_SIZE as u64
            && inode_segment_offset + inode_segment_len <= region_end;
        let blocks_ok = block_segment_offset == inode_segment_offset + inode_segment_len
            && block_segment_offset + block_segment_len <= region_end;
        if !inodes_ok || !blocks_ok || region_end > region_size as u64 {
            return Err(FsError::Fault);
        }

        Ok(Handle {
            base,
            region_size,
            usable_size,
            inode_count,
            block_count,
            inode_segment_offset,
            block_segment_offset,
        })
    }

    /// Offset of the root inode's record. The root is always inode index 0.
    pub fn root_inode_offset(&self) -> Offset {
        Offset(self.inode_segment_offset)
    }
}

/// Binds a handle to `(base, size)`, formatting the region first if it does
/// not already carry the magic number.
pub fn bind_handle(base: *mut u8, size: usize) -> FsResult<Handle> {
    if base.is_null() || size < MIN_REGION_SIZE {
        return Err(FsError::Fault);
    }
    let magic: u32 = unsafe { layout::read_struct(base, 0) };
    if magic == MAGIC {
        let hdr: RegionHeader = unsafe { layout::read_struct(base, 0) };
        Handle::from_header(base, size, &hdr)
    } else {
        format(base, size)
    }
}

/// Formats a raw region: zeroes it, writes the header, and creates an
/// empty root directory occupying inode 0 / block 0.
fn format(base: *mut u8, size: usize) -> FsResult<Handle> {
    unsafe { ptr::write_bytes(base, 0, size) };

    let usable_size = (size - HEADER_SIZE) as u64;
    let (inode_count, block_count) = size_segments(usable_size);
    if inode_count == 0 || block_count < 2 {
        return Err(FsError::Fault);
    }

    let inode_segment_offset = HEADER_SIZE as u64;
    let block_segment_offset = inode_segment_offset + inode_count as u64 * INODE_SIZE as u64;

    let header = RegionHeader {
        magic: MAGIC,
        _reserved: 0,
        usable_size,
        inode_count,
        block_count,
        inode_segment_offset,
        block_segment_offset,
    };
    unsafe { layout::write_struct(base, 0, &header) };

    let handle = Handle {
        base,
        region_size: size,
        usable_size,
        inode_count,
        block_count,
        inode_segment_offset,
        block_segment_offset,
    };

    init_root(&handle)?;
    Ok(handle)
}

/// Determines how many inodes and blocks fit in `usable_size` bytes, given
/// the `BLOCKS_PER_INODE` ratio. Uses the full per-block footprint
/// (header + payload), not just the payload capacity, so that the
/// resulting inode and block segments can never overflow the region —
/// a stricter bound than the capacity-only formula the image format was
/// distilled from, chosen because the looser formula can undercount the
/// real per-block cost and overrun the region.
fn size_segments(usable_size: u64) -> (u32, u32) {
    let mut inodes: u64 = 0;
    let mut blocks: u64 = 0;
    loop {
        let next_inodes = inodes + 1;
        let next_blocks = blocks + BLOCKS_PER_INODE;
        let footprint = next_blocks * BLOCK_SIZE as u64 + next_inodes * INODE_SIZE as u64;
        if footprint > usable_size {
            break;
        }
        inodes = next_inodes;
        blocks = next_blocks;
    }
    (inodes as u32, blocks as u32)
}

fn init_root(handle: &Handle) -> FsResult<()> {
    let now = now_timespec();
    let block0 = Offset(handle.block_segment_offset);

    let block_header = RawBlockHeader {
        in_use: 1,
        payload_used: 0,
        next_offset: 0,
    };
    unsafe { layout::write_struct(handle.base, block0.0 as usize, &block_header) };

    let root = RawInode {
        name: [0u8; crate::layout::NAME_MAX],
        is_dir: 1,
        child_count: 0,
        payload_size: 0,
        atime_sec: now.0,
        atime_nsec: now.1,
        mtime_sec: now.0,
        mtime_nsec: now.1,
        first_block: block0.0,
    };
    unsafe { layout::write_struct(handle.base, handle.inode_segment_offset as usize, &root) };
    Ok(())
}

/// Returns `(seconds, nanoseconds)` since the Unix epoch for the current
/// wall-clock time, used to stamp inode timestamps.
pub fn now_timespec() -> (i64, i32) {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (d.as_secs() as i64, d.subsec_nanos() as i32)
}
