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

//! Inode lifecycle: the fixed-size records in the inode segment.

use crate::block;
use crate::errno::{FsError, FsResult};
use crate::layout::{self, INODE_SIZE, NAME_MAX};
use crate::offset::{self, Offset};
use crate::region::{now_timespec, Handle};

/// On-disk inode record.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawInode {
    pub name: [u8; NAME_MAX],
    pub is_dir: u8,
    pub child_count: u32,
    pub payload_size: u64,
    pub atime_sec: i64,
    pub atime_nsec: i32,
    pub mtime_sec: i64,
    pub mtime_nsec: i32,
    /// Offset of the first data block, or `0` if this inode is free.
    pub first_block: u64,
}

impl RawInode {
    pub fn is_free(&self) -> bool {
        self.first_block == 0
    }

    /// The filename, stripped of its null padding.
    pub fn name_str(&self) -> FsResult<&str> {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        std::str::from_utf8(&self.name[..end]).map_err(|_| FsError::Fault)
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0u8; NAME_MAX];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }
}

fn inode_byte_offset(handle: &Handle, index: u32) -> Offset {
    Offset(handle.inode_segment_offset + index as u64 * INODE_SIZE as u64)
}

fn validate_inode_offset(handle: &Handle, off: Offset) -> FsResult<()> {
    offset::validate_in_segment(
        off,
        handle.inode_segment_offset,
        handle.inode_count as u64 * INODE_SIZE as u64,
        INODE_SIZE as u64,
    )?;
    if (off.0 - handle.inode_segment_offset) % INODE_SIZE as u64 != 0 {
        return Err(FsError::Fault);
    }
    Ok(())
}

/// Converts a validated inode offset back into its table index.
pub fn index_from_offset(handle: &Handle, off: Offset) -> FsResult<u32> {
    validate_inode_offset(handle, off)?;
    Ok(((off.0 - handle.inode_segment_offset) / INODE_SIZE as u64) as u32)
}

pub fn offset_of(handle: &Handle, index: u32) -> Offset {
    inode_byte_offset(handle, index)
}

pub fn read(handle: &Handle, index: u32) -> FsResult<RawInode> {
    let off = inode_byte_offset(handle, index);
    validate_inode_offset(handle, off)?;
    Ok(unsafe { layout::read_struct(handle.base, off.0 as usize) })
}

pub fn write(handle: &Handle, index: u32, inode: &RawInode) -> FsResult<()> {
    let off = inode_byte_offset(handle, index);
    validate_inode_offset(handle, off)?;
    unsafe { layout::write_struct(handle.base, off.0 as usize, inode) };
    Ok(())
}

/// Returns the index of the first free inode slot.
pub fn next_free(handle: &Handle) -> FsResult<Option<u32>> {
    for i in 0..handle.inode_count {
        if read(handle, i)?.is_free() {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Allocates an inode slot and an initial empty block chain, stamping both
/// timestamps to now. Does not link it into any directory.
pub fn create(handle: &Handle, name: &str, is_dir: bool) -> FsResult<u32> {
    let idx = next_free(handle)?.ok_or(FsError::NoSpace)?;
    let first = block::rewrite_payload(handle, None, &[])?;
    let now = now_timespec();
    let mut inode = RawInode {
        name: [0u8; NAME_MAX],
        is_dir: is_dir as u8,
        child_count: 0,
        payload_size: 0,
        atime_sec: now.0,
        atime_nsec: now.1,
        mtime_sec: now.0,
        mtime_nsec: now.1,
        first_block: first.0,
    };
    inode.set_name(name);
    write(handle, idx, &inode)?;
    Ok(idx)
}

/// Frees an inode's block chain and marks the slot itself free. Used by
/// `unlink`/`rmdir` and by rollback paths.
pub fn free(handle: &Handle, index: u32) -> FsResult<()> {
    let inode = read(handle, index)?;
    if !inode.is_free() {
        block::clear_chain(handle, Offset(inode.first_block))?;
    }
    write(
        handle,
        index,
        &RawInode {
            name: [0u8; NAME_MAX],
            is_dir: 0,
            child_count: 0,
            payload_size: 0,
            atime_sec: 0,
            atime_nsec: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            first_block: 0,
        },
    )
}
