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

//! Block pool: fixed-size data blocks, linked into per-file chains.

use crate::errno::{FsError, FsResult};
use crate::layout::{self, BLOCK_SIZE, PAYLOAD_CAPACITY};
use crate::offset::{self, Offset};
use crate::region::Handle;

/// On-disk block header. The payload area of `PAYLOAD_CAPACITY` bytes
/// follows immediately after this in the block's storage.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawBlockHeader {
    pub in_use: u8,
    pub payload_used: u32,
    pub next_offset: u64,
}

fn block_offset(handle: &Handle, index: u32) -> Offset {
    Offset(handle.block_segment_offset + index as u64 * BLOCK_SIZE as u64)
}

fn validate_block_offset(handle: &Handle, off: Offset) -> FsResult<()> {
    offset::validate_in_segment(
        off,
        handle.block_segment_offset,
        handle.block_count as u64 * BLOCK_SIZE as u64,
        BLOCK_SIZE as u64,
    )?;
    if (off.0 - handle.block_segment_offset) % BLOCK_SIZE as u64 != 0 {
        return Err(FsError::Fault);
    }
    Ok(())
}

fn read_header(handle: &Handle, off: Offset) -> FsResult<RawBlockHeader> {
    validate_block_offset(handle, off)?;
    Ok(unsafe { layout::read_struct(handle.base, off.0 as usize) })
}

fn write_header(handle: &Handle, off: Offset, hdr: &RawBlockHeader) -> FsResult<()> {
    validate_block_offset(handle, off)?;
    unsafe { layout::write_struct(handle.base, off.0 as usize, hdr) };
    Ok(())
}

fn payload_ptr(handle: &Handle, off: Offset) -> *mut u8 {
    unsafe {
        offset::offset_to_ptr(handle.base, off).add(std::mem::size_of::<RawBlockHeader>())
    }
}

/// Returns the lowest-indexed free block, or `None` if the pool is full.
fn next_free_block(handle: &Handle) -> FsResult<Option<Offset>> {
    for i in 0..handle.block_count {
        let off = block_offset(handle, i);
        let hdr = read_header(handle, off)?;
        if hdr.in_use == 0 {
            return Ok(Some(off));
        }
    }
    Ok(None)
}

/// Counts blocks whose in-use flag is clear. This agrees with the
/// canonical "total minus chain lengths" definition whenever the chain
/// invariants hold, since every in-use block belongs to exactly one
/// reachable chain.
pub fn count_free_blocks(handle: &Handle) -> FsResult<u32> {
    let mut free = 0;
    for i in 0..handle.block_count {
        let hdr = read_header(handle, block_offset(handle, i))?;
        if hdr.in_use == 0 {
            free += 1;
        }
    }
    Ok(free)
}

/// Walks a block chain starting at `first`, concatenating payload slices
/// in order. `first` must be non-null.
pub fn read_chain(handle: &Handle, first: Offset) -> FsResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut cur = first;
    loop {
        let hdr = read_header(handle, cur)?;
        if hdr.in_use == 0 {
            return Err(FsError::Fault);
        }
        let used = hdr.payload_used as usize;
        if used > PAYLOAD_CAPACITY {
            return Err(FsError::Fault);
        }
        let ptr = payload_ptr(handle, cur);
        let slice = unsafe { std::slice::from_raw_parts(ptr, used) };
        data.extend_from_slice(slice);
        if hdr.next_offset == 0 {
            break;
        }
        cur = Offset(hdr.next_offset);
    }
    Ok(data)
}

/// Returns the number of blocks in the chain starting at `first`, or `0`
/// if `first` is null.
pub fn chain_len(handle: &Handle, first: Offset) -> FsResult<u32> {
    if first.is_null() {
        return Ok(0);
    }
    let mut n = 0u32;
    let mut cur = first;
    loop {
        let hdr = read_header(handle, cur)?;
        n += 1;
        if hdr.next_offset == 0 {
            break;
        }
        cur = Offset(hdr.next_offset);
    }
    Ok(n)
}

/// Zeroes and frees every block in the chain starting at `first`. A no-op
/// if `first` is null.
pub fn clear_chain(handle: &Handle, first: Offset) -> FsResult<()> {
    if first.is_null() {
        return Ok(());
    }
    let mut cur = first;
    loop {
        let hdr = read_header(handle, cur)?;
        let next = hdr.next_offset;
        write_header(
            handle,
            cur,
            &RawBlockHeader {
                in_use: 0,
                payload_used: 0,
                next_offset: 0,
            },
        )?;
        let ptr = payload_ptr(handle, cur);
        unsafe { std::ptr::write_bytes(ptr, 0, PAYLOAD_CAPACITY) };
        if next == 0 {
            break;
        }
        cur = Offset(next);
    }
    Ok(())
}

/// Allocates a fresh chain holding `data` and returns its first block's
/// offset. The chain always holds at least one block, even for empty
/// data, matching the rule that a live inode's first-block offset is
/// never null. Does not touch any blocks outside the ones it allocates.
fn write_payload(handle: &Handle, data: &[u8]) -> FsResult<Offset> {
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![&[][..]]
    } else {
        data.chunks(PAYLOAD_CAPACITY).collect()
    };

    let mut acquired = Vec::with_capacity(chunks.len());
    for _ in 0..chunks.len() {
        match next_free_block(handle)? {
            Some(off) => {
                // Mark provisionally in-use so the next scan does not pick
                // the same block twice.
                write_header(
                    handle,
                    off,
                    &RawBlockHeader {
                        in_use: 1,
                        payload_used: 0,
                        next_offset: 0,
                    },
                )?;
                acquired.push(off);
            }
            None => {
                for off in &acquired {
                    clear_chain(handle, *off)?;
                }
                return Err(FsError::NoSpace);
            }
        }
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let off = acquired[i];
        let next = acquired.get(i + 1).copied().unwrap_or(Offset::NULL);
        let ptr = payload_ptr(handle, off);
        unsafe { std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr, chunk.len()) };
        write_header(
            handle,
            off,
            &RawBlockHeader {
                in_use: 1,
                payload_used: chunk.len() as u32,
                next_offset: next.0,
            },
        )?;
    }

    Ok(acquired[0])
}

/// Replaces the payload chain rooted at `old_first` (or creates a fresh
/// one if `old_first` is `None`, i.e. the inode currently holds no chain)
/// with a chain holding `new_data`, without ever leaving the region in a
/// state that has lost the old data due to space exhaustion: the block
/// budget is checked against the blocks the old chain would free up
/// *before* anything is mutated.
pub fn rewrite_payload(handle: &Handle, old_first: Option<Offset>, new_data: &[u8]) -> FsResult<Offset> {
    let needed = new_data.len().div_ceil(PAYLOAD_CAPACITY).max(1) as u32;
    let old_len = match old_first {
        Some(off) => chain_len(handle, off)?,
        None => 0,
    };
    let free_now = count_free_blocks(handle)?;
    if needed > free_now + old_len {
        return Err(FsError::NoSpace);
    }
    if let Some(off) = old_first {
        clear_chain(handle, off)?;
    }
    write_payload(handle, new_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::bind_handle;

    fn new_handle(region: &mut [u8]) -> Handle {
        bind_handle(region.as_mut_ptr(), region.len()).unwrap()
    }

    #[test]
    pub fn write_then_read_chain_roundtrips() {
        let mut region = vec![0u8; 64 * 1024];
        let h = new_handle(&mut region);
        let data = vec![7u8; PAYLOAD_CAPACITY * 2 + 10];
        let first = write_payload(&h, &data).unwrap();
        let back = read_chain(&h, first).unwrap();
        assert_eq!(back, data);
        assert_eq!(chain_len(&h, first).unwrap(), 3);
    }

    #[test]
    pub fn rewrite_on_exhaustion_preserves_old_chain() {
        let mut region = vec![0u8; 64 * 1024];
        let h = new_handle(&mut region);
        let first = write_payload(&h, b"keep me").unwrap();
        let huge = vec![0u8; h.block_count as usize * PAYLOAD_CAPACITY * 2];
        let err = rewrite_payload(&h, Some(first), &huge).unwrap_err();
        assert_eq!(err, FsError::NoSpace);
        assert_eq!(read_chain(&h, first).unwrap(), b"keep me");
    }

    #[test]
    pub fn clear_chain_frees_every_block() {
        let mut region = vec![0u8; 64 * 1024];
        let h = new_handle(&mut region);
        let before = count_free_blocks(&h).unwrap();
        let first = write_payload(&h, &vec![1u8; PAYLOAD_CAPACITY * 3]).unwrap();
        assert_eq!(count_free_blocks(&h).unwrap(), before - 3);
        clear_chain(&h, first).unwrap();
        assert_eq!(count_free_blocks(&h).unwrap(), before);
    }
}
