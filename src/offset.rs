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

//! Conversions between region-relative byte offsets and in-memory
//! addresses.
//!
//! Every reference stored inside the image is a byte offset from the
//! region base, never a native pointer — this is what lets the image
//! survive being unmapped and remapped at a different address. Offset `0`
//! is reserved as the null sentinel, since it would otherwise point at the
//! header.

use crate::errno::{FsError, FsResult};

/// A byte offset from the region base. `0` means "no block"/"no inode".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(pub u64);

impl Offset {
    /// The null sentinel.
    pub const NULL: Offset = Offset(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Offset {
    fn from(v: u64) -> Self {
        Offset(v)
    }
}

/// Converts a region-relative offset into an address, after checking that
/// `[offset, offset + len)` falls inside `[seg_start, seg_start + seg_len)`.
///
/// Every offset read back out of the image must go through this before
/// being dereferenced; a value that fails this check indicates a corrupt
/// image and is treated as a fatal invariant violation (`EFAULT`).
pub fn validate_in_segment(off: Offset, seg_start: u64, seg_len: u64, len: u64) -> FsResult<()> {
    let end = off.0.checked_add(len).ok_or(FsError::Fault)?;
    if off.0 < seg_start || end > seg_start + seg_len {
        return Err(FsError::Fault);
    }
    Ok(())
}

/// Converts a validated region-relative offset into an address.
///
/// # Safety
/// `base` must point at the start of a region at least `offset.0 + 1`
/// bytes long; callers are expected to have validated `offset` with
/// [`validate_in_segment`] first.
pub unsafe fn offset_to_ptr(base: *mut u8, offset: Offset) -> *mut u8 {
    unsafe { base.add(offset.0 as usize) }
}

/// Converts an address inside the region back into a region-relative
/// offset.
pub fn ptr_to_offset(base: *mut u8, ptr: *const u8) -> Offset {
    Offset((ptr as usize - base as usize) as u64)
}
