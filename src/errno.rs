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

//! Error taxonomy for the filesystem core.
//!
//! Every fallible entry point returns an [`FsError`] rather than a raw
//! `errno`. The C ABI layer in [`crate::ffi`] is the only place that turns
//! these back into the `libc` constants the host expects.

/// A core-level failure, one per bucket in the operation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Region pointer null, region too small, or an offset read from the
    /// image fell outside its expected segment.
    Fault,
    /// A path did not resolve to an existing inode.
    NotFound,
    /// A create operation's target name already exists in its parent.
    Exists,
    /// Wrong kind of operation for the target, or a malformed argument
    /// (bad filename, bad path).
    Invalid,
    /// An operation that requires a directory found something else.
    NotDir,
    /// `rmdir` on a non-empty directory.
    NotEmpty,
    /// A read or write offset was beyond the current payload size.
    TooBig,
    /// Inode or block allocation was exhausted.
    NoSpace,
}

impl FsError {
    /// Maps this error onto the `libc` errno constant the host expects.
    pub fn to_errno(self) -> i32 {
        match self {
            FsError::Fault => libc::EFAULT,
            FsError::NotFound => libc::ENOENT,
            FsError::Exists => libc::EEXIST,
            FsError::Invalid => libc::EINVAL,
            FsError::NotDir => libc::ENOTDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::TooBig => libc::EFBIG,
            FsError::NoSpace => libc::ENOSPC,
        }
    }
}

/// Shorthand used throughout the core.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn every_variant_maps_to_a_distinct_errno() {
        let all = [
            FsError::Fault,
            FsError::NotFound,
            FsError::Exists,
            FsError::Invalid,
            FsError::NotDir,
            FsError::NotEmpty,
            FsError::TooBig,
            FsError::NoSpace,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.to_errno(), b.to_errno());
            }
        }
    }
}
