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

//! C ABI surface. Every function here has the shape
//! `(region_base, region_size, errno_out, ...) -> i32`, mirroring the
//! reference FUSE implementation's per-operation entry points. This layer
//! does no work of its own beyond binding a handle, delegating to
//! [`crate::ops`], and marshalling the result into the caller's buffers.

use std::ffi::{c_char, CStr, CString};
use std::slice;

use crate::errno::FsError;
use crate::ops;
use crate::region::bind_handle;

unsafe fn path_from_c<'a>(path: *const c_char) -> Result<&'a str, FsError> {
    if path.is_null() {
        return Err(FsError::Fault);
    }
    unsafe { CStr::from_ptr(path) }.to_str().map_err(|_| FsError::Fault)
}

unsafe fn fail(err: FsError, errno_out: *mut i32) -> i32 {
    if !errno_out.is_null() {
        unsafe { *errno_out = err.to_errno() };
    }
    -1
}

/// POSIX-`stat`-shaped output buffer, written by [`fs_getattr`].
#[repr(C)]
pub struct CStat {
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub atime_sec: i64,
    pub atime_nsec: i32,
    pub mtime_sec: i64,
    pub mtime_nsec: i32,
    pub uid: u32,
    pub gid: u32,
}

/// # Safety
/// `region_base` must be valid for `region_size` bytes; `path` must be a
/// valid NUL-terminated C string; `out`/`errno_out` must be valid for one
/// write each.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_getattr(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    path: *const c_char,
    uid: u32,
    gid: u32,
    out: *mut CStat,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let path = match unsafe { path_from_c(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    match ops::getattr(&handle, path, uid, gid) {
        Ok(st) => {
            if !out.is_null() {
                unsafe {
                    *out = CStat {
                        mode: st.mode,
                        nlink: st.nlink,
                        size: st.size,
                        atime_sec: st.atime.0,
                        atime_nsec: st.atime.1,
                        mtime_sec: st.mtime.0,
                        mtime_nsec: st.mtime.1,
                        uid: st.uid,
                        gid: st.gid,
                    };
                }
            }
            0
        }
        Err(e) => unsafe { fail(e, errno_out) },
    }
}

/// Writes a malloc-allocated array of `char*` names into `*out_names`,
/// and the count into the return value. The caller owns the returned
/// array and each string in it; free with [`fs_free_name_array`].
///
/// # Safety
/// Same preconditions as [`fs_getattr`], plus `out_names` must be valid
/// for one write of a pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_readdir(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    path: *const c_char,
    out_names: *mut *mut *mut c_char,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let path = match unsafe { path_from_c(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let names = match ops::readdir(&handle, path) {
        Ok(n) => n,
        Err(e) => return unsafe { fail(e, errno_out) },
    };

    let mut c_names: Vec<*mut c_char> = Vec::with_capacity(names.len());
    for name in &names {
        match CString::new(name.as_str()) {
            Ok(c) => c_names.push(c.into_raw()),
            Err(_) => {
                for p in c_names {
                    unsafe { drop(CString::from_raw(p)) };
                }
                return unsafe { fail(FsError::Fault, errno_out) };
            }
        }
    }

    let count = c_names.len();
    let boxed = c_names.into_boxed_slice();
    let ptr = Box::into_raw(boxed) as *mut *mut c_char;
    if !out_names.is_null() {
        unsafe { *out_names = ptr };
    }
    count as i32
}

/// Frees an array previously returned by [`fs_readdir`].
///
/// # Safety
/// `names` must be a pointer previously returned by `fs_readdir`'s
/// `out_names`, with exactly `count` entries, each still owned.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_free_name_array(names: *mut *mut c_char, count: usize) {
    if names.is_null() {
        return;
    }
    let slice = unsafe { slice::from_raw_parts_mut(names, count) };
    for &mut p in slice.iter_mut() {
        if !p.is_null() {
            unsafe { drop(CString::from_raw(p)) };
        }
    }
    unsafe { drop(Box::from_raw(slice as *mut [*mut c_char])) };
}

macro_rules! path_only_op {
    ($fn_name:ident, $op:path) => {
        /// # Safety
        /// Same preconditions as [`fs_getattr`].
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $fn_name(
            region_base: *mut u8,
            region_size: usize,
            errno_out: *mut i32,
            path: *const c_char,
        ) -> i32 {
            let handle = match bind_handle(region_base, region_size) {
                Ok(h) => h,
                Err(e) => return unsafe { fail(e, errno_out) },
            };
            let path = match unsafe { path_from_c(path) } {
                Ok(p) => p,
                Err(e) => return unsafe { fail(e, errno_out) },
            };
            match $op(&handle, path) {
                Ok(()) => 0,
                Err(e) => unsafe { fail(e, errno_out) },
            }
        }
    };
}

path_only_op!(fs_mknod, ops::mknod);
path_only_op!(fs_unlink, ops::unlink);
path_only_op!(fs_mkdir, ops::mkdir);
path_only_op!(fs_rmdir, ops::rmdir);
path_only_op!(fs_open, ops::open);

/// # Safety
/// Same preconditions as [`fs_getattr`], plus `from`/`to` must be valid
/// NUL-terminated C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_rename(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    from: *const c_char,
    to: *const c_char,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let from = match unsafe { path_from_c(from) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let to = match unsafe { path_from_c(to) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    match ops::rename(&handle, from, to) {
        Ok(()) => 0,
        Err(e) => unsafe { fail(e, errno_out) },
    }
}

/// # Safety
/// Same preconditions as [`fs_getattr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_truncate(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    path: *const c_char,
    new_size: u64,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let path = match unsafe { path_from_c(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    match ops::truncate(&handle, path, new_size) {
        Ok(()) => 0,
        Err(e) => unsafe { fail(e, errno_out) },
    }
}

/// # Safety
/// Same preconditions as [`fs_getattr`], plus `buf` must be valid for
/// `size` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_read(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    path: *const c_char,
    buf: *mut u8,
    size: usize,
    offset: u64,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let path = match unsafe { path_from_c(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    match ops::read(&handle, path, size, offset) {
        Ok(data) => {
            if !buf.is_null() && !data.is_empty() {
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), buf, data.len()) };
            }
            data.len() as i32
        }
        Err(e) => unsafe { fail(e, errno_out) },
    }
}

/// # Safety
/// Same preconditions as [`fs_getattr`], plus `buf` must be valid for
/// `size` bytes of reads.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_write(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    path: *const c_char,
    buf: *const u8,
    size: usize,
    offset: u64,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let path = match unsafe { path_from_c(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let data = if buf.is_null() || size == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(buf, size) }
    };
    match ops::write(&handle, path, data, offset) {
        Ok(n) => n as i32,
        Err(e) => unsafe { fail(e, errno_out) },
    }
}

/// # Safety
/// Same preconditions as [`fs_getattr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_utimens(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    path: *const c_char,
    atime_sec: i64,
    atime_nsec: i32,
    mtime_sec: i64,
    mtime_nsec: i32,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    let path = match unsafe { path_from_c(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    match ops::utimens(&handle, path, (atime_sec, atime_nsec), (mtime_sec, mtime_nsec)) {
        Ok(()) => 0,
        Err(e) => unsafe { fail(e, errno_out) },
    }
}

/// Statfs output buffer, written by [`fs_statfs`].
#[repr(C)]
pub struct CStatFs {
    pub block_size: u64,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub name_max: u64,
}

/// # Safety
/// Same preconditions as [`fs_getattr`] (no `path` argument), plus `out`
/// must be valid for one write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fs_statfs(
    region_base: *mut u8,
    region_size: usize,
    errno_out: *mut i32,
    out: *mut CStatFs,
) -> i32 {
    let handle = match bind_handle(region_base, region_size) {
        Ok(h) => h,
        Err(e) => return unsafe { fail(e, errno_out) },
    };
    match ops::statfs(&handle) {
        Ok(st) => {
            if !out.is_null() {
                unsafe {
                    *out = CStatFs {
                        block_size: st.block_size,
                        total_blocks: st.total_blocks,
                        free_blocks: st.free_blocks,
                        name_max: st.name_max,
                    };
                }
            }
            0
        }
        Err(e) => unsafe { fail(e, errno_out) },
    }
}
