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

//! The operation surface: the fixed set of filesystem operations invoked
//! by the host, expressed as a safe Rust API. [`crate::ffi`] is a thin
//! marshalling layer on top of this module.

use crate::block;
use crate::dir::{self, validate_name};
use crate::errno::{FsError, FsResult};
use crate::inode::{self, RawInode};
use crate::layout::{NAME_MAX, PAYLOAD_CAPACITY};
use crate::offset::Offset;
use crate::region::{now_timespec, Handle};

/// A POSIX-`stat`-shaped view of an inode, filled in by [`getattr`].
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub atime: (i64, i32),
    pub mtime: (i64, i32),
    pub uid: u32,
    pub gid: u32,
}

/// A `statvfs`-shaped summary of pool usage, filled in by [`statfs`].
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub block_size: u64,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub name_max: u64,
}

fn require_dir(inode: &RawInode) -> FsResult<()> {
    if inode.is_dir == 0 {
        return Err(FsError::NotDir);
    }
    Ok(())
}

pub fn getattr(handle: &Handle, path: &str, uid: u32, gid: u32) -> FsResult<Stat> {
    let idx = dir::resolve(handle, path)?;
    let inode = inode::read(handle, idx)?;
    let is_dir = inode.is_dir != 0;
    let mode = if is_dir {
        libc::S_IFDIR | 0o755
    } else {
        libc::S_IFREG | 0o755
    } as u32;
    let nlink = if is_dir { inode.child_count + 2 } else { 1 };
    Ok(Stat {
        mode,
        nlink,
        size: inode.payload_size,
        atime: (inode.atime_sec, inode.atime_nsec),
        mtime: (inode.mtime_sec, inode.mtime_nsec),
        uid,
        gid,
    })
}

pub fn readdir(handle: &Handle, path: &str) -> FsResult<Vec<String>> {
    let idx = dir::resolve(handle, path)?;
    let inode = inode::read(handle, idx)?;
    require_dir(&inode)?;
    let entries = dir::read_entries(handle, &inode)?;
    Ok(entries.into_iter().map(|e| e.name).collect())
}

/// Shared body of `mknod`/`mkdir`: validates the target does not already
/// exist, creates the new inode, and links it into its parent. Rolls the
/// new inode back if appending the directory entry fails, so a failed
/// create never leaks an orphan inode.
fn create_child(handle: &Handle, path: &str, is_dir: bool) -> FsResult<()> {
    let (parent_idx, name) = dir::resolve_parent(handle, path)?;
    validate_name(name)?;
    let parent = inode::read(handle, parent_idx)?;
    require_dir(&parent)?;
    let payload = block::read_chain(handle, Offset(parent.first_block))?;
    if dir::lookup(&payload, name)?.is_some() {
        return Err(FsError::Exists);
    }

    let child_idx = inode::create(handle, name, is_dir)?;
    let child_off = inode::offset_of(handle, child_idx);
    if let Err(e) = dir::append_child(handle, parent_idx, name, child_off) {
        let _ = inode::free(handle, child_idx);
        return Err(e);
    }
    if is_dir {
        let mut parent = inode::read(handle, parent_idx)?;
        parent.child_count += 1;
        inode::write(handle, parent_idx, &parent)?;
    }
    Ok(())
}

pub fn mknod(handle: &Handle, path: &str) -> FsResult<()> {
    create_child(handle, path, false)
}

pub fn mkdir(handle: &Handle, path: &str) -> FsResult<()> {
    create_child(handle, path, true)
}

pub fn unlink(handle: &Handle, path: &str) -> FsResult<()> {
    let (parent_idx, name) = dir::resolve_parent(handle, path)?;
    let idx = dir::resolve(handle, path)?;
    let inode = inode::read(handle, idx)?;
    if inode.is_dir != 0 {
        return Err(FsError::Invalid);
    }
    dir::remove_child(handle, parent_idx, name)?;
    inode::free(handle, idx)
}

pub fn rmdir(handle: &Handle, path: &str) -> FsResult<()> {
    let idx = dir::resolve(handle, path)?;
    if idx == 0 {
        // The root is never removable.
        return Err(FsError::Invalid);
    }
    let inode = inode::read(handle, idx)?;
    require_dir(&inode)?;
    if inode.payload_size != 0 {
        return Err(FsError::NotEmpty);
    }
    let (parent_idx, name) = dir::resolve_parent(handle, path)?;
    dir::remove_child(handle, parent_idx, name)?;
    inode::free(handle, idx)?;
    let mut parent = inode::read(handle, parent_idx)?;
    parent.child_count = parent.child_count.saturating_sub(1);
    inode::write(handle, parent_idx, &parent)
}

/// Resolves a path to `(parent_idx, name, Option<child_idx>)`, where the
/// child need not exist.
fn resolve_target(handle: &Handle, path: &str) -> FsResult<(u32, String, Option<u32>)> {
    let (parent_idx, name) = dir::resolve_parent(handle, path)?;
    let child_idx = match dir::resolve(handle, path) {
        Ok(i) => Some(i),
        Err(FsError::NotFound) => None,
        Err(e) => return Err(e),
    };
    Ok((parent_idx, name.to_owned(), child_idx))
}

pub fn rename(handle: &Handle, from: &str, to: &str) -> FsResult<()> {
    if from == to {
        return Ok(());
    }
    dir::split_path(from)?;
    dir::split_path(to)?;

    let (from_parent_idx, from_name, from_child_idx) = resolve_target(handle, from)?;
    let from_child_idx = from_child_idx.ok_or(FsError::Invalid)?;
    let (to_parent_idx, to_name, to_child_idx) = resolve_target(handle, to)?;

    let from_child = inode::read(handle, from_child_idx)?;
    let data = block::read_chain(handle, Offset(from_child.first_block))?;

    if from_child.is_dir != 0 {
        match to_child_idx {
            None => {
                validate_name(&to_name)?;
                let to_parent = inode::read(handle, to_parent_idx)?;
                require_dir(&to_parent)?;
                let new_idx = inode::create(handle, &to_name, true)?;
                let new_off = inode::offset_of(handle, new_idx);
                let mut new_inode = inode::read(handle, new_idx)?;
                let first = block::rewrite_payload(handle, Some(Offset(new_inode.first_block)), &data)?;
                new_inode.first_block = first.0;
                new_inode.payload_size = data.len() as u64;
                new_inode.child_count = from_child.child_count;
                inode::write(handle, new_idx, &new_inode)?;
                if let Err(e) = dir::append_child(handle, to_parent_idx, &to_name, new_off) {
                    let _ = inode::free(handle, new_idx);
                    return Err(e);
                }
                let mut to_parent = inode::read(handle, to_parent_idx)?;
                to_parent.child_count += 1;
                inode::write(handle, to_parent_idx, &to_parent)?;
            }
            Some(to_idx) => {
                let to_child = inode::read(handle, to_idx)?;
                if to_child.is_dir == 0 || to_child.payload_size != 0 {
                    return Err(FsError::Invalid);
                }
                let mut to_child = to_child;
                let first = block::rewrite_payload(handle, Some(Offset(to_child.first_block)), &data)?;
                to_child.first_block = first.0;
                to_child.payload_size = data.len() as u64;
                to_child.child_count = from_child.child_count;
                inode::write(handle, to_idx, &to_child)?;
            }
        }
    } else {
        match to_child_idx {
            None => {
                validate_name(&to_name)?;
                let to_parent = inode::read(handle, to_parent_idx)?;
                require_dir(&to_parent)?;
                let new_idx = inode::create(handle, &to_name, false)?;
                let new_off = inode::offset_of(handle, new_idx);
                let mut new_inode = inode::read(handle, new_idx)?;
                let first = block::rewrite_payload(handle, Some(Offset(new_inode.first_block)), &data)?;
                new_inode.first_block = first.0;
                new_inode.payload_size = data.len() as u64;
                inode::write(handle, new_idx, &new_inode)?;
                if let Err(e) = dir::append_child(handle, to_parent_idx, &to_name, new_off) {
                    let _ = inode::free(handle, new_idx);
                    return Err(e);
                }
            }
            Some(to_idx) => {
                let mut to_child = inode::read(handle, to_idx)?;
                if to_child.is_dir != 0 {
                    return Err(FsError::Invalid);
                }
                let first = block::rewrite_payload(handle, Some(Offset(to_child.first_block)), &data)?;
                to_child.first_block = first.0;
                to_child.payload_size = data.len() as u64;
                let now = now_timespec();
                to_child.mtime_sec = now.0;
                to_child.mtime_nsec = now.1;
                inode::write(handle, to_idx, &to_child)?;
            }
        }
    }

    dir::remove_child(handle, from_parent_idx, &from_name)?;
    if from_child.is_dir != 0 {
        let mut from_parent = inode::read(handle, from_parent_idx)?;
        from_parent.child_count = from_parent.child_count.saturating_sub(1);
        inode::write(handle, from_parent_idx, &from_parent)?;
    }
    inode::free(handle, from_child_idx)
}

pub fn truncate(handle: &Handle, path: &str, new_size: u64) -> FsResult<()> {
    let idx = dir::resolve(handle, path)?;
    let mut inode = inode::read(handle, idx)?;
    if inode.is_dir != 0 {
        return Err(FsError::Invalid);
    }
    let cur = inode.payload_size;
    if new_size == cur {
        return Ok(());
    }
    let mut payload = block::read_chain(handle, Offset(inode.first_block))?;
    if new_size > cur {
        payload.resize(new_size as usize, 0);
    } else {
        payload.truncate(new_size as usize);
    }
    let first = block::rewrite_payload(handle, Some(Offset(inode.first_block)), &payload)?;
    inode.first_block = first.0;
    inode.payload_size = new_size;
    let now = now_timespec();
    inode.mtime_sec = now.0;
    inode.mtime_nsec = now.1;
    inode::write(handle, idx, &inode)
}

pub fn open(handle: &Handle, path: &str) -> FsResult<()> {
    dir::resolve(handle, path)?;
    Ok(())
}

pub fn read(handle: &Handle, path: &str, size: usize, offset: u64) -> FsResult<Vec<u8>> {
    let idx = dir::resolve(handle, path)?;
    let mut inode = inode::read(handle, idx)?;
    if offset > inode.payload_size {
        return Err(FsError::TooBig);
    }
    if offset == inode.payload_size {
        return Ok(Vec::new());
    }
    let payload = block::read_chain(handle, Offset(inode.first_block))?;
    let end = (offset as usize + size).min(payload.len());
    let out = payload[offset as usize..end].to_vec();

    let now = now_timespec();
    inode.atime_sec = now.0;
    inode.atime_nsec = now.1;
    inode::write(handle, idx, &inode)?;

    Ok(out)
}

pub fn write(handle: &Handle, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
    let idx = dir::resolve(handle, path)?;
    let mut inode = inode::read(handle, idx)?;
    if inode.is_dir != 0 {
        return Err(FsError::Invalid);
    }
    if offset > inode.payload_size {
        return Err(FsError::TooBig);
    }
    let new_payload = if offset == 0 {
        data.to_vec()
    } else {
        let mut prefix = block::read_chain(handle, Offset(inode.first_block))?;
        prefix.truncate(offset as usize);
        prefix.extend_from_slice(data);
        prefix
    };
    let first = block::rewrite_payload(handle, Some(Offset(inode.first_block)), &new_payload)?;
    inode.first_block = first.0;
    inode.payload_size = new_payload.len() as u64;
    let now = now_timespec();
    inode.mtime_sec = now.0;
    inode.mtime_nsec = now.1;
    inode::write(handle, idx, &inode)?;
    Ok(data.len())
}

pub fn utimens(handle: &Handle, path: &str, atime: (i64, i32), mtime: (i64, i32)) -> FsResult<()> {
    let idx = dir::resolve(handle, path)?;
    let mut inode = inode::read(handle, idx)?;
    inode.atime_sec = atime.0;
    inode.atime_nsec = atime.1;
    inode.mtime_sec = mtime.0;
    inode.mtime_nsec = mtime.1;
    inode::write(handle, idx, &inode)
}

pub fn statfs(handle: &Handle) -> FsResult<StatFs> {
    let free = block::count_free_blocks(handle)?;
    Ok(StatFs {
        block_size: PAYLOAD_CAPACITY as u64,
        total_blocks: handle.block_count as u64,
        free_blocks: free as u64,
        name_max: NAME_MAX as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::bind_handle;

    fn new_handle(region: &mut [u8]) -> Handle {
        bind_handle(region.as_mut_ptr(), region.len()).unwrap()
    }

    #[test]
    pub fn mknod_on_existing_name_is_exists() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/a").unwrap();
        assert_eq!(mknod(&h, "/a").unwrap_err(), FsError::Exists);
    }

    #[test]
    pub fn create_under_non_directory_consumes_no_inode() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/f").unwrap();
        let before = inode::next_free(&h).unwrap();
        assert_eq!(mknod(&h, "/f/child").unwrap_err(), FsError::NotDir);
        let after = inode::next_free(&h).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    pub fn rmdir_rejects_root() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        assert_eq!(rmdir(&h, "/").unwrap_err(), FsError::Invalid);
    }

    #[test]
    pub fn rmdir_rejects_nonempty() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mkdir(&h, "/d").unwrap();
        mknod(&h, "/d/f").unwrap();
        assert_eq!(rmdir(&h, "/d").unwrap_err(), FsError::NotEmpty);
    }

    #[test]
    pub fn write_at_offset_zero_replaces_whole_payload() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/f").unwrap();
        write(&h, "/f", b"0123456789", 0).unwrap();
        write(&h, "/f", b"ab", 0).unwrap();
        assert_eq!(read(&h, "/f", 100, 0).unwrap(), b"ab");
    }

    #[test]
    pub fn write_past_offset_is_too_big() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/f").unwrap();
        write(&h, "/f", b"hi", 0).unwrap();
        assert_eq!(write(&h, "/f", b"x", 10).unwrap_err(), FsError::TooBig);
    }

    #[test]
    pub fn write_on_directory_is_rejected() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mkdir(&h, "/dir1").unwrap();
        open(&h, "/dir1").unwrap();
        assert_eq!(write(&h, "/dir1", b"garbage", 0).unwrap_err(), FsError::Invalid);
        // the directory's payload must still parse as a valid entry table
        assert_eq!(readdir(&h, "/dir1").unwrap(), Vec::<String>::new());
    }

    #[test]
    pub fn truncate_on_directory_is_rejected() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mkdir(&h, "/dir1").unwrap();
        assert_eq!(truncate(&h, "/dir1", 10).unwrap_err(), FsError::Invalid);
    }

    #[test]
    pub fn write_and_truncate_on_root_are_rejected() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        assert_eq!(write(&h, "/", b"garbage", 0).unwrap_err(), FsError::Invalid);
        assert_eq!(truncate(&h, "/", 0).unwrap_err(), FsError::Invalid);
    }

    #[test]
    pub fn write_at_middle_offset_concatenates_prefix() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/f").unwrap();
        write(&h, "/f", b"hello world", 0).unwrap();
        write(&h, "/f", b"RUST", 6).unwrap();
        assert_eq!(read(&h, "/f", 100, 0).unwrap(), b"hello RUST");
    }

    #[test]
    pub fn truncate_grow_zero_fills() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/f").unwrap();
        write(&h, "/f", b"ab", 0).unwrap();
        truncate(&h, "/f", 5).unwrap();
        assert_eq!(read(&h, "/f", 100, 0).unwrap(), b"ab\0\0\0");
    }

    #[test]
    pub fn truncate_shrink_discards_tail() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/f").unwrap();
        write(&h, "/f", b"abcdef", 0).unwrap();
        truncate(&h, "/f", 3).unwrap();
        assert_eq!(read(&h, "/f", 100, 0).unwrap(), b"abc");
    }

    #[test]
    pub fn rename_noop_when_same_path() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/f").unwrap();
        rename(&h, "/f", "/f").unwrap();
    }

    #[test]
    pub fn rename_file_onto_existing_overwrites_payload() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mknod(&h, "/a").unwrap();
        mknod(&h, "/b").unwrap();
        write(&h, "/a", b"from a", 0).unwrap();
        write(&h, "/b", b"from b", 0).unwrap();
        rename(&h, "/a", "/b").unwrap();
        assert_eq!(read(&h, "/b", 100, 0).unwrap(), b"from a");
        assert_eq!(getattr(&h, "/a", 0, 0).unwrap_err(), FsError::NotFound);
    }

    #[test]
    pub fn rename_directory_onto_nonempty_fails() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mkdir(&h, "/a").unwrap();
        mkdir(&h, "/b").unwrap();
        mknod(&h, "/b/f").unwrap();
        assert_eq!(rename(&h, "/a", "/b").unwrap_err(), FsError::Invalid);
    }

    #[test]
    pub fn rename_nonempty_directory_preserves_child_count() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mkdir(&h, "/a").unwrap();
        mkdir(&h, "/a/b").unwrap();

        rename(&h, "/a", "/c").unwrap();

        let st = getattr(&h, "/c", 0, 0).unwrap();
        assert_eq!(st.nlink, 3); // child_count (1) + 2
        let names = readdir(&h, "/c").unwrap();
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[test]
    pub fn rename_nonempty_directory_onto_empty_directory_preserves_child_count() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        mkdir(&h, "/a").unwrap();
        mkdir(&h, "/a/b").unwrap();
        mkdir(&h, "/c").unwrap();

        rename(&h, "/a", "/c").unwrap();

        let st = getattr(&h, "/c", 0, 0).unwrap();
        assert_eq!(st.nlink, 3);
        let names = readdir(&h, "/c").unwrap();
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[test]
    pub fn statfs_reports_total_and_free() {
        let mut region = vec![0u8; 128 * 1024];
        let h = new_handle(&mut region);
        let before = statfs(&h).unwrap();
        mknod(&h, "/f").unwrap();
        let after = statfs(&h).unwrap();
        assert_eq!(before.total_blocks, after.total_blocks);
        assert_eq!(after.free_blocks, before.free_blocks - 1);
    }
}
