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

//! Directory payload encoding and path resolution.
//!
//! A directory's payload is a plain text table, one `name:offset\n` line
//! per child. There is no binary padding and no escaping; the legal
//! filename character set (see [`validate_name`]) is restricted precisely
//! so that this encoding is unambiguous.

use crate::block;
use crate::errno::{FsError, FsResult};
use crate::inode::{self, RawInode};
use crate::layout::NAME_MAX;
use crate::offset::Offset;
use crate::region::{now_timespec, Handle};

/// One parsed `name:offset` line from a directory payload.
#[derive(Debug)]
pub struct DirEntry {
    pub name: String,
    pub offset: Offset,
}

/// Checks a filename against the legal character set: length 1..=255,
/// ASCII printable, excluding `/`, `:`, `,` and anything outside the
/// `32..=122` range (which also excludes `{|}~` and DEL).
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(FsError::Invalid);
    }
    for &b in name.as_bytes() {
        if b <= 31 || b >= 123 || b == b'/' || b == b':' || b == b',' {
            return Err(FsError::Invalid);
        }
    }
    Ok(())
}

/// Parses a directory payload into its `(name, offset)` entries. A
/// malformed line (missing `:`, non-decimal offset) is treated as a fatal
/// invariant violation.
pub fn parse(payload: &[u8]) -> FsResult<Vec<DirEntry>> {
    let text = std::str::from_utf8(payload).map_err(|_| FsError::Fault)?;
    let mut entries = Vec::new();
    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        let (name, off_str) = line.split_once(':').ok_or(FsError::Fault)?;
        let off: u64 = off_str.parse().map_err(|_| FsError::Fault)?;
        entries.push(DirEntry {
            name: name.to_owned(),
            offset: Offset(off),
        });
    }
    Ok(entries)
}

fn format_entry(name: &str, offset: Offset) -> String {
    format!("{name}:{}\n", offset.0)
}

fn encode(entries: &[DirEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for e in entries {
        buf.extend_from_slice(format_entry(&e.name, e.offset).as_bytes());
    }
    buf
}

/// Looks up `name` in a directory's payload, returning the child's inode
/// offset if present. Matches are anchored at line start so that `file`
/// never matches the line for `file2`.
pub fn lookup(payload: &[u8], name: &str) -> FsResult<Option<Offset>> {
    Ok(parse(payload)?.into_iter().find(|e| e.name == name).map(|e| e.offset))
}

/// Reads and parses a directory inode's payload.
pub fn read_entries(handle: &Handle, dir: &RawInode) -> FsResult<Vec<DirEntry>> {
    let payload = block::read_chain(handle, Offset(dir.first_block))?;
    parse(&payload)
}

/// Appends a `name:offset` record to a directory's payload and writes the
/// result back through the block pool.
pub fn append_child(handle: &Handle, parent_idx: u32, name: &str, child_offset: Offset) -> FsResult<()> {
    let mut parent = inode::read(handle, parent_idx)?;
    let mut entries = read_entries(handle, &parent)?;
    entries.push(DirEntry {
        name: name.to_owned(),
        offset: child_offset,
    });
    let new_payload = encode(&entries);
    let new_first = block::rewrite_payload(handle, Some(Offset(parent.first_block)), &new_payload)?;
    parent.first_block = new_first.0;
    parent.payload_size = new_payload.len() as u64;
    let now = now_timespec();
    parent.mtime_sec = now.0;
    parent.mtime_nsec = now.1;
    inode::write(handle, parent_idx, &parent)
}

/// Splices the record named `name` out of a directory's payload.
pub fn remove_child(handle: &Handle, parent_idx: u32, name: &str) -> FsResult<()> {
    let mut parent = inode::read(handle, parent_idx)?;
    let mut entries = read_entries(handle, &parent)?;
    let before = entries.len();
    entries.retain(|e| e.name != name);
    if entries.len() == before {
        return Err(FsError::Fault);
    }
    let new_payload = encode(&entries);
    let new_first = block::rewrite_payload(handle, Some(Offset(parent.first_block)), &new_payload)?;
    parent.first_block = new_first.0;
    parent.payload_size = new_payload.len() as u64;
    let now = now_timespec();
    parent.mtime_sec = now.0;
    parent.mtime_nsec = now.1;
    inode::write(handle, parent_idx, &parent)
}

/// Splits an absolute path into its `/`-separated components, rejecting
/// `.`/`..` components and anything not starting with `/`. Duplicate
/// separators and a trailing separator are tolerated by simply dropping
/// empty components.
pub fn split_path(path: &str) -> FsResult<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(FsError::Invalid);
    }
    let mut parts = Vec::new();
    for comp in path.split('/') {
        if comp.is_empty() {
            continue;
        }
        if comp == "." || comp == ".." {
            return Err(FsError::Invalid);
        }
        parts.push(comp);
    }
    Ok(parts)
}

/// Resolves an absolute path to an inode index, walking one component at a
/// time from the root. A component resolving through a non-directory, or
/// not resolving at all, is reported as `NotFound`.
pub fn resolve(handle: &Handle, path: &str) -> FsResult<u32> {
    let parts = split_path(path)?;
    let mut idx = 0u32; // root
    for comp in parts {
        let cur = inode::read(handle, idx)?;
        if cur.is_dir == 0 {
            return Err(FsError::NotFound);
        }
        let payload = block::read_chain(handle, Offset(cur.first_block))?;
        let child_off = lookup(&payload, comp)?.ok_or(FsError::NotFound)?;
        let child_idx = inode::index_from_offset(handle, child_off)?;
        let child = inode::read(handle, child_idx)?;
        if child.is_free() || child.name_str()? != comp {
            return Err(FsError::Fault);
        }
        idx = child_idx;
    }
    Ok(idx)
}

/// Resolves the parent directory and final component name of a path. The
/// root itself has no parent, so resolving `/` fails with `Invalid`.
pub fn resolve_parent<'p>(handle: &Handle, path: &'p str) -> FsResult<(u32, &'p str)> {
    let parts = split_path(path)?;
    let (last, rest) = parts.split_last().ok_or(FsError::Invalid)?;
    let mut parent_path = String::from("/");
    parent_path.push_str(&rest.join("/"));
    let parent_idx = resolve(handle, &parent_path)?;
    Ok((parent_idx, last))
}
