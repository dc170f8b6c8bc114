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

//! End-to-end scenarios against a freshly formatted region, run strictly
//! sequentially the way the host is expected to serialize calls.

use inmemfs::{bind_handle, ops, FsError, Handle};

const REGION_SIZE: usize = 32 * 1024 + 4096;

fn fresh() -> (Vec<u8>, Handle) {
    let mut region = vec![0u8; REGION_SIZE];
    let handle = bind_handle(region.as_mut_ptr(), region.len()).unwrap();
    (region, handle)
}

#[test]
fn create_write_read_round_trip() {
    let (_region, h) = fresh();
    ops::mkdir(&h, "/dir1").unwrap();
    ops::mknod(&h, "/dir1/file1").unwrap();
    let n = ops::write(&h, "/dir1/file1", b"hello from file 1", 0).unwrap();
    assert_eq!(n, 17);
    let buf = ops::read(&h, "/dir1/file1", 17, 0).unwrap();
    assert_eq!(&buf, b"hello from file 1");
}

#[test]
fn mknod_existing_file_fails() {
    let (_region, h) = fresh();
    ops::mkdir(&h, "/dir1").unwrap();
    ops::mknod(&h, "/dir1/file1").unwrap();
    assert_eq!(ops::mknod(&h, "/dir1/file1").unwrap_err(), FsError::Exists);
}

#[test]
fn rmdir_then_unlink() {
    let (_region, h) = fresh();
    ops::mkdir(&h, "/dir1").unwrap();
    ops::mknod(&h, "/dir1/file1").unwrap();
    assert_eq!(ops::rmdir(&h, "/dir1").unwrap_err(), FsError::NotEmpty);
    ops::unlink(&h, "/dir1/file1").unwrap();
    ops::rmdir(&h, "/dir1").unwrap();
}

#[test]
fn multi_block_file_round_trips_exactly() {
    let (_region, h) = fresh();
    ops::mknod(&h, "/file5").unwrap();

    let cap = ops::statfs(&h).unwrap().block_size as usize;
    let half = cap * 5 / 4 / 2;
    let mut payload = vec![b'a'; half];
    payload.extend(std::iter::repeat(b'b').take(cap * 5 / 4 - half));
    payload.push(b'c');

    ops::write(&h, "/file5", &payload, 0).unwrap();
    let back = ops::read(&h, "/file5", payload.len(), 0).unwrap();
    assert_eq!(back, payload);

    let st = ops::getattr(&h, "/file5", 0, 0).unwrap();
    assert_eq!(st.size as usize, payload.len());
}

#[test]
fn write_at_offset_splices_prefix() {
    let (_region, h) = fresh();
    ops::mkdir(&h, "/dir1").unwrap();
    ops::mknod(&h, "/dir1/file2").unwrap();
    ops::write(&h, "/dir1/file2", b"hello from file 2", 0).unwrap();

    let n = ops::write(&h, "/dir1/file2", b"test write", 11).unwrap();
    assert_eq!(n, 10);

    let st = ops::getattr(&h, "/dir1/file2", 0, 0).unwrap();
    assert_eq!(st.size, 21);
    let buf = ops::read(&h, "/dir1/file2", 21, 0).unwrap();
    assert_eq!(&buf, b"hello from test write");
}

#[test]
fn rename_out_of_directory() {
    let (_region, h) = fresh();
    ops::mkdir(&h, "/dir1").unwrap();
    ops::mknod(&h, "/dir1/file2").unwrap();
    ops::write(&h, "/dir1/file2", b"payload", 0).unwrap();

    ops::rename(&h, "/dir1/file2", "/file2").unwrap();

    let st = ops::getattr(&h, "/file2", 0, 0).unwrap();
    assert_eq!(st.size, 7);
    assert_eq!(
        ops::getattr(&h, "/dir1/file2", 0, 0).unwrap_err(),
        FsError::NotFound
    );
}

#[test]
fn filename_length_boundary() {
    let (_region, h) = fresh();
    let max_name = "a".repeat(255);
    ops::mknod(&h, &format!("/{max_name}")).unwrap();

    let too_long = "a".repeat(256);
    assert_eq!(
        ops::mknod(&h, &format!("/{too_long}")).unwrap_err(),
        FsError::Invalid
    );
}

#[test]
fn read_at_end_of_file_returns_empty() {
    let (_region, h) = fresh();
    ops::mknod(&h, "/f").unwrap();
    ops::write(&h, "/f", b"abc", 0).unwrap();
    let buf = ops::read(&h, "/f", 10, 3).unwrap();
    assert!(buf.is_empty());
}

#[test]
fn write_past_end_is_efbig() {
    let (_region, h) = fresh();
    ops::mknod(&h, "/f").unwrap();
    ops::write(&h, "/f", b"abc", 0).unwrap();
    assert_eq!(ops::write(&h, "/f", b"x", 4).unwrap_err(), FsError::TooBig);
}

#[test]
fn rmdir_root_is_rejected() {
    let (_region, h) = fresh();
    assert_eq!(ops::rmdir(&h, "/").unwrap_err(), FsError::Invalid);
}

#[test]
fn rename_nonempty_directory_updates_link_count() {
    let (_region, h) = fresh();
    ops::mkdir(&h, "/a").unwrap();
    ops::mkdir(&h, "/a/b").unwrap();

    ops::rename(&h, "/a", "/c").unwrap();

    let st = ops::getattr(&h, "/c", 0, 0).unwrap();
    assert_eq!(st.nlink, 3);
    assert_eq!(ops::readdir(&h, "/c").unwrap(), vec!["b".to_string()]);
}

#[test]
fn write_and_truncate_reject_directories() {
    let (_region, h) = fresh();
    ops::mkdir(&h, "/dir1").unwrap();
    ops::open(&h, "/dir1").unwrap();

    assert_eq!(
        ops::write(&h, "/dir1", b"garbage", 0).unwrap_err(),
        FsError::Invalid
    );
    assert_eq!(
        ops::truncate(&h, "/dir1", 10).unwrap_err(),
        FsError::Invalid
    );
    assert_eq!(ops::readdir(&h, "/dir1").unwrap(), Vec::<String>::new());
}

#[test]
fn rebinding_an_already_formatted_region_is_stable() {
    let mut region = vec![0u8; REGION_SIZE];
    let h1 = bind_handle(region.as_mut_ptr(), region.len()).unwrap();
    ops::mkdir(&h1, "/persisted").unwrap();
    drop(h1);

    let h2 = bind_handle(region.as_mut_ptr(), region.len()).unwrap();
    let names = ops::readdir(&h2, "/").unwrap();
    assert_eq!(names, vec!["persisted".to_string()]);
}
