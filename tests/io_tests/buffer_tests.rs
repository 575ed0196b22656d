//! BufferedAccess Tests
//!
//! Tests verify:
//! - Reads see pending writes, including overlapping ones
//! - Adjacent and overlapping writes coalesce into one chunk
//! - Size-triggered and explicit flushes
//! - A failed flush keeps pending data for a retry
//! - Grouped writes are undone together when their flush fails

use std::time::Duration;

use rowstore::io::{BufferedAccess, MemoryAccess, RandomAccess};

// =============================================================================
// Helper Functions
// =============================================================================

const NEVER: Duration = Duration::from_secs(3600);

fn buffered(max_bytes: usize) -> (MemoryAccess, BufferedAccess<MemoryAccess>) {
    let store = MemoryAccess::new();
    let buffer = BufferedAccess::new(store.clone(), max_bytes, NEVER);
    (store, buffer)
}

fn read(buffer: &mut BufferedAccess<MemoryAccess>, offset: u64, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    buffer.read(offset, &mut buf).unwrap();
    buf
}

// =============================================================================
// Read-Your-Writes Tests
// =============================================================================

#[test]
fn test_read_pending_write() {
    let (store, mut buffer) = buffered(1 << 20);
    buffer.write(10, b"hello").unwrap();

    assert_eq!(read(&mut buffer, 10, 5), b"hello");
    assert_eq!(buffer.length().unwrap(), 15);
    assert!(store.contents().is_empty());
}

#[test]
fn test_read_mixes_store_and_pending() {
    let store = MemoryAccess::from_bytes(b"0123456789".to_vec());
    let mut buffer = BufferedAccess::new(store.clone(), 1 << 20, NEVER);
    buffer.write(3, b"ab").unwrap();
    buffer.write(12, b"zz").unwrap();

    assert_eq!(read(&mut buffer, 0, 14), b"012ab56789\0\0zz");
}

#[test]
fn test_overlapping_writes_latest_wins() {
    let (_store, mut buffer) = buffered(1 << 20);
    buffer.write(0, b"aaaaaaaa").unwrap();
    buffer.write(4, b"bbbbbbbb").unwrap();
    buffer.write(2, b"cc").unwrap();

    assert_eq!(read(&mut buffer, 0, 12), b"aaccbbbbbbbb");
    assert_eq!(buffer.pending_chunks(), 1);
    assert_eq!(buffer.pending_bytes(), 12);
}

#[test]
fn test_write_bridging_two_chunks_merges_them() {
    let (_store, mut buffer) = buffered(1 << 20);
    buffer.write(0, b"xx").unwrap();
    buffer.write(6, b"yy").unwrap();
    assert_eq!(buffer.pending_chunks(), 2);

    buffer.write(2, b"----").unwrap();
    assert_eq!(buffer.pending_chunks(), 1);
    assert_eq!(read(&mut buffer, 0, 8), b"xx----yy");
}

#[test]
fn test_sequential_appends_stay_one_chunk() {
    let (_store, mut buffer) = buffered(1 << 20);
    for i in 0..100u64 {
        buffer.write(i * 4, &(i as u32).to_be_bytes()).unwrap();
    }
    assert_eq!(buffer.pending_chunks(), 1);
    assert_eq!(read(&mut buffer, 396, 4), 99u32.to_be_bytes());
}

#[test]
fn test_read_past_end_fails() {
    let (_store, mut buffer) = buffered(1 << 20);
    buffer.write(0, b"abc").unwrap();

    let mut buf = [0u8; 4];
    assert!(buffer.read(0, &mut buf).is_err());
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_commit_writes_through() {
    let (store, mut buffer) = buffered(1 << 20);
    buffer.write(0, b"abc").unwrap();
    buffer.write(8, b"def").unwrap();
    buffer.commit().unwrap();

    assert_eq!(store.contents(), b"abc\0\0\0\0\0def");
    assert_eq!(buffer.pending_bytes(), 0);
    assert_eq!(buffer.pending_chunks(), 0);
}

#[test]
fn test_size_threshold_flushes() {
    let (store, mut buffer) = buffered(16);
    buffer.write(0, &[1u8; 10]).unwrap();
    assert!(store.contents().is_empty());

    buffer.write(100, &[2u8; 10]).unwrap();
    assert_eq!(buffer.pending_bytes(), 0);
    assert_eq!(store.contents().len(), 110);
}

#[test]
fn test_timeout_flushes_on_next_access() {
    let store = MemoryAccess::new();
    let mut buffer = BufferedAccess::new(store.clone(), 1 << 20, Duration::ZERO);
    buffer.write(0, b"now").unwrap();

    assert_eq!(store.contents(), b"now");
}

#[test]
fn test_failed_flush_keeps_pending() {
    let (store, mut buffer) = buffered(1 << 20);
    buffer.write(0, b"keep").unwrap();

    store.set_fail_writes(true);
    assert!(buffer.commit().is_err());
    assert_eq!(buffer.pending_bytes(), 4);
    assert_eq!(read(&mut buffer, 0, 4), b"keep");

    store.set_fail_writes(false);
    buffer.commit().unwrap();
    assert_eq!(store.contents(), b"keep");
}

#[test]
fn test_failed_write_group_is_undone() {
    let (store, mut buffer) = buffered(0);
    buffer.write(0, b"aaaa").unwrap();
    assert_eq!(store.contents(), b"aaaa");

    store.set_fail_writes(true);
    let b: &[u8] = b"bb";
    let c: &[u8] = b"cc";
    assert!(buffer.write_group(&[(0, b), (10, c)]).is_err());
    store.set_fail_writes(false);
    assert_eq!(read(&mut buffer, 0, 4), b"aaaa");

    buffer.write_group(&[(0, b), (10, c)]).unwrap();
    assert_eq!(store.contents(), b"bbaa\0\0\0\0\0\0cc");
}

#[test]
fn test_into_inner_flushes() {
    let (_store, mut buffer) = buffered(1 << 20);
    buffer.write(2, b"in").unwrap();

    let inner = buffer.into_inner().unwrap();
    assert_eq!(inner.contents(), b"\0\0in");
}

#[test]
fn test_set_length_flushes_first() {
    let (store, mut buffer) = buffered(1 << 20);
    buffer.write(0, b"abcdef").unwrap();
    buffer.set_length(3).unwrap();

    assert_eq!(store.contents(), b"abc");
    assert_eq!(RandomAccess::length(&buffer).unwrap(), 3);
}
