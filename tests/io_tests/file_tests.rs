//! FileAccess Tests

use std::time::Duration;

use rowstore::io::{BufferedAccess, FileAccess, RandomAccess};
use tempfile::TempDir;

#[test]
fn test_file_write_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.bin");
    let mut file = FileAccess::open(&path).unwrap();

    file.write_at(4, b"data").unwrap();
    let mut buf = [0u8; 8];
    file.read_at(0, &mut buf).unwrap();

    assert_eq!(&buf, b"\0\0\0\0data");
    assert_eq!(file.length().unwrap(), 8);
}

#[test]
fn test_file_read_past_end_fails() {
    let dir = TempDir::new().unwrap();
    let mut file = FileAccess::open(&dir.path().join("short.bin")).unwrap();
    file.write_at(0, b"ab").unwrap();

    let mut buf = [0u8; 3];
    assert!(file.read_at(0, &mut buf).is_err());
}

#[test]
fn test_open_existing_requires_file() {
    let dir = TempDir::new().unwrap();
    assert!(FileAccess::open_existing(&dir.path().join("missing.bin")).is_err());
}

#[test]
fn test_buffered_file_persists_after_commit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("buffered.bin");
    {
        let file = FileAccess::open(&path).unwrap();
        let mut buffer = BufferedAccess::new(file, 1 << 20, Duration::from_secs(60));
        buffer.write(0, b"first").unwrap();
        buffer.write(5, b"second").unwrap();
        buffer.commit().unwrap();
    }

    let mut file = FileAccess::open_existing(&path).unwrap();
    let mut buf = [0u8; 11];
    file.read_at(0, &mut buf).unwrap();
    assert_eq!(&buf, b"firstsecond");
}

#[test]
fn test_set_length_truncates_and_grows() {
    let dir = TempDir::new().unwrap();
    let mut file = FileAccess::open(&dir.path().join("len.bin")).unwrap();
    file.write_at(0, b"abcdef").unwrap();

    file.set_length(2).unwrap();
    assert_eq!(file.length().unwrap(), 2);
    file.set_length(5).unwrap();

    let mut buf = [9u8; 5];
    file.read_at(0, &mut buf).unwrap();
    assert_eq!(&buf, b"ab\0\0\0");
}
