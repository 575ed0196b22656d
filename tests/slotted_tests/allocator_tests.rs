//! Slotted File Allocator Tests
//!
//! Tests verify:
//! - Handles are reused from the free list before the file grows
//! - used + free == all_count after every operation
//! - Node reads and dirty-region writes
//! - Both liveness encodings
//! - A write that fails to flush leaves the allocator as it was

use std::sync::Arc;

use rowstore::io::MemoryAccess;
use rowstore::slotted::Handle;
use rowstore::{Config, Liveness, RowEntry, RowSchema, SlottedFile, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Arc<RowSchema> {
    Arc::new(RowSchema::key_value(8, 8).unwrap())
}

fn memory_file(config: &Config) -> (MemoryAccess, SlottedFile<MemoryAccess>) {
    let store = MemoryAccess::new();
    let file = SlottedFile::create(store.clone(), schema(), config).unwrap();
    (store, file)
}

fn row(key: &str, value: &str) -> RowEntry {
    RowEntry::from_columns(schema(), &[key.as_bytes(), value.as_bytes()]).unwrap()
}

fn assert_counts(file: &SlottedFile<MemoryAccess>) {
    assert_eq!(file.size() + file.free(), file.all_count());
}

/// Small deterministic generator for operation sequences
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_deleted_handle_is_reused() {
    let (_store, file) = memory_file(&Config::default());
    for i in 0..3 {
        file.new_record(Some(row(&format!("k{}", i), "v").bytes()))
            .unwrap();
    }

    file.delete_node(Handle::new(1)).unwrap();
    assert_eq!(file.free(), 1);
    assert_eq!(file.size(), 2);

    let reused = file.new_record(None).unwrap();
    assert_eq!(reused, Handle::new(1));
    assert_eq!(file.free(), 0);
    assert_eq!(file.all_count(), 3);
}

#[test]
fn test_free_list_is_lifo() {
    let (_store, file) = memory_file(&Config::default());
    for _ in 0..5 {
        file.new_record(None).unwrap();
    }
    file.delete_node(Handle::new(0)).unwrap();
    file.delete_node(Handle::new(3)).unwrap();

    assert_eq!(file.new_record(None).unwrap(), Handle::new(3));
    assert_eq!(file.new_record(None).unwrap(), Handle::new(0));
    assert_eq!(file.new_record(None).unwrap(), Handle::new(5));
}

#[test]
fn test_counts_hold_over_random_operations() {
    let (_store, file) = memory_file(&Config::default());
    let mut rng = Lcg(42);
    let mut live: Vec<Handle> = Vec::new();
    let mut deleted: Vec<Handle> = Vec::new();

    for _ in 0..2000 {
        if live.is_empty() || rng.next() % 3 != 0 {
            let free_before = file.free();
            let handle = file.new_record(None).unwrap();
            if free_before > 0 {
                assert!(deleted.contains(&handle));
                deleted.retain(|h| *h != handle);
            } else {
                assert_eq!(handle.index(), file.all_count() - 1);
            }
            live.push(handle);
        } else {
            let at = (rng.next() as usize) % live.len();
            let handle = live.swap_remove(at);
            file.delete_node(handle).unwrap();
            deleted.push(handle);
        }
        assert_counts(&file);
    }
    file.verify_free_list().unwrap();
    assert_eq!(file.live_handles().unwrap().len(), live.len());
}

#[test]
fn test_delete_twice_fails() {
    let (_store, file) = memory_file(&Config::default());
    let handle = file.new_record(None).unwrap();
    file.delete_node(handle).unwrap();

    let result = file.delete_node(handle);
    assert!(matches!(result, Err(StoreError::InvalidHandle { .. })));
    assert_counts(&file);
}

#[test]
fn test_out_of_range_handle() {
    let (_store, file) = memory_file(&Config::default());
    file.new_record(None).unwrap();

    assert!(matches!(
        file.read_node(Handle::new(1)),
        Err(StoreError::InvalidHandle {
            handle: 1,
            all_count: 1
        })
    ));
    assert!(file.read_node(Handle::NUL).is_err());
}

#[test]
fn test_wrong_payload_width() {
    let (_store, file) = memory_file(&Config::default());
    let result = file.new_record(Some(&[1u8; 3]));
    assert!(matches!(result, Err(StoreError::SchemaMismatch(_))));
    assert_eq!(file.all_count(), 0);
}

// =============================================================================
// Failed Flush Tests
// =============================================================================

/// File whose buffer flushes on every write, holding three committed rows
fn flushing_file() -> (MemoryAccess, SlottedFile<MemoryAccess>) {
    let config = Config::builder().write_buffer_bytes(0).build();
    let (store, file) = memory_file(&config);
    for i in 0..3 {
        file.new_record(Some(row(&format!("k{}", i), "v").bytes()))
            .unwrap();
    }
    file.commit().unwrap();
    (store, file)
}

#[test]
fn test_failed_delete_can_be_retried() {
    let (store, file) = flushing_file();

    store.set_fail_writes(true);
    assert!(matches!(
        file.delete_node(Handle::new(1)),
        Err(StoreError::Io(_))
    ));
    store.set_fail_writes(false);

    assert!(file.is_live(Handle::new(1)).unwrap());
    assert_eq!(file.size(), 3);
    assert_eq!(file.free(), 0);

    file.delete_node(Handle::new(1)).unwrap();
    assert_eq!(file.size(), 2);
    assert_eq!(file.free(), 1);
    file.verify_free_list().unwrap();
}

#[test]
fn test_failed_new_record_can_be_retried() {
    let (store, file) = flushing_file();

    store.set_fail_writes(true);
    assert!(file.new_record(Some(row("k3", "v").bytes())).is_err());
    store.set_fail_writes(false);
    assert_eq!(file.all_count(), 3);
    assert_counts(&file);

    let handle = file.new_record(Some(row("k3", "v").bytes())).unwrap();
    assert_eq!(handle, Handle::new(3));
    assert_eq!(file.read_row(handle).unwrap(), row("k3", "v"));
    file.verify_free_list().unwrap();
}

#[test]
fn test_failed_write_row_keeps_old_payload() {
    let (store, file) = flushing_file();

    store.set_fail_writes(true);
    assert!(file.write_row(Handle::new(2), &row("k2", "new")).is_err());
    store.set_fail_writes(false);

    assert_eq!(file.read_row(Handle::new(2)).unwrap(), row("k2", "v"));
}

// =============================================================================
// Verification Tests
// =============================================================================

#[test]
fn test_verify_detects_unaccounted_dead_slot() {
    let (store, file) = flushing_file();
    let layout = file.layout();
    drop(file);

    // Tombstone slot 1 behind the header's back
    let mut bytes = store.contents();
    bytes[layout.slot_offset(Handle::new(1)) as usize] |= 0x01;
    let damaged =
        SlottedFile::open(MemoryAccess::from_bytes(bytes), schema(), &Config::default()).unwrap();

    assert_eq!(damaged.size(), 3);
    assert!(matches!(
        damaged.verify_free_list(),
        Err(StoreError::CorruptRecord(_))
    ));
}

// =============================================================================
// Record Access Tests
// =============================================================================

#[test]
fn test_row_read_write() {
    let (_store, file) = memory_file(&Config::default());
    let handle = file.new_record(Some(row("alpha", "one").bytes())).unwrap();
    assert_eq!(file.read_row(handle).unwrap(), row("alpha", "one"));

    file.write_row(handle, &row("alpha", "two")).unwrap();
    assert_eq!(file.read_row(handle).unwrap().col_string(1), "two");
}

#[test]
fn test_deleted_row_is_unreadable() {
    let (_store, file) = memory_file(&Config::default());
    let handle = file.new_record(Some(row("gone", "x").bytes())).unwrap();
    file.delete_node(handle).unwrap();

    assert!(!file.is_live(handle).unwrap());
    assert!(matches!(
        file.read_row(handle),
        Err(StoreError::InvalidHandle { .. })
    ));
    assert!(file.write_row(handle, &row("gone", "y")).is_err());
}

#[test]
fn test_node_overhead_handles() {
    let config = Config::builder().overhead_handles(3).build();
    let (_store, file) = memory_file(&config);
    let handle = file.new_record(None).unwrap();

    let mut node = file.read_node(handle).unwrap();
    assert!(node.ohhandle(2).is_nul());
    node.set_ohhandle(2, Handle::new(77));
    assert!(node.is_overhead_dirty());
    assert!(!node.is_payload_dirty());
    file.write_node(&mut node).unwrap();
    assert!(!node.is_overhead_dirty());

    let reread = file.read_node(handle).unwrap();
    assert_eq!(reread.ohhandle(2), Handle::new(77));
    assert_eq!(reread.payload(), &[0u8; 16]);
}

#[test]
fn test_write_node_only_payload() {
    let (store, file) = memory_file(&Config::default());
    let handle = file.new_record(None).unwrap();
    file.commit().unwrap();
    let before = store.contents();

    let mut node = file.read_node(handle).unwrap();
    node.set_payload(row("p", "q").bytes()).unwrap();
    file.write_node(&mut node).unwrap();
    file.commit().unwrap();
    let after = store.contents();

    let layout = file.layout();
    let payload_at = layout.payload_offset(handle) as usize;
    assert_eq!(before[..payload_at], after[..payload_at]);
    assert_eq!(&after[payload_at..payload_at + 16], row("p", "q").bytes());
}

#[test]
fn test_write_node_cannot_tombstone() {
    let (_store, file) = memory_file(&Config::default());
    let handle = file.new_record(None).unwrap();

    let mut node = file.read_node(handle).unwrap();
    node.set_overhead_byte(0, 0x01);
    assert!(matches!(
        file.write_node(&mut node),
        Err(StoreError::CorruptRecord(_))
    ));
    assert!(file.is_live(handle).unwrap());
}

#[test]
fn test_set_payload_wrong_length() {
    let (_store, file) = memory_file(&Config::default());
    let handle = file.new_record(None).unwrap();
    let mut node = file.read_node(handle).unwrap();
    assert!(node.set_payload(&[1, 2, 3]).is_err());
}

// =============================================================================
// Legacy Liveness Tests
// =============================================================================

#[test]
fn test_legacy_liveness() {
    let config = Config::builder()
        .liveness(Liveness::Legacy)
        .overhead_bytes(0)
        .build();
    let (_store, file) = memory_file(&config);
    assert_eq!(file.layout().overhead_size(), 4);

    let live = file.new_record(Some(row("live", "v").bytes())).unwrap();
    let blank = file.new_record(None).unwrap();
    assert!(file.is_live(live).unwrap());
    assert!(!file.is_live(blank).unwrap());

    file.delete_node(live).unwrap();
    assert!(!file.is_live(live).unwrap());
    let node = file.read_node(live).unwrap();
    assert_eq!(&node.payload()[..2], &[0x80, 0x00]);
    assert_eq!(file.new_record(None).unwrap(), live);
}

#[test]
fn test_legacy_rejects_blank_delete() {
    let config = Config::builder().liveness(Liveness::Legacy).build();
    let (_store, file) = memory_file(&config);
    let blank = file.new_record(None).unwrap();

    assert!(matches!(
        file.delete_node(blank),
        Err(StoreError::InvalidHandle { .. })
    ));
}

#[test]
fn test_legacy_rejects_rows_that_read_as_deleted() {
    let config = Config::builder().liveness(Liveness::Legacy).build();
    let (_store, file) = memory_file(&config);

    let mut zero_led = row("k", "v").into_bytes();
    zero_led[0] = 0;
    assert!(matches!(
        file.new_record(Some(zero_led.as_slice())),
        Err(StoreError::SchemaMismatch(_))
    ));
    let mut marker_led = row("k", "v").into_bytes();
    marker_led[..2].copy_from_slice(&[0x80, 0x00]);
    assert!(matches!(
        file.new_record(Some(marker_led.as_slice())),
        Err(StoreError::SchemaMismatch(_))
    ));
    assert_eq!(file.all_count(), 0);

    let handle = file.new_record(Some(row("k", "v").bytes())).unwrap();
    let blank = RowEntry::new(schema());
    assert!(matches!(
        file.write_row(handle, &blank),
        Err(StoreError::SchemaMismatch(_))
    ));
    assert_eq!(file.read_row(handle).unwrap(), row("k", "v"));
}

#[test]
fn test_legacy_write_to_freed_slot_fails() {
    let config = Config::builder().liveness(Liveness::Legacy).build();
    let (_store, file) = memory_file(&config);
    let handle = file.new_record(Some(row("k", "v").bytes())).unwrap();
    file.delete_node(handle).unwrap();

    assert!(matches!(
        file.write_row(handle, &row("k", "w")),
        Err(StoreError::InvalidHandle { .. })
    ));
    file.verify_free_list().unwrap();
    assert_eq!(file.new_record(None).unwrap(), handle);
}

#[test]
fn test_oversized_overhead_rejected() {
    let config = Config::builder().overhead_bytes(70_000).build();
    let result = SlottedFile::create(MemoryAccess::new(), schema(), &config);
    assert!(matches!(result, Err(StoreError::Config(_))));

    let config = Config::builder().overhead_handles(1 << 16).build();
    assert!(matches!(config.validate(), Err(StoreError::Config(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::builder().overhead_handles(0).build();
    let result = SlottedFile::create(MemoryAccess::new(), schema(), &config);
    assert!(matches!(result, Err(StoreError::Config(_))));
}
