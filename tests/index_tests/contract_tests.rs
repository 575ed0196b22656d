//! Index Contract Tests
//!
//! Every backend runs the same scenarios through `&dyn Index`:
//! - put/get/remove and size bookkeeping
//! - add_unique duplicate rejection
//! - ordered scans in both directions, from a start key
//! - draining with remove_one

use std::sync::Arc;

use rowstore::{
    BufferedIndex, CachedIndex, Config, Index, PartitionedIndex, RowSet, SlottedTable, StoreError,
};
use tempfile::TempDir;

use super::{counter, counter_schema, name};

// =============================================================================
// Scenarios
// =============================================================================

fn check_keyed_operations(index: &dyn Index) {
    let schema = Arc::clone(index.schema());
    index.put(counter(&schema, "aaaaaaaaaaaa", 1)).unwrap();
    index.put(counter(&schema, "aaaaaaaaaaab", 2)).unwrap();
    index.put(counter(&schema, "aaaaaaaaaaac", 3)).unwrap();
    assert_eq!(index.size(), 3);
    assert_eq!(index.get(b"aaaaaaaaaaab").unwrap().unwrap().col_long(1), 2);

    let removed = index.remove(b"aaaaaaaaaaab").unwrap().unwrap();
    assert_eq!(removed.col_long(1), 2);
    assert_eq!(index.size(), 2);
    assert!(index.get(b"aaaaaaaaaaab").unwrap().is_none());
    assert!(index.remove(b"aaaaaaaaaaab").unwrap().is_none());

    let previous = index.put(counter(&schema, "aaaaaaaaaaaa", 10)).unwrap();
    assert_eq!(previous.unwrap().col_long(1), 1);
    assert_eq!(index.size(), 2);
    assert!(index.has(b"aaaaaaaaaaaa").unwrap());
    assert!(!index.has(b"zzz").unwrap());
}

fn check_add_unique(index: &dyn Index) {
    let schema = Arc::clone(index.schema());
    index.add_unique(counter(&schema, "once", 1)).unwrap();
    let result = index.add_unique(counter(&schema, "once", 2));
    assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
    assert_eq!(index.get(b"once").unwrap().unwrap().col_long(1), 1);
    assert_eq!(index.size(), 1);
}

fn check_scans(index: &dyn Index) {
    let schema = Arc::clone(index.schema());
    for n in [5, 1, 9, 3, 7] {
        index.put(counter(&schema, &name(n), n)).unwrap();
    }

    let ascending: Vec<u64> = index
        .rows(true, None)
        .unwrap()
        .map(|r| r.unwrap().col_long(1))
        .collect();
    assert_eq!(ascending, vec![1, 3, 5, 7, 9]);

    let descending: Vec<u64> = index
        .rows(false, Some(name(6).as_bytes()))
        .unwrap()
        .map(|r| r.unwrap().col_long(1))
        .collect();
    assert_eq!(descending, vec![5, 3, 1]);

    let keys: Vec<Vec<u8>> = index
        .keys(true, Some(name(7).as_bytes()))
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].len(), 12);
    assert_eq!(&keys[0][..7], name(7).as_bytes());
}

fn check_drain(index: &dyn Index) {
    let schema = Arc::clone(index.schema());
    for n in 0..25 {
        index.put(counter(&schema, &name(n), n)).unwrap();
    }
    let mut seen = Vec::new();
    while let Some(row) = index.remove_one().unwrap() {
        seen.push(row.col_long(1));
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..25).collect::<Vec<_>>());
    assert!(index.is_empty());
    assert_eq!(index.rows(true, None).unwrap().count(), 0);
}

fn check_schema_mismatch(index: &dyn Index) {
    let other = Arc::new(rowstore::RowSchema::key_value(12, 8).unwrap());
    let row = rowstore::RowEntry::from_columns(other, &[b"k".as_slice(), b"v".as_slice()]).unwrap();
    assert!(matches!(
        index.put(row),
        Err(StoreError::SchemaMismatch(_))
    ));
}

fn run_all(make: &dyn Fn(&TempDir) -> Box<dyn Index>) {
    let scenarios: [fn(&dyn Index); 5] = [
        check_keyed_operations,
        check_add_unique,
        check_scans,
        check_drain,
        check_schema_mismatch,
    ];
    for scenario in scenarios {
        let dir = TempDir::new().unwrap();
        let index = make(&dir);
        scenario(index.as_ref());
        index.close().unwrap();
    }
}

fn small_config() -> Config {
    Config::builder()
        .hot_max_entries(4)
        .partition_max_records(3)
        .cache_max_entries(2)
        .build()
}

// =============================================================================
// Backend Tests
// =============================================================================

#[test]
fn test_rowset_contract() {
    run_all(&|_dir| Box::new(RowSet::new(counter_schema())));
}

#[test]
fn test_slotted_table_contract() {
    run_all(&|dir| {
        Box::new(
            SlottedTable::open(&dir.path().join("t.tbl"), counter_schema(), &Config::default())
                .unwrap(),
        )
    });
}

#[test]
fn test_partitioned_contract() {
    run_all(&|dir| {
        Box::new(PartitionedIndex::open(dir.path(), "part", counter_schema(), &small_config()).unwrap())
    });
}

#[test]
fn test_buffered_over_rowset_contract() {
    run_all(&|_dir| {
        Box::new(BufferedIndex::new(RowSet::new(counter_schema()), &small_config()).unwrap())
    });
}

#[test]
fn test_buffered_over_table_contract() {
    run_all(&|dir| {
        let config = small_config();
        let table =
            SlottedTable::open(&dir.path().join("cold.tbl"), counter_schema(), &config).unwrap();
        Box::new(BufferedIndex::new(table, &config).unwrap())
    });
}

#[test]
fn test_cached_contract() {
    run_all(&|dir| {
        let config = small_config();
        let table =
            SlottedTable::open(&dir.path().join("cached.tbl"), counter_schema(), &config).unwrap();
        Box::new(CachedIndex::new(table, &config))
    });
}

#[test]
fn test_full_stack_contract() {
    run_all(&|dir| {
        let config = small_config();
        let partitioned =
            PartitionedIndex::open(dir.path(), "stack", counter_schema(), &config).unwrap();
        let buffered = BufferedIndex::new(partitioned, &config).unwrap();
        Box::new(CachedIndex::new(buffered, &config))
    });
}
