//! RowSet Tests
//!
//! Tests verify:
//! - Keyed operations through the Index contract
//! - Lazy re-sort on lookup
//! - Deferred (marked) removal and its resolution
//! - Iteration order and concurrent-modification detection
//! - Shared use from several threads

use std::sync::Arc;
use std::thread;

use rowstore::{Column, Config, Index, RowEntry, RowSchema, RowSet, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

fn counter_schema() -> Arc<RowSchema> {
    Arc::new(
        RowSchema::new(
            vec![Column::binary("name", 12), Column::numeric("count", 4)],
            Default::default(),
            0,
        )
        .unwrap(),
    )
}

fn counter(schema: &Arc<RowSchema>, name: &str, count: u64) -> RowEntry {
    let mut entry = RowEntry::new(Arc::clone(schema));
    entry.set_col(0, name.as_bytes()).unwrap();
    entry.set_col_long(1, count).unwrap();
    entry
}

fn numbered(schema: &Arc<RowSchema>, i: u64) -> RowEntry {
    counter(schema, &format!("k{:08}", (i * 7919) % 100_003), i)
}

fn collect_names(set: &RowSet, ascending: bool) -> Vec<String> {
    set.rows(ascending, None)
        .unwrap()
        .map(|row| row.unwrap().col_string(0))
        .collect()
}

// =============================================================================
// Keyed Operation Tests
// =============================================================================

#[test]
fn test_put_get_remove() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));

    set.put(counter(&schema, "aaaaaaaaaaaa", 1)).unwrap();
    set.put(counter(&schema, "aaaaaaaaaaab", 2)).unwrap();
    set.put(counter(&schema, "aaaaaaaaaaac", 3)).unwrap();
    assert_eq!(set.size(), 3);

    let found = set.get(b"aaaaaaaaaaab").unwrap().unwrap();
    assert_eq!(found.col_long(1), 2);

    set.remove(b"aaaaaaaaaaab").unwrap();
    assert_eq!(set.size(), 2);
    assert!(set.get(b"aaaaaaaaaaab").unwrap().is_none());
}

#[test]
fn test_put_replaces_and_returns_previous() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));

    assert!(set.put(counter(&schema, "apple", 1)).unwrap().is_none());
    let previous = set.put(counter(&schema, "apple", 5)).unwrap().unwrap();

    assert_eq!(previous.col_long(1), 1);
    assert_eq!(set.size(), 1);
    assert_eq!(set.get(b"apple").unwrap().unwrap().col_long(1), 5);
}

#[test]
fn test_short_keys_are_padded() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    set.put(counter(&schema, "abc", 9)).unwrap();

    let mut padded = b"abc".to_vec();
    padded.resize(12, 0);
    assert!(set.has(b"abc").unwrap());
    assert!(set.has(&padded).unwrap());
    assert!(set.get(&[b'x'; 13]).is_err());
}

#[test]
fn test_add_unique_rejects_duplicate() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    set.add_unique(counter(&schema, "dup", 1)).unwrap();

    let result = set.add_unique(counter(&schema, "dup", 2));
    assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
    assert_eq!(set.get(b"dup").unwrap().unwrap().col_long(1), 1);
}

#[test]
fn test_wrong_width_row_rejected() {
    let schema = counter_schema();
    let other = Arc::new(RowSchema::key_value(4, 4).unwrap());
    let set = RowSet::new(schema);

    let row = RowEntry::from_columns(other, &[b"k", b"v"]).unwrap();
    assert!(matches!(set.put(row), Err(StoreError::SchemaMismatch(_))));
}

#[test]
fn test_find_every_inserted_key() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    let rows: Vec<RowEntry> = (0..500).map(|i| numbered(&schema, i)).collect();
    for row in &rows {
        set.put(row.clone()).unwrap();
    }

    for row in &rows {
        let index = set.find(row.key()).unwrap().unwrap();
        assert_eq!(set.row_at(index).unwrap().key(), row.key());
    }
    assert!(set.find(b"never").unwrap().is_none());
}

#[test]
fn test_remove_one_drains() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for i in 0..20 {
        set.put(numbered(&schema, i)).unwrap();
    }

    let mut drained = 0;
    while set.remove_one().unwrap().is_some() {
        drained += 1;
    }
    assert_eq!(drained, 20);
    assert!(set.is_empty());
}

// =============================================================================
// Re-sort Tests
// =============================================================================

#[test]
fn test_lookup_triggers_resort() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for i in 0..1000 {
        set.add(&numbered(&schema, i)).unwrap();
    }
    assert_eq!(set.sort_bound(), 0);

    let wanted = numbered(&schema, 500);
    let found = set.find(wanted.key()).unwrap();

    assert!(found.is_some());
    assert_eq!(set.sort_bound(), set.chunk_count());
    assert_eq!(set.size(), 1000);
}

#[test]
fn test_small_unsorted_suffix_is_scanned() {
    let schema = counter_schema();
    let config = Config::builder().resort_limit(90).build();
    let set = RowSet::with_config(Arc::clone(&schema), &config);
    for i in 0..50 {
        set.add(&numbered(&schema, i)).unwrap();
    }

    assert!(set.find(numbered(&schema, 7).key()).unwrap().is_some());
    assert_eq!(set.sort_bound(), 0);
}

#[test]
fn test_shape_folds_duplicates() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    set.add(&counter(&schema, "b", 1)).unwrap();
    set.add(&counter(&schema, "a", 1)).unwrap();
    set.add(&counter(&schema, "b", 2)).unwrap();

    set.shape();
    assert_eq!(set.size(), 2);
    assert_eq!(set.chunk_count(), 2);
    assert_eq!(collect_names(&set, true), vec!["a", "b"]);
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn test_sorted_removal_is_marked() {
    let schema = counter_schema();
    let config = Config::builder().remove_bound(10).build();
    let set = RowSet::with_config(Arc::clone(&schema), &config);
    for i in 0..30 {
        set.add(&numbered(&schema, i)).unwrap();
    }
    set.shape();

    set.remove_marked(numbered(&schema, 3).key()).unwrap().unwrap();
    assert_eq!(set.marked_count(), 1);
    assert_eq!(set.chunk_count(), 30);
    assert_eq!(set.size(), 29);
    assert!(set.get(numbered(&schema, 3).key()).unwrap().is_none());
}

#[test]
fn test_marks_resolve_past_remove_bound() {
    let schema = counter_schema();
    let config = Config::builder().remove_bound(4).build();
    let set = RowSet::with_config(Arc::clone(&schema), &config);
    for i in 0..30 {
        set.add(&numbered(&schema, i)).unwrap();
    }
    set.shape();

    for i in 0..4 {
        set.remove(numbered(&schema, i).key()).unwrap();
    }
    assert_eq!(set.marked_count(), 4);

    set.remove(numbered(&schema, 4).key()).unwrap();
    assert_eq!(set.marked_count(), 0);
    assert_eq!(set.chunk_count(), 25);
    assert_eq!(set.size(), 25);
}

#[test]
fn test_marked_key_can_be_readded() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for name in ["a", "b", "c"] {
        set.add(&counter(&schema, name, 1)).unwrap();
    }
    set.shape();

    set.remove(b"b").unwrap();
    set.put(counter(&schema, "b", 7)).unwrap();

    assert_eq!(set.size(), 3);
    assert_eq!(set.get(b"b").unwrap().unwrap().col_long(1), 7);
    assert_eq!(collect_names(&set, true), vec!["a", "b", "c"]);
}

#[test]
fn test_remove_shift() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for name in ["a", "b", "c", "d"] {
        set.add(&counter(&schema, name, 1)).unwrap();
    }
    set.shape();
    set.remove_marked(b"a").unwrap();

    let removed = set.remove_shift(b"c").unwrap().unwrap();
    assert_eq!(removed.col_string(0), "c");
    assert_eq!(set.marked_count(), 0);
    assert_eq!(set.chunk_count(), 2);
    assert!(set.remove_shift(b"zz").unwrap().is_none());
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_rows_in_both_directions() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for name in ["m", "c", "x", "a"] {
        set.put(counter(&schema, name, 0)).unwrap();
    }

    assert_eq!(collect_names(&set, true), vec!["a", "c", "m", "x"]);
    assert_eq!(collect_names(&set, false), vec!["x", "m", "c", "a"]);
}

#[test]
fn test_keys_from_start_key() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for name in ["a", "c", "e", "g"] {
        set.put(counter(&schema, name, 0)).unwrap();
    }

    let ascending: Vec<Vec<u8>> = set
        .keys(true, Some(b"d"))
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(ascending.len(), 2);
    assert_eq!(&ascending[0][..1], b"e");
    assert_eq!(ascending[0].len(), 12);

    let descending: Vec<Vec<u8>> = set
        .keys(false, Some(b"c"))
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(descending.len(), 2);
    assert_eq!(&descending[0][..1], b"c");
    assert_eq!(&descending[1][..1], b"a");
}

#[test]
fn test_structural_change_ends_iteration() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for name in ["a", "b", "c"] {
        set.put(counter(&schema, name, 0)).unwrap();
    }

    let mut rows = set.rows(true, None).unwrap();
    assert!(rows.next().unwrap().is_ok());
    set.put(counter(&schema, "d", 0)).unwrap();

    let next = rows.next().unwrap();
    assert!(matches!(next, Err(StoreError::ConcurrentModification(_))));
    assert!(rows.next().is_none());
}

#[test]
fn test_update_in_place_keeps_iterating() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    for name in ["a", "b", "c"] {
        set.put(counter(&schema, name, 0)).unwrap();
    }

    let mut rows = set.rows(true, None).unwrap();
    rows.next().unwrap().unwrap();
    set.put(counter(&schema, "b", 42)).unwrap();

    let b = rows.next().unwrap().unwrap();
    assert_eq!(b.col_long(1), 42);
    assert_eq!(rows.next().unwrap().unwrap().col_string(0), "c");
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_add_unique() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let set = set.clone();
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let mut won = 0;
                for i in 0..200 {
                    if set.add_unique(numbered(&schema, i)).is_ok() {
                        won += 1;
                    }
                }
                won
            })
        })
        .collect();

    let won: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(won, 200);
    assert_eq!(set.size(), 200);
}

#[test]
fn test_profile_counts_operations() {
    let schema = counter_schema();
    let set = RowSet::new(Arc::clone(&schema));
    set.put(counter(&schema, "a", 1)).unwrap();
    set.put(counter(&schema, "b", 1)).unwrap();
    set.get(b"a").unwrap();
    set.remove(b"b").unwrap();

    let profile = set.profile();
    assert_eq!(profile.writes, 2);
    assert_eq!(profile.reads, 1);
    assert_eq!(profile.deletes, 1);
}
