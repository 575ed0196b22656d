//! RowSet
//!
//! Keyed, lock-protected RowCollection. Used as cache, as the in-memory
//! handle index of slotted tables, and as a complete index backend.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{display_key, Result, StoreError};
use crate::index::{Index, KeyIter, RowIter};
use crate::profile::{Profile, ProfileCounters};
use crate::row::{RowEntry, RowSchema};

use super::RowCollection;

/// Sorted, searchable set of fixed-width records keyed by the primary key.
///
/// ## Concurrency
/// All state sits behind one `Mutex`; every read-modify-write sequence
/// (find-then-insert, find-then-mark) runs under a single acquisition.
/// Cloning a `RowSet` yields another handle to the same set.
///
/// ## Deferred removal
/// Removing a record from the sorted prefix only marks its index; marked
/// records are invisible to lookups and are folded out in one shifting pass
/// once more than `remove_bound` are pending, or before any reordering.
#[derive(Clone)]
pub struct RowSet {
    schema: Arc<RowSchema>,
    state: Arc<Mutex<SetState>>,
    profile: Arc<ProfileCounters>,
    resort_limit: usize,
    remove_bound: usize,
}

struct SetState {
    rows: RowCollection,
    removed: BTreeSet<usize>,
    /// Bumped on every structural change; iterators compare against it
    modcount: u64,
}

impl RowSet {
    /// Create an empty set with default tuning
    pub fn new(schema: Arc<RowSchema>) -> Self {
        Self::with_config(schema, &Config::default())
    }

    pub fn with_config(schema: Arc<RowSchema>, config: &Config) -> Self {
        let rows = RowCollection::new(Arc::clone(&schema));
        Self::build(rows, config)
    }

    /// Take over an existing collection (for bulk loads followed by `shape`)
    pub fn from_collection(rows: RowCollection, config: &Config) -> Self {
        Self::build(rows, config)
    }

    fn build(rows: RowCollection, config: &Config) -> Self {
        Self {
            schema: Arc::clone(rows.schema()),
            state: Arc::new(Mutex::new(SetState {
                rows,
                removed: BTreeSet::new(),
                modcount: 0,
            })),
            profile: Arc::new(ProfileCounters::new()),
            resort_limit: config.resort_limit,
            remove_bound: config.remove_bound.max(1),
        }
    }

    // =========================================================================
    // Keyed Operations
    // =========================================================================

    /// Index of the record with `key`, if present and not marked removed
    pub fn find(&self, key: &[u8]) -> Result<Option<usize>> {
        let key = self.schema.normalize_key(key)?;
        let mut state = self.state.lock();
        Ok(state.locate(&key, self.resort_limit))
    }

    /// Append without a uniqueness check; duplicates are folded by `shape`
    pub fn add(&self, entry: &RowEntry) -> Result<()> {
        self.check_schema(entry)?;
        let mut state = self.state.lock();
        state.rows.add(entry)?;
        state.modcount += 1;
        Ok(())
    }

    /// Remove `key` by marking its slot (sorted prefix) or by swapping in the
    /// last record (unsorted suffix)
    pub fn remove_marked(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let started = Instant::now();
        let key = self.schema.normalize_key(key)?;
        let mut state = self.state.lock();
        let Some(index) = state.locate(&key, self.resort_limit) else {
            return Ok(None);
        };
        let removed = state.rows.get(index)?;
        if index < state.rows.sort_bound() {
            state.removed.insert(index);
            if state.removed.len() > self.remove_bound || state.removed.len() >= state.rows.len() {
                state.resolve_marked();
            }
        } else {
            state.rows.remove_row(index)?;
        }
        state.modcount += 1;
        drop(state);
        self.profile.record_delete(started);
        Ok(Some(removed))
    }

    /// Remove `key` with an immediate shift
    pub fn remove_shift(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let started = Instant::now();
        let key = self.schema.normalize_key(key)?;
        let mut state = self.state.lock();
        state.resolve_marked();
        let Some(index) = state.locate(&key, self.resort_limit) else {
            return Ok(None);
        };
        let removed = state.rows.remove_row(index)?;
        state.modcount += 1;
        drop(state);
        self.profile.record_delete(started);
        Ok(Some(removed))
    }

    /// Fold marked removals out of the collection
    pub fn resolve_marked_removed(&self) {
        self.state.lock().resolve_marked();
    }

    /// Bring the set into canonical form: no marks, fully sorted, unique keys
    pub fn shape(&self) {
        let mut state = self.state.lock();
        state.resolve_marked();
        state.rows.sort();
        let dropped = state.rows.uniq();
        if dropped > 0 {
            tracing::debug!(dropped, "RowSet shape removed duplicate keys");
        }
        state.modcount += 1;
    }

    /// Sort the unsorted suffix
    pub fn sort(&self) {
        self.state.lock().sort();
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.rows.clear();
        state.removed.clear();
        state.modcount += 1;
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Physical record count, including records marked removed
    pub fn chunk_count(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn sort_bound(&self) -> usize {
        self.state.lock().rows.sort_bound()
    }

    pub fn marked_count(&self) -> usize {
        self.state.lock().removed.len()
    }

    /// Copy of the record at physical position `index`
    pub fn row_at(&self, index: usize) -> Result<RowEntry> {
        self.state.lock().rows.get(index)
    }

    pub fn profile(&self) -> Profile {
        self.profile.snapshot()
    }

    /// Copy of the live records as a plain collection, in canonical order
    pub fn to_collection(&self) -> RowCollection {
        let mut state = self.state.lock();
        state.resolve_marked();
        state.sort();
        state.rows.clone()
    }

    fn check_schema(&self, entry: &RowEntry) -> Result<()> {
        if entry.bytes().len() != self.schema.objectsize() {
            return Err(StoreError::length(
                "row",
                self.schema.objectsize(),
                entry.bytes().len(),
            ));
        }
        Ok(())
    }

    /// Ordered cursor over the records, starting at `start` (inclusive)
    fn cursor(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowSetCursor> {
        let start = start.map(|k| self.schema.normalize_key(k)).transpose()?;
        let mut state = self.state.lock();
        state.resolve_marked();
        state.sort();

        let len = state.rows.len();
        let position = match (&start, ascending) {
            (None, true) => 0,
            (None, false) => len,
            (Some(key), true) => state.rows.lower_bound(key),
            (Some(key), false) => state.rows.upper_bound(key),
        };
        Ok(RowSetCursor {
            state: Arc::clone(&self.state),
            position,
            ascending,
            expected: state.modcount,
            done: false,
        })
    }
}

impl SetState {
    fn locate(&mut self, key: &[u8], resort_limit: usize) -> Option<usize> {
        if self.rows.len() - self.rows.sort_bound() > resort_limit {
            tracing::trace!(
                unsorted = self.rows.len() - self.rows.sort_bound(),
                "RowSet re-sort triggered by lookup"
            );
            self.sort();
        }
        // A marked record may have been re-added to the unsorted suffix
        match self.rows.find_sorted(key) {
            Some(index) if !self.removed.contains(&index) => Some(index),
            _ => self.rows.find_unsorted(key),
        }
    }

    /// Marked indices refer to positions, so they are resolved before sorting
    fn sort(&mut self) {
        if self.rows.is_sorted() {
            return;
        }
        self.resolve_marked();
        self.rows.sort();
        self.modcount += 1;
    }

    fn resolve_marked(&mut self) {
        if self.removed.is_empty() {
            return;
        }
        self.rows.remove_rows(&self.removed);
        self.removed.clear();
        self.modcount += 1;
    }
}

// =============================================================================
// Index Implementation
// =============================================================================

impl Index for RowSet {
    fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let started = Instant::now();
        let key = self.schema.normalize_key(key)?;
        let mut state = self.state.lock();
        let found = match state.locate(&key, self.resort_limit) {
            Some(index) => Some(state.rows.get(index)?),
            None => None,
        };
        drop(state);
        self.profile.record_read(started);
        Ok(found)
    }

    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>> {
        self.check_schema(&entry)?;
        let started = Instant::now();
        let mut state = self.state.lock();
        let previous = match state.locate(entry.key(), self.resort_limit) {
            Some(index) => {
                let previous = state.rows.get(index)?;
                state.rows.set(index, &entry)?;
                Some(previous)
            }
            None => {
                state.rows.add(&entry)?;
                state.modcount += 1;
                None
            }
        };
        drop(state);
        self.profile.record_write(started);
        Ok(previous)
    }

    fn add_unique(&self, entry: RowEntry) -> Result<()> {
        self.check_schema(&entry)?;
        let started = Instant::now();
        let mut state = self.state.lock();
        if let Some(index) = state.locate(entry.key(), self.resort_limit) {
            return Err(StoreError::DuplicateKey(format!(
                "'{}' already stored at index {}",
                display_key(entry.key()),
                index
            )));
        }
        state.rows.add(&entry)?;
        state.modcount += 1;
        drop(state);
        self.profile.record_write(started);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        self.remove_marked(key)
    }

    fn remove_one(&self) -> Result<Option<RowEntry>> {
        let started = Instant::now();
        let mut state = self.state.lock();
        state.resolve_marked();
        if state.rows.is_empty() {
            return Ok(None);
        }
        let last = state.rows.len() - 1;
        let removed = state.rows.remove_row(last)?;
        state.modcount += 1;
        drop(state);
        self.profile.record_delete(started);
        Ok(Some(removed))
    }

    fn size(&self) -> usize {
        let state = self.state.lock();
        state.rows.len() - state.removed.len()
    }

    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter> {
        let cursor = self.cursor(ascending, start)?;
        Ok(Box::new(cursor.map(|row| row.map(|entry| entry.key().to_vec()))))
    }

    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter> {
        Ok(Box::new(self.cursor(ascending, start)?))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Iterator over a RowSet that stops with `ConcurrentModification` when the
/// set is structurally changed while iterating. Updates of existing records
/// in place are visible and do not end the iteration.
struct RowSetCursor {
    state: Arc<Mutex<SetState>>,
    /// Next index to yield (ascending) or one past it (descending)
    position: usize,
    ascending: bool,
    expected: u64,
    done: bool,
}

impl Iterator for RowSetCursor {
    type Item = Result<RowEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let state = self.state.lock();
        if state.modcount != self.expected {
            self.done = true;
            return Some(Err(StoreError::ConcurrentModification(format!(
                "row set changed during iteration at position {}",
                self.position
            ))));
        }

        let index = if self.ascending {
            if self.position >= state.rows.len() {
                self.done = true;
                return None;
            }
            self.position += 1;
            self.position - 1
        } else {
            if self.position == 0 {
                self.done = true;
                return None;
            }
            self.position -= 1;
            self.position
        };
        Some(state.rows.get(index))
    }
}
