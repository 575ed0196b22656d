//! RowCollection
//!
//! Growable flat array of fixed-width records with a sorted prefix.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::row::{RowEntry, RowSchema};

use super::sort;

/// Minimum number of records reserved on first growth
const MIN_GROWTH: usize = 16;

/// Contiguous buffer of `chunkcount` records.
///
/// Records `[0, sort_bound)` are sorted by the sort column under the schema's
/// order; records appended afterwards are unsorted until the next `sort()`.
/// All methods take `&mut self`; shared use goes through [`super::RowSet`].
#[derive(Debug, Clone)]
pub struct RowCollection {
    schema: Arc<RowSchema>,
    chunks: Vec<u8>,
    chunkcount: usize,
    sort_bound: usize,
    sort_column: usize,
}

impl RowCollection {
    /// Empty collection sorted by the primary key
    pub fn new(schema: Arc<RowSchema>) -> Self {
        Self::with_capacity(schema, 0)
    }

    pub fn with_capacity(schema: Arc<RowSchema>, records: usize) -> Self {
        let sort_column = schema.primary_key();
        let chunks = Vec::with_capacity(records * schema.objectsize());
        Self {
            schema,
            chunks,
            chunkcount: 0,
            sort_bound: 0,
            sort_column,
        }
    }

    /// Wrap a buffer of whole records; `sorted` declares it already in order
    pub fn from_bytes(schema: Arc<RowSchema>, bytes: Vec<u8>, sorted: bool) -> Result<Self> {
        let width = schema.objectsize();
        if bytes.len() % width != 0 {
            return Err(StoreError::SchemaMismatch(format!(
                "buffer of {} bytes is not a multiple of the row width {}",
                bytes.len(),
                width
            )));
        }
        let chunkcount = bytes.len() / width;
        let sort_column = schema.primary_key();
        Ok(Self {
            schema,
            chunks: bytes,
            chunkcount,
            sort_bound: if sorted { chunkcount } else { 0 },
            sort_column,
        })
    }

    /// Sort by a column other than the primary key. Resets the sorted prefix.
    pub fn set_sort_column(&mut self, column: usize) {
        if column != self.sort_column {
            self.sort_column = column;
            self.sort_bound = 0;
        }
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.chunkcount
    }

    pub fn is_empty(&self) -> bool {
        self.chunkcount == 0
    }

    pub fn sort_bound(&self) -> usize {
        self.sort_bound
    }

    pub fn is_sorted(&self) -> bool {
        self.sort_bound == self.chunkcount
    }

    /// Allocated record capacity
    pub fn capacity(&self) -> usize {
        self.chunks.capacity() / self.schema.objectsize()
    }

    // =========================================================================
    // Record Access
    // =========================================================================

    /// Append a record, doubling the buffer when full
    pub fn add(&mut self, entry: &RowEntry) -> Result<()> {
        self.add_bytes(entry.bytes())
    }

    pub fn add_bytes(&mut self, row: &[u8]) -> Result<()> {
        let width = self.schema.objectsize();
        if row.len() != width {
            return Err(StoreError::length("row", width, row.len()));
        }
        if self.chunks.len() + width > self.chunks.capacity() {
            let grow = self.chunks.capacity().max(MIN_GROWTH * width);
            self.chunks.reserve_exact(grow);
        }
        self.chunks.extend_from_slice(row);
        self.chunkcount += 1;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<RowEntry> {
        self.check(index)?;
        RowEntry::from_bytes(Arc::clone(&self.schema), self.row_bytes(index))
    }

    /// Overwrite record `index`; a changed sort key shortens the sorted prefix
    pub fn set(&mut self, index: usize, entry: &RowEntry) -> Result<()> {
        self.check(index)?;
        let width = self.schema.objectsize();
        if entry.bytes().len() != width {
            return Err(StoreError::length("row", width, entry.bytes().len()));
        }
        let key_changed = self.sort_key(index) != entry.col(self.sort_column);
        let start = index * width;
        self.chunks[start..start + width].copy_from_slice(entry.bytes());
        if key_changed && index < self.sort_bound {
            self.sort_bound = index;
        }
        Ok(())
    }

    pub fn row_bytes(&self, index: usize) -> &[u8] {
        let width = self.schema.objectsize();
        &self.chunks[index * width..(index + 1) * width]
    }

    /// Sort column of record `index`
    pub fn sort_key(&self, index: usize) -> &[u8] {
        let range = self.sort_range();
        let start = index * self.schema.objectsize();
        &self.chunks[start + range.start..start + range.end]
    }

    /// Primary key bytes of record `index`
    pub fn key_at(&self, index: usize) -> Result<&[u8]> {
        self.check(index)?;
        let range = self.schema.key_range();
        let start = index * self.schema.objectsize();
        Ok(&self.chunks[start + range.start..start + range.end])
    }

    /// Whole buffer of records, `len() * objectsize` bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.chunks
    }

    pub fn iter(&self) -> impl Iterator<Item = RowEntry> + '_ {
        (0..self.chunkcount).filter_map(move |i| self.get(i).ok())
    }

    fn check(&self, index: usize) -> Result<()> {
        if index >= self.chunkcount {
            return Err(StoreError::OutOfBounds {
                index,
                len: self.chunkcount,
            });
        }
        Ok(())
    }

    fn sort_range(&self) -> Range<usize> {
        self.schema.range(self.sort_column)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove record `index`. Inside the sorted prefix the tail is shifted
    /// down; in the unsorted suffix the last record takes its place.
    pub fn remove_row(&mut self, index: usize) -> Result<RowEntry> {
        let removed = self.get(index)?;
        let width = self.schema.objectsize();
        let last = self.chunkcount - 1;

        if index < self.sort_bound {
            self.chunks.copy_within((index + 1) * width.., index * width);
            self.sort_bound -= 1;
        } else if index != last {
            self.chunks.copy_within(last * width.., index * width);
        }
        self.chunks.truncate(last * width);
        self.chunkcount = last;
        Ok(removed)
    }

    /// Remove record `index` by moving the last record into its place.
    /// A hole in the sorted prefix cuts the prefix back to `index`.
    pub fn swap_remove_row(&mut self, index: usize) -> Result<RowEntry> {
        let removed = self.get(index)?;
        let width = self.schema.objectsize();
        let last = self.chunkcount - 1;

        if index != last {
            self.chunks.copy_within(last * width.., index * width);
        }
        self.chunks.truncate(last * width);
        self.chunkcount = last;
        self.sort_bound = self.sort_bound.min(index).min(last);
        Ok(removed)
    }

    /// Remove many records in a single shifting pass
    pub fn remove_rows(&mut self, indices: &BTreeSet<usize>) {
        if indices.is_empty() {
            return;
        }
        let width = self.schema.objectsize();
        let mut target = 0;
        let mut removed_sorted = 0;
        for source in 0..self.chunkcount {
            if indices.contains(&source) {
                if source < self.sort_bound {
                    removed_sorted += 1;
                }
                continue;
            }
            if target != source {
                self.chunks
                    .copy_within(source * width..(source + 1) * width, target * width);
            }
            target += 1;
        }
        self.chunks.truncate(target * width);
        self.chunkcount = target;
        self.sort_bound -= removed_sorted;
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.chunkcount = 0;
        self.sort_bound = 0;
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Sort all records. Only the unsorted suffix is sorted; it is then merged
    /// with the existing sorted prefix.
    pub fn sort(&mut self) {
        if self.is_sorted() {
            return;
        }
        let width = self.schema.objectsize();
        let range = self.sort_range();
        let order = self.schema.order().clone();
        let keys = sort::KeyLayout {
            width,
            key: range,
            order: &order,
        };

        sort::quicksort(&mut self.chunks, &keys, self.sort_bound, self.chunkcount);
        if self.sort_bound > 0 {
            sort::merge_runs(&mut self.chunks, &keys, self.sort_bound, self.chunkcount);
        }
        self.sort_bound = self.chunkcount;
    }

    /// Drop adjacent records with equal sort keys, keeping the first of each.
    /// Sorts first if needed. Returns the number of records removed.
    pub fn uniq(&mut self) -> usize {
        self.sort();
        if self.chunkcount < 2 {
            return 0;
        }
        let width = self.schema.objectsize();
        let order = self.schema.order().clone();
        let mut kept = 0;
        for i in 1..self.chunkcount {
            if order.compare(self.sort_key(kept), self.sort_key(i)).is_ne() {
                kept += 1;
                if kept != i {
                    self.chunks
                        .copy_within(i * width..(i + 1) * width, kept * width);
                }
            }
        }
        let removed = self.chunkcount - (kept + 1);
        self.chunkcount = kept + 1;
        self.chunks.truncate(self.chunkcount * width);
        self.sort_bound = self.chunkcount;
        removed
    }

    /// Binary search for `key` in the sorted prefix
    pub fn find_sorted(&self, key: &[u8]) -> Option<usize> {
        let order = self.schema.order();
        let (mut lo, mut hi) = (0, self.sort_bound);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match order.compare(self.sort_key(mid), key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// Linear scan of the unsorted suffix
    pub fn find_unsorted(&self, key: &[u8]) -> Option<usize> {
        (self.sort_bound..self.chunkcount).find(|&i| self.sort_key(i) == key)
    }

    /// First index of the sorted prefix whose key is not before `key`
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        let order = self.schema.order();
        let (mut lo, mut hi) = (0, self.sort_bound);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if order.compare(self.sort_key(mid), key).is_lt() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First index of the sorted prefix whose key is after `key`
    pub fn upper_bound(&self, key: &[u8]) -> usize {
        let order = self.schema.order();
        let (mut lo, mut hi) = (0, self.sort_bound);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if order.compare(self.sort_key(mid), key).is_le() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }
}
