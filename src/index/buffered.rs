//! Buffered Index
//!
//! An in-memory hot RowSet in front of a cold index.
//!
//! ## Data Flow
//! ```text
//!   put ──▶ hot RowSet ──(hot_max_entries reached)──▶ drain ──▶ cold index
//!   get ──▶ hot RowSet ──(miss)──▶ cold index
//!   scan ─▶ merge(hot, cold), hot wins ties
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{display_key, Result, StoreError};
use crate::merge::{check_orders, MergeIterator, RebasingIterator, Resolution};
use crate::row::{RowEntry, RowSchema};
use crate::rowset::RowSet;

use super::{check_row, Index, KeyIter, RowIter};

const SCAN_RETRIES: usize = 8;

/// Write-absorbing index wrapper.
///
/// Keys present in both hot and cold ("shadowed") are counted once by
/// `size()`; the hot row is the current one.
///
/// ## Concurrency
/// Keyed operations are serialized by the `shadowed` lock, taken before any hot or
/// cold operation. Scans run unlocked and re-base on concurrent change.
pub struct BufferedIndex<I: Index> {
    schema: Arc<RowSchema>,
    hot: RowSet,
    cold: Arc<I>,
    hot_max_entries: usize,
    /// Hot keys that also exist in cold; the lock serializes keyed operations
    shadowed: Mutex<usize>,
}

impl<I: Index + 'static> BufferedIndex<I> {
    pub fn new(cold: I, config: &Config) -> Result<Self> {
        let schema = Arc::clone(cold.schema());
        let hot = RowSet::with_config(Arc::clone(&schema), config);
        check_orders(hot.schema().order(), cold.schema().order())?;
        Ok(Self {
            schema,
            hot,
            cold: Arc::new(cold),
            hot_max_entries: config.hot_max_entries.max(1),
            shadowed: Mutex::new(0),
        })
    }

    /// Move every hot row into the cold index
    pub fn flush(&self) -> Result<usize> {
        let mut shadowed = self.shadowed.lock();
        self.drain(&mut shadowed)
    }

    /// Rows currently held in memory
    pub fn hot_size(&self) -> usize {
        self.hot.size()
    }

    pub fn cold(&self) -> &I {
        &self.cold
    }

    /// Drain in ascending key order. On failure the hot rows stay in place;
    /// rows already written to cold become shadowed copies.
    fn drain(&self, shadowed: &mut usize) -> Result<usize> {
        let rows = self.hot.rows(true, None)?.collect::<Result<Vec<_>>>()?;
        let drained = rows.len();
        for row in rows {
            // Rows new to cold are shadowed until the hot set is cleared
            if self.cold.put(row)?.is_none() {
                *shadowed += 1;
            }
        }
        self.hot.clear();
        *shadowed = 0;
        tracing::debug!(drained, "drained hot index into cold index");
        Ok(drained)
    }
}

impl<I: Index + 'static> Index for BufferedIndex<I> {
    fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let _guard = self.shadowed.lock();
        match self.hot.get(key)? {
            Some(row) => Ok(Some(row)),
            None => self.cold.get(key),
        }
    }

    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>> {
        check_row(&self.schema, &entry)?;
        let mut shadowed = self.shadowed.lock();
        let previous = match self.hot.get(entry.key())? {
            Some(row) => Some(row),
            None => {
                let cold = self.cold.get(entry.key())?;
                if cold.is_some() {
                    *shadowed += 1;
                }
                cold
            }
        };
        self.hot.put(entry)?;
        if self.hot.size() >= self.hot_max_entries {
            self.drain(&mut shadowed)?;
        }
        Ok(previous)
    }

    fn add_unique(&self, entry: RowEntry) -> Result<()> {
        check_row(&self.schema, &entry)?;
        let mut shadowed = self.shadowed.lock();
        if self.hot.has(entry.key())? || self.cold.has(entry.key())? {
            return Err(StoreError::DuplicateKey(format!(
                "'{}' already stored",
                display_key(entry.key())
            )));
        }
        self.hot.add_unique(entry)?;
        if self.hot.size() >= self.hot_max_entries {
            self.drain(&mut shadowed)?;
        }
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let mut shadowed = self.shadowed.lock();
        let hot = self.hot.remove(key)?;
        let cold = self.cold.remove(key)?;
        if hot.is_some() && cold.is_some() {
            *shadowed = shadowed.saturating_sub(1);
        }
        Ok(hot.or(cold))
    }

    fn remove_one(&self) -> Result<Option<RowEntry>> {
        let mut shadowed = self.shadowed.lock();
        if let Some(row) = self.hot.remove_one()? {
            if self.cold.remove(row.key())?.is_some() {
                *shadowed = shadowed.saturating_sub(1);
            }
            return Ok(Some(row));
        }
        self.cold.remove_one()
    }

    fn size(&self) -> usize {
        let shadowed = self.shadowed.lock();
        self.hot.size() + self.cold.size() - *shadowed
    }

    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter> {
        let hot = self.hot.clone();
        let cold = Arc::clone(&self.cold);
        let order = self.schema.order().clone();
        let merge_order = order.clone();
        let iter = RebasingIterator::new(
            start,
            order,
            ascending,
            SCAN_RETRIES,
            Box::new(move |from: Option<&[u8]>| -> Result<KeyIter> {
                Ok(Box::new(MergeIterator::new(
                    hot.keys(ascending, from)?,
                    cold.keys(ascending, from)?,
                    merge_order.clone(),
                    ascending,
                    Resolution::LeftWins,
                )))
            }),
        )?;
        Ok(Box::new(iter))
    }

    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter> {
        let hot = self.hot.clone();
        let cold = Arc::clone(&self.cold);
        let order = self.schema.order().clone();
        let merge_order = order.clone();
        let iter = RebasingIterator::new(
            start,
            order,
            ascending,
            SCAN_RETRIES,
            Box::new(move |from: Option<&[u8]>| -> Result<RowIter> {
                Ok(Box::new(MergeIterator::new(
                    hot.rows(ascending, from)?,
                    cold.rows(ascending, from)?,
                    merge_order.clone(),
                    ascending,
                    Resolution::LeftWins,
                )))
            }),
        )?;
        Ok(Box::new(iter))
    }

    fn close(&self) -> Result<()> {
        self.flush()?;
        self.cold.close()
    }
}
