//! Index Module
//!
//! The uniform keyed-table contract and the backends built on it.
//!
//! ## Backends
//! ```text
//!   CachedIndex ──▶ BufferedIndex ──▶ PartitionedIndex ──▶ SlottedTable ──▶ SlottedFile
//!    (hit/miss      (hot RowSet over    (newest partition    (RowSet key→handle
//!     caches)        cold index)         wins)                 + slots)
//! ```
//! Any layer may wrap any other: wrappers own their inner index and forward
//! calls, applying their own policy around the forwarded call.
//!
//! ## Contract
//! Every backend satisfies:
//! - after `put(e)`, `get(key(e)) == Some(e)`
//! - after `remove(k)`, `get(k) == None`
//! - `size()` equals the number of keys for which `get` is `Some`

mod buffered;
mod partitioned;
mod table;

use std::sync::Arc;

pub use buffered::BufferedIndex;
pub use partitioned::PartitionedIndex;
pub use table::SlottedTable;

use crate::error::Result;
use crate::merge::BoxIter;
use crate::row::{RowEntry, RowSchema};

/// Ordered lazy sequence of keys
pub type KeyIter = BoxIter<Vec<u8>>;

/// Ordered lazy sequence of rows
pub type RowIter = BoxIter<RowEntry>;

/// Keyed table of fixed-width rows.
///
/// Keys shorter than the key column are zero-padded; keys yielded by
/// `keys()` are always full width.
pub trait Index: Send + Sync {
    fn schema(&self) -> &Arc<RowSchema>;

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>>;

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert or replace; returns the replaced row
    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>>;

    /// Insert a row whose key must not be present (`DuplicateKey` otherwise)
    fn add_unique(&self, entry: RowEntry) -> Result<()>;

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>>;

    /// Remove some row, in no particular order (used to drain a table)
    fn remove_one(&self) -> Result<Option<RowEntry>>;

    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Keys in order (`ascending`) or reverse order, from `start` inclusive
    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter>;

    /// Rows in key order (`ascending`) or reverse order, from `start` inclusive
    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter>;

    /// Flush and release resources; callers quiesce other operations first
    fn close(&self) -> Result<()>;
}

impl<I: Index + ?Sized> Index for Arc<I> {
    fn schema(&self) -> &Arc<RowSchema> {
        (**self).schema()
    }

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        (**self).has(key)
    }

    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>> {
        (**self).put(entry)
    }

    fn add_unique(&self, entry: RowEntry) -> Result<()> {
        (**self).add_unique(entry)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        (**self).remove(key)
    }

    fn remove_one(&self) -> Result<Option<RowEntry>> {
        (**self).remove_one()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter> {
        (**self).keys(ascending, start)
    }

    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter> {
        (**self).rows(ascending, start)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

impl<I: Index + ?Sized> Index for Box<I> {
    fn schema(&self) -> &Arc<RowSchema> {
        (**self).schema()
    }

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        (**self).has(key)
    }

    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>> {
        (**self).put(entry)
    }

    fn add_unique(&self, entry: RowEntry) -> Result<()> {
        (**self).add_unique(entry)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        (**self).remove(key)
    }

    fn remove_one(&self) -> Result<Option<RowEntry>> {
        (**self).remove_one()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter> {
        (**self).keys(ascending, start)
    }

    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter> {
        (**self).rows(ascending, start)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// Reject rows built for a schema with a different width
pub(crate) fn check_row(schema: &RowSchema, entry: &RowEntry) -> Result<()> {
    if !schema.same_layout(entry.schema()) {
        return Err(crate::error::StoreError::SchemaMismatch(format!(
            "row of {} bytes does not match table layout of {} bytes",
            entry.bytes().len(),
            schema.objectsize()
        )));
    }
    Ok(())
}
