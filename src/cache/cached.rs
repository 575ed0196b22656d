//! Cached Index
//!
//! Read cache and negative-lookup cache in front of any `Index`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::index::{Index, KeyIter, RowIter};
use crate::row::{RowEntry, RowSchema};

use super::ObjectCache;

/// Counters of a [`CachedIndex`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the row cache
    pub hits: u64,
    /// Lookups answered from the miss cache
    pub miss_hits: u64,
    /// Lookups forwarded to the backend
    pub backend_reads: u64,
    /// Rows evicted from the row cache
    pub evictions: u64,
    pub cached_rows: usize,
    pub cached_misses: usize,
}

/// Write-through caching wrapper.
///
/// Rows read or written are kept in a bounded row cache; keys the backend
/// confirmed absent are kept in a separately bounded miss cache. Scans and
/// `size()` go straight to the backend, which always holds every row.
pub struct CachedIndex<I: Index> {
    inner: I,
    state: Mutex<CacheState>,
}

struct CacheState {
    rows: ObjectCache<Vec<u8>, RowEntry>,
    misses: ObjectCache<Vec<u8>, ()>,
    hits: u64,
    miss_hits: u64,
    backend_reads: u64,
}

impl CacheState {
    /// Drop what is cached for `key`; a failed backend write may have been
    /// partly applied
    fn forget(&mut self, key: &[u8]) {
        let key = key.to_vec();
        self.rows.remove(&key);
        self.misses.remove(&key);
    }
}

impl<I: Index> CachedIndex<I> {
    pub fn new(inner: I, config: &Config) -> Self {
        Self::with_bounds(inner, config.cache_max_entries, config.miss_cache_max_entries)
    }

    pub fn with_bounds(inner: I, max_rows: usize, max_misses: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState {
                rows: ObjectCache::new(max_rows),
                misses: ObjectCache::new(max_misses),
                hits: 0,
                miss_hits: 0,
                backend_reads: 0,
            }),
        }
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            miss_hits: state.miss_hits,
            backend_reads: state.backend_reads,
            evictions: state.rows.evictions(),
            cached_rows: state.rows.len(),
            cached_misses: state.misses.len(),
        }
    }

    /// Drop every cached row and miss
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.rows.clear();
        state.misses.clear();
    }
}

impl<I: Index> Index for CachedIndex<I> {
    fn schema(&self) -> &Arc<RowSchema> {
        self.inner.schema()
    }

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let key = self.inner.schema().normalize_key(key)?;
        let mut state = self.state.lock();
        if let Some(row) = state.rows.get(&key) {
            let row = row.clone();
            state.hits += 1;
            return Ok(Some(row));
        }
        if state.misses.get(&key).is_some() {
            state.miss_hits += 1;
            return Ok(None);
        }

        state.backend_reads += 1;
        let found = self.inner.get(&key)?;
        match &found {
            Some(row) => {
                state.rows.put(key, row.clone());
            }
            None => {
                state.misses.put(key, ());
            }
        }
        Ok(found)
    }

    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>> {
        let key = entry.key().to_vec();
        let mut state = self.state.lock();
        let previous = match self.inner.put(entry.clone()) {
            Ok(previous) => previous,
            Err(e) => {
                state.forget(&key);
                return Err(e);
            }
        };
        state.misses.remove(&key);
        state.rows.put(key, entry);
        Ok(previous)
    }

    fn add_unique(&self, entry: RowEntry) -> Result<()> {
        let key = entry.key().to_vec();
        let mut state = self.state.lock();
        if let Err(e) = self.inner.add_unique(entry.clone()) {
            state.forget(&key);
            return Err(e);
        }
        state.misses.remove(&key);
        state.rows.put(key, entry);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let key = self.inner.schema().normalize_key(key)?;
        let mut state = self.state.lock();
        let removed = match self.inner.remove(&key) {
            Ok(removed) => removed,
            Err(e) => {
                state.forget(&key);
                return Err(e);
            }
        };
        state.rows.remove(&key);
        state.misses.put(key, ());
        Ok(removed)
    }

    fn remove_one(&self) -> Result<Option<RowEntry>> {
        let mut state = self.state.lock();
        let removed = match self.inner.remove_one() {
            Ok(removed) => removed,
            Err(e) => {
                // The affected key is unknown
                state.rows.clear();
                state.misses.clear();
                return Err(e);
            }
        };
        if let Some(row) = &removed {
            let key = row.key().to_vec();
            state.rows.remove(&key);
            state.misses.put(key, ());
        }
        Ok(removed)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter> {
        self.inner.keys(ascending, start)
    }

    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter> {
        self.inner.rows(ascending, start)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.rows.clear();
        state.misses.clear();
        self.inner.close()
    }
}
