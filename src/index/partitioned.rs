//! Partitioned Index
//!
//! A directory of slotted tables, each holding the rows written during one
//! period.
//!
//! ## Responsibilities
//! - Discover existing partitions on startup
//! - Search partitions newest → oldest for reads
//! - Start a new partition when the current one is full or too old
//! - Merge all partitions for ordered scans, newest wins

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{display_key, Result, StoreError};
use crate::merge::{BoxIter, Keyed, MergeIterator, RebasingIterator, Resolution};
use crate::row::{RowEntry, RowSchema};

use super::{check_row, Index, KeyIter, RowIter, SlottedTable};

const SCAN_RETRIES: usize = 8;

/// One backing table and when it was started
struct Partition {
    id: u64,
    created_ms: u64,
    table: Arc<SlottedTable>,
}

/// Keyed table spread over time-ordered partitions.
///
/// A key lives in at most one partition: updates go to the partition that
/// already holds the key, inserts go to the current (newest) one.
///
/// ## Concurrency
/// - `partitions`: RwLock (reads and scans share it, rotation is exclusive)
/// - `next_id`: atomic counter
/// - `write_lock`: serializes keyed writes so the find-then-write sequence
///   across partitions is atomic
pub struct PartitionedIndex {
    dir: PathBuf,
    prefix: String,
    schema: Arc<RowSchema>,
    config: Config,

    /// Open partitions, ordered newest → oldest
    partitions: RwLock<Vec<Partition>>,

    next_id: AtomicU64,

    write_lock: Mutex<()>,
}

impl PartitionedIndex {
    /// Open or create a partitioned index in `dir`.
    ///
    /// Partition files are named `{prefix}_{id:06}_{created_ms}.tbl`.
    pub fn open(
        dir: &Path,
        prefix: &str,
        schema: Arc<RowSchema>,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        if prefix.is_empty() || prefix.contains('_') {
            return Err(StoreError::Config(format!(
                "partition prefix '{}' must be non-empty and free of '_'",
                prefix
            )));
        }
        fs::create_dir_all(dir)?;

        let mut found: Vec<(u64, u64)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(ids) = Self::parse_partition_name(prefix, &path) {
                    found.push(ids);
                }
            }
        }

        // Newest first
        found.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        let mut partitions = Vec::with_capacity(found.len());
        for &(id, created_ms) in &found {
            let path = Self::partition_path(dir, prefix, id, created_ms);
            let table = SlottedTable::open(&path, Arc::clone(&schema), config)?;
            partitions.push(Partition {
                id,
                created_ms,
                table: Arc::new(table),
            });
        }

        let next_id = found.first().map(|&(id, _)| id + 1).unwrap_or(1);
        tracing::info!(
            dir = %dir.display(),
            partitions = partitions.len(),
            next_id,
            "opened partitioned index"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            schema,
            config: config.clone(),
            partitions: RwLock::new(partitions),
            next_id: AtomicU64::new(next_id),
            write_lock: Mutex::new(()),
        })
    }

    /// Start a new current partition regardless of the rotation limits
    pub fn rotate(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.start_partition()?;
        Ok(())
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    /// Partition ids, newest first
    pub fn partition_ids(&self) -> Vec<u64> {
        self.partitions.read().iter().map(|p| p.id).collect()
    }

    /// Row count per partition, newest first
    pub fn partition_sizes(&self) -> Vec<usize> {
        self.partitions.read().iter().map(|p| p.table.size()).collect()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Push buffered writes of every partition to disk
    pub fn commit(&self) -> Result<()> {
        for partition in self.partitions.read().iter() {
            partition.table.commit()?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Current partition, rotating first when it exceeds a limit
    fn current(&self) -> Result<Arc<SlottedTable>> {
        {
            let partitions = self.partitions.read();
            if let Some(newest) = partitions.first() {
                if !self.rotation_due(newest) {
                    return Ok(Arc::clone(&newest.table));
                }
            }
        }
        self.start_partition()
    }

    fn rotation_due(&self, partition: &Partition) -> bool {
        let full = partition.table.size() >= self.config.partition_max_records;
        let age = now_ms().saturating_sub(partition.created_ms);
        full || age >= self.config.partition_max_age_ms
    }

    fn start_partition(&self) -> Result<Arc<SlottedTable>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created_ms = now_ms();
        let path = Self::partition_path(&self.dir, &self.prefix, id, created_ms);
        let table = Arc::new(SlottedTable::create(
            &path,
            Arc::clone(&self.schema),
            &self.config,
        )?);

        let mut partitions = self.partitions.write();
        partitions.insert(
            0,
            Partition {
                id,
                created_ms,
                table: Arc::clone(&table),
            },
        );
        tracing::info!(id, path = %path.display(), "started new partition");
        Ok(table)
    }

    /// Snapshot of the tables, newest first
    fn tables(&self) -> Vec<Arc<SlottedTable>> {
        self.partitions
            .read()
            .iter()
            .map(|p| Arc::clone(&p.table))
            .collect()
    }

    /// Table holding `key`, if any
    fn holder(&self, key: &[u8]) -> Result<Option<Arc<SlottedTable>>> {
        for table in self.tables() {
            if table.has(key)? {
                return Ok(Some(table));
            }
        }
        Ok(None)
    }

    fn partition_path(dir: &Path, prefix: &str, id: u64, created_ms: u64) -> PathBuf {
        dir.join(format!("{}_{:06}_{}.tbl", prefix, id, created_ms))
    }

    /// "events_000042_1700000000000.tbl" → Some((42, 1700000000000))
    fn parse_partition_name(prefix: &str, path: &Path) -> Option<(u64, u64)> {
        if path.extension()? != "tbl" {
            return None;
        }
        let stem = path.file_stem()?.to_string_lossy();
        let rest = stem.strip_prefix(prefix)?.strip_prefix('_')?;
        let (id, created) = rest.split_once('_')?;
        Some((id.parse().ok()?, created.parse().ok()?))
    }

    /// Merged scan over a snapshot of the partitions, re-based on change
    fn merged<T, F>(&self, ascending: bool, start: Option<&[u8]>, scan: F) -> Result<BoxIter<T>>
    where
        T: Keyed + Send + 'static,
        F: Fn(&SlottedTable, bool, Option<&[u8]>) -> Result<BoxIter<T>> + Send + 'static,
    {
        let tables = self.tables();
        let order = self.schema.order().clone();
        let merge_order = order.clone();
        let iter = RebasingIterator::new(
            start,
            order,
            ascending,
            SCAN_RETRIES,
            Box::new(move |from: Option<&[u8]>| -> Result<BoxIter<T>> {
                let sources = tables
                    .iter()
                    .map(|table| scan(table.as_ref(), ascending, from))
                    .collect::<Result<Vec<_>>>()?;
                Ok(MergeIterator::cascade(
                    sources,
                    merge_order.clone(),
                    ascending,
                    Resolution::LeftWins,
                ))
            }),
        )?;
        Ok(Box::new(iter))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Index Implementation
// =============================================================================

impl Index for PartitionedIndex {
    fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        for table in self.tables() {
            if let Some(row) = table.get(key)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>> {
        check_row(&self.schema, &entry)?;
        let _guard = self.write_lock.lock();
        match self.holder(entry.key())? {
            Some(table) => table.put(entry),
            None => self.current()?.put(entry),
        }
    }

    fn add_unique(&self, entry: RowEntry) -> Result<()> {
        check_row(&self.schema, &entry)?;
        let _guard = self.write_lock.lock();
        if self.holder(entry.key())?.is_some() {
            return Err(StoreError::DuplicateKey(format!(
                "'{}' already stored in {}",
                display_key(entry.key()),
                self.dir.display()
            )));
        }
        self.current()?.add_unique(entry)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let _guard = self.write_lock.lock();
        match self.holder(key)? {
            Some(table) => table.remove(key),
            None => Ok(None),
        }
    }

    fn remove_one(&self) -> Result<Option<RowEntry>> {
        let _guard = self.write_lock.lock();
        for table in self.tables() {
            if let Some(row) = table.remove_one()? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn size(&self) -> usize {
        self.partitions.read().iter().map(|p| p.table.size()).sum()
    }

    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter> {
        self.merged(ascending, start, |table, ascending, from| {
            table.keys(ascending, from)
        })
    }

    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter> {
        self.merged(ascending, start, |table, ascending, from| {
            table.rows(ascending, from)
        })
    }

    fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let partitions = self.partitions.read();
        for partition in partitions.iter() {
            partition.table.close()?;
        }
        tracing::info!(
            dir = %self.dir.display(),
            partitions = partitions.len(),
            "closed partitioned index"
        );
        Ok(())
    }
}
