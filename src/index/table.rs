//! Slotted Table
//!
//! A slotted file of rows plus an in-memory key → handle index.
//!
//! ## Layout
//! ```text
//!   RowSet index (key, handle)          SlottedFile
//!   ┌──────────────┬────────┐          ┌────────┬──────────┐
//!   │ "apple\0\0"  │   2    │ ───────▶ │ slot 2 │ row ...  │
//!   │ "banana\0"   │   0    │ ───────▶ │ slot 0 │ row ...  │
//!   └──────────────┴────────┘          └────────┴──────────┘
//! ```
//! The index is not persisted. On open it is rebuilt by scanning every slot
//! through the chunked scan pipeline and keeping the live ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{display_key, Result, StoreError};
use crate::io::FileAccess;
use crate::pipeline::ChunkReader;
use crate::row::{Column, RowEntry, RowSchema};
use crate::rowset::RowSet;
use crate::slotted::{Handle, SlottedFile, HANDLE_SIZE};

use super::{check_row, Index, KeyIter, RowIter};

const HANDLE_COLUMN: usize = 1;

/// Keyed table stored in a single slotted file.
///
/// ## Concurrency
/// Every keyed operation runs under `op_lock`, so the index lookup and the
/// slot access it leads to are one unit. Scans do not take the lock; a slot
/// removed under a running scan surfaces as `ConcurrentModification`.
pub struct SlottedTable {
    path: PathBuf,
    schema: Arc<RowSchema>,
    file: Arc<SlottedFile<FileAccess>>,
    index: RowSet,
    op_lock: Mutex<()>,
}

impl SlottedTable {
    /// Open the table at `path`, creating the file when missing or empty
    pub fn open(path: &Path, schema: Arc<RowSchema>, config: &Config) -> Result<Self> {
        let file =
            SlottedFile::<FileAccess>::open_or_create_file(path, Arc::clone(&schema), config)?;
        Self::assemble(path, schema, file, config)
    }

    /// Create an empty table at `path`, discarding any old contents
    pub fn create(path: &Path, schema: Arc<RowSchema>, config: &Config) -> Result<Self> {
        let file = SlottedFile::<FileAccess>::create_file(path, Arc::clone(&schema), config)?;
        Self::assemble(path, schema, file, config)
    }

    fn assemble(
        path: &Path,
        schema: Arc<RowSchema>,
        file: SlottedFile<FileAccess>,
        config: &Config,
    ) -> Result<Self> {
        let index_schema = Arc::new(RowSchema::new(
            vec![
                Column::binary("key", schema.key_width()),
                Column::numeric("handle", HANDLE_SIZE),
            ],
            schema.order().clone(),
            0,
        )?);
        let table = Self {
            path: path.to_path_buf(),
            schema,
            file: Arc::new(file),
            index: RowSet::with_config(index_schema, config),
            op_lock: Mutex::new(()),
        };
        table.rebuild_index(config)?;
        Ok(table)
    }

    /// Scan all slots and index the live ones
    fn rebuild_index(&self, config: &Config) -> Result<()> {
        let started = Instant::now();
        let all_count = self.file.all_count();
        if all_count == 0 {
            return Ok(());
        }

        let layout = self.file.layout();
        let liveness = self.file.liveness();
        let key_range = self.schema.key_range();
        let payload_start = layout.overhead_size();

        let reader = ChunkReader::spawn(
            &self.path,
            layout.header_size as u64,
            layout.slot_size(),
            all_count as u64,
            config,
        )?;

        let mut live = 0usize;
        let mut entry = RowEntry::new(Arc::clone(self.index.schema()));
        for record in reader.records() {
            let (number, slot) = record?;
            if !layout.is_live(liveness, &slot) {
                continue;
            }
            let payload = &slot[payload_start..];
            entry.set_col(0, &payload[key_range.clone()])?;
            entry.set_col_long(HANDLE_COLUMN, number)?;
            self.index.add(&entry)?;
            live += 1;
        }

        self.index.shape();
        if self.index.size() != live {
            return Err(StoreError::CorruptRecord(format!(
                "{} live slots but only {} distinct keys in {}",
                live,
                self.index.size(),
                self.path.display()
            )));
        }
        if live != self.file.size() as usize {
            tracing::warn!(
                live,
                header_used = self.file.size(),
                "live slot count disagrees with the file header"
            );
        }

        tracing::debug!(
            path = %self.path.display(),
            slots = all_count,
            live,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt table index"
        );
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying slotted file
    pub fn file(&self) -> &SlottedFile<FileAccess> {
        &self.file
    }

    /// The in-memory key → handle index
    pub fn key_index(&self) -> &RowSet {
        &self.index
    }

    /// Push buffered writes to disk
    pub fn commit(&self) -> Result<()> {
        self.file.commit()
    }

    /// Check the free list and that the index and the file agree on the
    /// number of live rows
    pub fn verify(&self) -> Result<()> {
        let _guard = self.op_lock.lock();
        self.file.verify_free_list()?;
        let indexed = self.index.size();
        let live = self.file.live_handles()?.len();
        if indexed != live {
            return Err(StoreError::CorruptRecord(format!(
                "index holds {} keys but the file holds {} live rows",
                indexed, live
            )));
        }
        Ok(())
    }

    fn index_entry(&self, key: &[u8], handle: Handle) -> Result<RowEntry> {
        let mut entry = RowEntry::new(Arc::clone(self.index.schema()));
        entry.set_col(0, key)?;
        entry.set_col_long(HANDLE_COLUMN, handle.index() as u64)?;
        Ok(entry)
    }
}

fn handle_of(index_entry: &RowEntry) -> Handle {
    Handle::new(index_entry.col_long(HANDLE_COLUMN) as u32)
}

// =============================================================================
// Index Implementation
// =============================================================================

impl Index for SlottedTable {
    fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    fn get(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let _guard = self.op_lock.lock();
        match self.index.get(key)? {
            Some(found) => Ok(Some(self.file.read_row(handle_of(&found))?)),
            None => Ok(None),
        }
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.index.find(key)?.is_some())
    }

    fn put(&self, entry: RowEntry) -> Result<Option<RowEntry>> {
        check_row(&self.schema, &entry)?;
        let _guard = self.op_lock.lock();
        match self.index.get(entry.key())? {
            Some(found) => {
                let handle = handle_of(&found);
                let previous = self.file.read_row(handle)?;
                self.file.write_row(handle, &entry)?;
                Ok(Some(previous))
            }
            None => {
                let handle = self.file.new_record(Some(entry.bytes()))?;
                self.index.add_unique(self.index_entry(entry.key(), handle)?)?;
                Ok(None)
            }
        }
    }

    fn add_unique(&self, entry: RowEntry) -> Result<()> {
        check_row(&self.schema, &entry)?;
        let _guard = self.op_lock.lock();
        if self.index.find(entry.key())?.is_some() {
            return Err(StoreError::DuplicateKey(format!(
                "'{}' already stored in {}",
                display_key(entry.key()),
                self.path.display()
            )));
        }
        let handle = self.file.new_record(Some(entry.bytes()))?;
        self.index.add_unique(self.index_entry(entry.key(), handle)?)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<RowEntry>> {
        let _guard = self.op_lock.lock();
        let Some(found) = self.index.get(key)? else {
            return Ok(None);
        };
        let handle = handle_of(&found);
        let removed = self.file.read_row(handle)?;
        self.file.delete_node(handle)?;
        self.index.remove(key)?;
        Ok(Some(removed))
    }

    fn remove_one(&self) -> Result<Option<RowEntry>> {
        let _guard = self.op_lock.lock();
        let Some(found) = self.index.remove_one()? else {
            return Ok(None);
        };
        let handle = handle_of(&found);
        let removed = match self
            .file
            .read_row(handle)
            .and_then(|row| self.file.delete_node(handle).map(|_| row))
        {
            Ok(row) => row,
            Err(e) => {
                // Keep index and file consistent when the slot could not be freed
                self.index.add(&found)?;
                return Err(e);
            }
        };
        Ok(Some(removed))
    }

    fn size(&self) -> usize {
        self.index.size()
    }

    fn keys(&self, ascending: bool, start: Option<&[u8]>) -> Result<KeyIter> {
        self.index.keys(ascending, start)
    }

    fn rows(&self, ascending: bool, start: Option<&[u8]>) -> Result<RowIter> {
        let entries = self.index.rows(ascending, start)?;
        let file = Arc::clone(&self.file);
        Ok(Box::new(entries.map(move |found| {
            let handle = handle_of(&found?);
            file.read_row(handle).map_err(|e| match e {
                StoreError::InvalidHandle { .. } => StoreError::ConcurrentModification(format!(
                    "row at handle {} removed during scan",
                    handle
                )),
                other => other,
            })
        })))
    }

    fn close(&self) -> Result<()> {
        let _guard = self.op_lock.lock();
        self.file.close()?;
        tracing::debug!(path = %self.path.display(), rows = self.index.size(), "closed table");
        Ok(())
    }
}
