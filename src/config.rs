//! Configuration for rowstore
//!
//! Centralized configuration with sensible defaults.

use crate::error::{Result, StoreError};

/// Main configuration shared by all rowstore structures
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // RowSet Configuration
    // -------------------------------------------------------------------------
    /// Number of unsorted trailing records tolerated by `find` before the
    /// whole collection is re-sorted
    pub resort_limit: usize,

    /// Number of deletions that may be marked inside the sorted region before
    /// a compaction pass folds them out
    pub remove_bound: usize,

    // -------------------------------------------------------------------------
    // Write Buffer Configuration
    // -------------------------------------------------------------------------
    /// Pending bytes that trigger a flush of the write buffer
    pub write_buffer_bytes: usize,

    /// Age (milliseconds since last flush) that triggers a flush
    pub flush_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Max entries held by an object cache before the oldest is evicted
    pub cache_max_entries: usize,

    /// Max keys remembered as confirmed-absent
    pub miss_cache_max_entries: usize,

    // -------------------------------------------------------------------------
    // Slotted File Configuration
    // -------------------------------------------------------------------------
    /// Flag bytes at the start of every slot
    pub overhead_bytes: usize,

    /// Handle pointers stored in every slot (the first one chains the free list)
    pub overhead_handles: usize,

    /// How a deleted slot is told apart from a live one
    pub liveness: Liveness,

    // -------------------------------------------------------------------------
    // Scan Pipeline Configuration
    // -------------------------------------------------------------------------
    /// Bytes read from the file per producer step
    pub pipeline_block_size: usize,

    /// Records per chunk handed to the consumer
    pub pipeline_chunk_records: usize,

    /// Depth of each bounded queue (and size of each buffer pool)
    pub pipeline_queue_depth: usize,

    // -------------------------------------------------------------------------
    // Partitioned Table Configuration
    // -------------------------------------------------------------------------
    /// Records in the current partition before a new one is started
    pub partition_max_records: usize,

    /// Age of the current partition (milliseconds) before a new one is started
    pub partition_max_age_ms: u64,

    // -------------------------------------------------------------------------
    // Buffered Index Configuration
    // -------------------------------------------------------------------------
    /// Entries kept in the in-memory hot index before draining to the cold one
    pub hot_max_entries: usize,
}

/// Encoding of the deleted state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Bit 0 of the first overhead byte marks the slot as deleted
    Tombstone,

    /// The first payload bytes carry the state: a slot is live iff its first
    /// byte is non-zero and the first two bytes are not `0x80 0x00`.
    /// Never-written (zero-filled) records read as not live in this mode.
    Legacy,
}

impl Liveness {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Liveness::Tombstone => 0,
            Liveness::Legacy => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Liveness::Tombstone),
            1 => Some(Liveness::Legacy),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resort_limit: 90,
            remove_bound: 100,
            write_buffer_bytes: 1024 * 1024, // 1 MB
            flush_timeout_ms: 10_000,
            cache_max_entries: 10_000,
            miss_cache_max_entries: 10_000,
            overhead_bytes: 1,
            overhead_handles: 1,
            liveness: Liveness::Tombstone,
            pipeline_block_size: 64 * 1024,
            pipeline_chunk_records: 1024,
            pipeline_queue_depth: 4,
            partition_max_records: 1_000_000,
            partition_max_age_ms: 24 * 60 * 60 * 1000,
            hot_max_entries: 10_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would make a structure unusable
    pub fn validate(&self) -> Result<()> {
        if self.overhead_handles == 0 {
            return Err(StoreError::Config(
                "overhead_handles must be at least 1 to chain the free list".to_string(),
            ));
        }
        if self.overhead_bytes > u16::MAX as usize || self.overhead_handles > u16::MAX as usize {
            return Err(StoreError::Config(format!(
                "overhead counts ({} bytes, {} handles) must fit in 16 bits",
                self.overhead_bytes, self.overhead_handles
            )));
        }
        if self.liveness == Liveness::Tombstone && self.overhead_bytes == 0 {
            return Err(StoreError::Config(
                "tombstone liveness needs at least one overhead byte".to_string(),
            ));
        }
        if self.pipeline_block_size == 0
            || self.pipeline_chunk_records == 0
            || self.pipeline_queue_depth == 0
        {
            return Err(StoreError::Config(
                "pipeline sizes must be non-zero".to_string(),
            ));
        }
        if self.partition_max_records == 0 {
            return Err(StoreError::Config(
                "partition_max_records must be non-zero".to_string(),
            ));
        }
        if self.remove_bound == 0 {
            return Err(StoreError::Config("remove_bound must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the unsorted-suffix length that triggers a re-sort in `find`
    pub fn resort_limit(mut self, limit: usize) -> Self {
        self.config.resort_limit = limit;
        self
    }

    /// Set the number of marked removals tolerated before compaction
    pub fn remove_bound(mut self, bound: usize) -> Self {
        self.config.remove_bound = bound;
        self
    }

    /// Set the write buffer flush threshold (in bytes)
    pub fn write_buffer_bytes(mut self, bytes: usize) -> Self {
        self.config.write_buffer_bytes = bytes;
        self
    }

    /// Set the write buffer flush timeout (in milliseconds)
    pub fn flush_timeout_ms(mut self, ms: u64) -> Self {
        self.config.flush_timeout_ms = ms;
        self
    }

    /// Set the object cache capacity
    pub fn cache_max_entries(mut self, count: usize) -> Self {
        self.config.cache_max_entries = count;
        self
    }

    /// Set the miss cache capacity
    pub fn miss_cache_max_entries(mut self, count: usize) -> Self {
        self.config.miss_cache_max_entries = count;
        self
    }

    /// Set the number of flag bytes per slot
    pub fn overhead_bytes(mut self, count: usize) -> Self {
        self.config.overhead_bytes = count;
        self
    }

    /// Set the number of handle pointers per slot
    pub fn overhead_handles(mut self, count: usize) -> Self {
        self.config.overhead_handles = count;
        self
    }

    /// Set the slot liveness encoding
    pub fn liveness(mut self, liveness: Liveness) -> Self {
        self.config.liveness = liveness;
        self
    }

    /// Set the scan pipeline read block size (in bytes)
    pub fn pipeline_block_size(mut self, bytes: usize) -> Self {
        self.config.pipeline_block_size = bytes;
        self
    }

    /// Set the number of records per pipeline chunk
    pub fn pipeline_chunk_records(mut self, count: usize) -> Self {
        self.config.pipeline_chunk_records = count;
        self
    }

    /// Set the pipeline queue depth
    pub fn pipeline_queue_depth(mut self, depth: usize) -> Self {
        self.config.pipeline_queue_depth = depth;
        self
    }

    /// Set the record limit of a partition
    pub fn partition_max_records(mut self, count: usize) -> Self {
        self.config.partition_max_records = count;
        self
    }

    /// Set the age limit of a partition (in milliseconds)
    pub fn partition_max_age_ms(mut self, ms: u64) -> Self {
        self.config.partition_max_age_ms = ms;
        self
    }

    /// Set the hot index capacity of a buffered index
    pub fn hot_max_entries(mut self, count: usize) -> Self {
        self.config.hot_max_entries = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
