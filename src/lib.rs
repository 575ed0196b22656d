//! # rowstore
//!
//! An embedded record-oriented storage engine with:
//! - Fixed-width row schemas with typed column accessors
//! - Sorted in-memory row sets usable as caches or complete indexes
//! - Slotted record files with free-list slot reuse
//! - Write-coalescing buffered I/O with read-your-writes
//! - Ordered merged scans across hot/cold and time-partitioned tables
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Index (trait)                            │
//! │   CachedIndex ─▶ BufferedIndex ─▶ PartitionedIndex           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   RowSet    │          │ SlottedTable│──▶ scan pipeline
//!   │  (Mutex)    │          │ key→handle  │    (rebuild on open)
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐     ┌──────────────┐
//!   │RowCollection│          │ SlottedFile │ ──▶ │BufferedAccess│ ──▶ file
//!   │ sorted bytes│          │ (free list) │     │ (write buf)  │
//!   └─────────────┘          └─────────────┘     └──────────────┘
//! ```
//!
//! Ordered scans over several structures go through [`merge::MergeIterator`];
//! object caches rank entries by age with [`score::ScoreCluster`].

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod order;
pub mod profile;
pub mod row;
pub mod rowset;

pub mod io;
pub mod pipeline;
pub mod slotted;

pub mod cache;
pub mod index;
pub mod merge;
pub mod score;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cache::{CacheStats, CachedIndex, ObjectCache};
pub use config::{Config, Liveness};
pub use error::{Result, StoreError};
pub use index::{BufferedIndex, Index, PartitionedIndex, SlottedTable};
pub use order::ByteOrder;
pub use row::{Column, Encoding, RowEntry, RowSchema};
pub use rowset::{RowCollection, RowSet};
pub use score::ScoreCluster;
pub use slotted::{Handle, SlottedFile};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rowstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
