//! Scan Pipeline Module
//!
//! High-throughput sequential scan of fixed-size records from a file.
//!
//! ## Stages
//! ```text
//!  ┌──────────┐  blocks  ┌─────────┐  chunks  ┌──────────┐
//!  │ producer │ ───────▶ │ slicer  │ ───────▶ │ consumer │
//!  │ (thread) │ bounded  │ (thread)│ bounded  │ (caller) │
//!  └──────────┘          └─────────┘          └──────────┘
//!       ▲  block pool        │  ▲   chunk pool      │
//!       └────────────────────┘  └───────────────────┘
//! ```
//!
//! - The producer reads raw blocks of `pipeline_block_size` bytes into
//!   buffers taken from the block pool.
//! - The slicer repacks blocks into record-aligned chunks of
//!   `pipeline_chunk_records` records, taking chunk buffers from the chunk
//!   pool and returning block buffers to the block pool.
//! - The consumer pulls chunks and must hand each one back with
//!   [`ChunkReader::recycle`]. Chunks that are never returned stall the
//!   slicer once the pool is empty; that back-pressure is intentional.

mod reader;

pub use reader::{Chunk, ChunkReader, RecordIter};
