//! Row Module
//!
//! Fixed-width composite records.
//!
//! ## Layout
//! ```text
//! ┌──────────────┬──────────────┬─────┬──────────────┐
//! │ column 0     │ column 1     │ ... │ column n-1   │
//! │ colstart[0]  │ colstart[1]  │     │              │
//! └──────────────┴──────────────┴─────┴──────────────┘
//!  <─────────────────── objectsize ──────────────────>
//! ```
//!
//! Numeric columns hold big-endian base-256 integers of up to 8 bytes.

mod entry;
mod schema;

pub use entry::RowEntry;
pub use schema::{Column, Encoding, RowSchema};
