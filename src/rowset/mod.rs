//! RowSet Module
//!
//! In-memory arrays of fixed-width records.
//!
//! ## Responsibilities
//! - Append records with amortized O(1) growth
//! - Keep a sorted prefix; sort only what was appended since the last sort
//! - Keyed find/put/remove with bounded linear-scan cost
//! - Defer compaction of removals inside the sorted prefix
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────────┬─────────────────────┬──────────┐
//! │ sorted prefix                │ unsorted suffix     │ capacity │
//! │ [0, sort_bound)              │ [sort_bound, count) │          │
//! └──────────────────────────────┴─────────────────────┴──────────┘
//! ```

mod collection;
mod set;
mod sort;

pub use collection::RowCollection;
pub use set::RowSet;
