//! Merge Module
//!
//! Ordered union of sorted iterators.
//!
//! ## Responsibilities
//! - Two-way merge with a pluggable resolution for equal keys
//! - N-way merge by right-folding two-way merges (leftmost source wins ties
//!   under `Resolution::LeftWins`)
//! - Re-basing a merged scan from the last emitted key when a source reports
//!   a concurrent modification
//!
//! Typical uses: hot in-memory index ∪ cold on-disk index, and
//! newest partition ∪ older partitions.

mod iterator;
mod rebase;

use std::cmp::Ordering;

pub use iterator::{BoxIter, Keyed, MergeIterator, Resolution};
pub use rebase::{RebaseFn, RebasingIterator};

use crate::error::{Result, StoreError};
use crate::order::ByteOrder;

/// Merging requires both sides to sort keys identically
pub fn check_orders(left: &ByteOrder, right: &ByteOrder) -> Result<()> {
    if !left.same_order(right) {
        return Err(StoreError::SchemaMismatch(format!(
            "cannot merge structures with different orders: {:?} vs {:?}",
            left, right
        )));
    }
    Ok(())
}

/// Compare in traversal direction: `ascending == false` walks the order
/// backwards
#[inline]
pub(crate) fn directed(order: &ByteOrder, ascending: bool, a: &[u8], b: &[u8]) -> Ordering {
    let ord = order.compare(a, b);
    if ascending {
        ord
    } else {
        ord.reverse()
    }
}
