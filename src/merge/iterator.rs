//! Two-way and cascaded merge iterators

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::order::ByteOrder;
use crate::row::RowEntry;

use super::directed;

/// Boxed fallible ordered iterator, the currency of all index scans
pub type BoxIter<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Items that can be merged by key
pub trait Keyed {
    fn merge_key(&self) -> &[u8];
}

impl Keyed for Vec<u8> {
    fn merge_key(&self) -> &[u8] {
        self
    }
}

impl Keyed for RowEntry {
    fn merge_key(&self) -> &[u8] {
        self.key()
    }
}

/// What to emit when both sides hold the same key
pub enum Resolution<T> {
    /// Keep the left item (the higher-priority, newer side)
    LeftWins,
    /// Keep the right item
    RightWins,
    /// Combine both items; called as `f(left, right)`
    Custom(Arc<dyn Fn(T, T) -> T + Send + Sync>),
}

impl<T> Resolution<T> {
    pub fn custom(f: impl Fn(T, T) -> T + Send + Sync + 'static) -> Self {
        Resolution::Custom(Arc::new(f))
    }

    pub fn resolve(&self, left: T, right: T) -> T {
        match self {
            Resolution::LeftWins => left,
            Resolution::RightWins => right,
            Resolution::Custom(f) => f(left, right),
        }
    }
}

impl<T> Clone for Resolution<T> {
    fn clone(&self) -> Self {
        match self {
            Resolution::LeftWins => Resolution::LeftWins,
            Resolution::RightWins => Resolution::RightWins,
            Resolution::Custom(f) => Resolution::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::LeftWins => write!(f, "LeftWins"),
            Resolution::RightWins => write!(f, "RightWins"),
            Resolution::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Ordered union of two ordered iterators.
///
/// Both inputs must be sorted by `order` in the traversal direction given by
/// `ascending`. The first error from either side is yielded and ends the
/// merge.
pub struct MergeIterator<T> {
    left: Side<T>,
    right: Side<T>,
    order: ByteOrder,
    ascending: bool,
    resolution: Resolution<T>,
    failed: bool,
}

struct Side<T> {
    iter: BoxIter<T>,
    head: Option<T>,
    exhausted: bool,
}

impl<T> Side<T> {
    fn new(iter: BoxIter<T>) -> Self {
        Self {
            iter,
            head: None,
            exhausted: false,
        }
    }

    /// Make sure `head` holds the next item unless the side is exhausted
    fn fill(&mut self) -> Result<()> {
        if self.head.is_none() && !self.exhausted {
            match self.iter.next() {
                Some(Ok(item)) => self.head = Some(item),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Err(e);
                }
                None => self.exhausted = true,
            }
        }
        Ok(())
    }
}

impl<T: Keyed + Send + 'static> MergeIterator<T> {
    pub fn new(
        left: BoxIter<T>,
        right: BoxIter<T>,
        order: ByteOrder,
        ascending: bool,
        resolution: Resolution<T>,
    ) -> Self {
        Self {
            left: Side::new(left),
            right: Side::new(right),
            order,
            ascending,
            resolution,
            failed: false,
        }
    }

    /// N-way merge as a right fold: `s0 ⋈ (s1 ⋈ (s2 ⋈ ...))`.
    /// Earlier sources are "left" of later ones.
    pub fn cascade(
        sources: Vec<BoxIter<T>>,
        order: ByteOrder,
        ascending: bool,
        resolution: Resolution<T>,
    ) -> BoxIter<T> {
        let mut rest = sources.into_iter().rev();
        let Some(mut merged) = rest.next() else {
            return Box::new(std::iter::empty());
        };
        for source in rest {
            merged = Box::new(MergeIterator::new(
                source,
                merged,
                order.clone(),
                ascending,
                resolution.clone(),
            ));
        }
        merged
    }
}

impl<T: Keyed> Iterator for MergeIterator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Err(e) = self.left.fill().and_then(|_| self.right.fill()) {
            self.failed = true;
            return Some(Err(e));
        }

        match (self.left.head.take(), self.right.head.take()) {
            (None, None) => None,
            (Some(left), None) => Some(Ok(left)),
            (None, Some(right)) => Some(Ok(right)),
            (Some(left), Some(right)) => {
                match directed(&self.order, self.ascending, left.merge_key(), right.merge_key()) {
                    Ordering::Less => {
                        self.right.head = Some(right);
                        Some(Ok(left))
                    }
                    Ordering::Greater => {
                        self.left.head = Some(left);
                        Some(Ok(right))
                    }
                    Ordering::Equal => Some(Ok(self.resolution.resolve(left, right))),
                }
            }
        }
    }
}
