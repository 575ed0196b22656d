//! Re-basing scans
//!
//! A scan over live structures may be cut short by a concurrent structural
//! change. `RebasingIterator` rebuilds the scan from the last key it emitted
//! and carries on, a bounded number of times.

use std::cmp::Ordering;

use crate::error::{Result, StoreError};
use crate::order::ByteOrder;

use super::{directed, BoxIter, Keyed};

/// Builds a fresh scan starting at (and including) the given key
pub type RebaseFn<T> = Box<dyn Fn(Option<&[u8]>) -> Result<BoxIter<T>> + Send>;

pub struct RebasingIterator<T> {
    rebase: RebaseFn<T>,
    current: BoxIter<T>,
    /// Caller's start key, used until the first item is emitted
    start: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    order: ByteOrder,
    ascending: bool,
    retries_left: usize,
    done: bool,
}

impl<T: Keyed> RebasingIterator<T> {
    pub fn new(
        start: Option<&[u8]>,
        order: ByteOrder,
        ascending: bool,
        max_retries: usize,
        rebase: RebaseFn<T>,
    ) -> Result<Self> {
        let current = rebase(start)?;
        Ok(Self {
            rebase,
            current,
            start: start.map(<[u8]>::to_vec),
            last_key: None,
            order,
            ascending,
            retries_left: max_retries,
            done: false,
        })
    }

    /// Number of re-bases still allowed
    pub fn retries_left(&self) -> usize {
        self.retries_left
    }
}

impl<T: Keyed> Iterator for RebasingIterator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            match self.current.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Ok(item)) => {
                    if let Some(last) = &self.last_key {
                        // A rebuilt scan restarts at the last key; skip what was already emitted
                        if directed(&self.order, self.ascending, item.merge_key(), last)
                            != Ordering::Greater
                        {
                            continue;
                        }
                    }
                    self.last_key = Some(item.merge_key().to_vec());
                    return Some(Ok(item));
                }
                Some(Err(StoreError::ConcurrentModification(reason))) if self.retries_left > 0 => {
                    self.retries_left -= 1;
                    tracing::debug!(%reason, "re-basing scan after concurrent modification");
                    let from = self.last_key.as_deref().or(self.start.as_deref());
                    match (self.rebase)(from) {
                        Ok(iter) => self.current = iter,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
