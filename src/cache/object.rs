//! Object cache with age-based eviction

use std::collections::HashMap;
use std::hash::Hash;

use crate::score::ScoreCluster;

/// Bounded key → value cache.
///
/// Every `get` hit and every `put` stamps the entry with the next tick of a
/// monotonically increasing clock; when the cache is over its bound the
/// entry with the oldest stamp is evicted. A bound of 0 disables caching.
#[derive(Debug)]
pub struct ObjectCache<K, V> {
    max_entries: usize,
    entries: HashMap<K, V>,
    ages: ScoreCluster<K>,
    clock: i64,
    evictions: u64,
}

impl<K: Eq + Hash + Clone, V> ObjectCache<K, V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: HashMap::new(),
            ages: ScoreCluster::new(),
            clock: 0,
            evictions: 0,
        }
    }

    /// Look up `key`, refreshing its age on a hit
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key.clone());
        self.entries.get(key)
    }

    /// Look up `key` without refreshing its age
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace; returns the replaced value
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if self.max_entries == 0 {
            return None;
        }
        self.touch(key.clone());
        let previous = self.entries.insert(key, value);
        while self.entries.len() > self.max_entries {
            let Some((oldest, _)) = self.ages.pop_min() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
        previous
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.ages.remove(key);
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ages.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Entries dropped to stay within the bound
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn touch(&mut self, key: K) {
        self.clock += 1;
        self.ages.set_score(key, self.clock);
    }
}
