//! Score Cluster
//!
//! Objects ranked by an integer score, with ordered extraction from either
//! end. Caches use it for age-based eviction; callers can use it for
//! popularity ranking.
//!
//! ## Structure
//! ```text
//!   scores: HashMap<K, (score, seq)>        ranked: BTreeMap<(score, seq), K>
//!   ┌────────┬──────────┐                   ┌──────────┬────────┐
//!   │ "a"    │ (3, 0)   │ ◀───────────────▶ │ (1, 2)   │ "c"    │ ◀── min
//!   │ "b"    │ (7, 1)   │                   │ (3, 0)   │ "a"    │
//!   │ "c"    │ (1, 2)   │                   │ (7, 1)   │ "b"    │ ◀── max
//!   └────────┴──────────┘                   └──────────┴────────┘
//! ```
//! `seq` orders objects with equal scores: the one scored earlier comes
//! first.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct ScoreCluster<K> {
    scores: HashMap<K, (i64, u64)>,
    ranked: BTreeMap<(i64, u64), K>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone> Default for ScoreCluster<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> ScoreCluster<K> {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            ranked: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Set the score of `key`, inserting it when absent; returns the old score
    pub fn set_score(&mut self, key: K, score: i64) -> Option<i64> {
        let previous = self.detach(&key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.ranked.insert((score, seq), key.clone());
        self.scores.insert(key, (score, seq));
        previous
    }

    /// Add `delta` to the score of `key` (absent keys start at 0); returns
    /// the new score
    pub fn add_score(&mut self, key: K, delta: i64) -> i64 {
        let score = self.score(&key).unwrap_or(0).saturating_add(delta);
        self.set_score(key, score);
        score
    }

    pub fn score(&self, key: &K) -> Option<i64> {
        self.scores.get(key).map(|&(score, _)| score)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.scores.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<i64> {
        self.detach(key)
    }

    /// Lowest-scored object
    pub fn min(&self) -> Option<(&K, i64)> {
        self.ranked
            .iter()
            .next()
            .map(|(&(score, _), key)| (key, score))
    }

    /// Highest-scored object
    pub fn max(&self) -> Option<(&K, i64)> {
        self.ranked
            .iter()
            .next_back()
            .map(|(&(score, _), key)| (key, score))
    }

    pub fn pop_min(&mut self) -> Option<(K, i64)> {
        let ((score, _), key) = self.ranked.pop_first()?;
        self.scores.remove(&key);
        Some((key, score))
    }

    pub fn pop_max(&mut self) -> Option<(K, i64)> {
        let ((score, _), key) = self.ranked.pop_last()?;
        self.scores.remove(&key);
        Some((key, score))
    }

    /// Objects by score, lowest first when `ascending`
    pub fn iter(&self, ascending: bool) -> Box<dyn Iterator<Item = (&K, i64)> + '_> {
        let entries = self.ranked.iter().map(|(&(score, _), key)| (key, score));
        if ascending {
            Box::new(entries)
        } else {
            Box::new(entries.rev())
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn clear(&mut self) {
        self.scores.clear();
        self.ranked.clear();
    }

    fn detach(&mut self, key: &K) -> Option<i64> {
        let (score, seq) = self.scores.remove(key)?;
        self.ranked.remove(&(score, seq));
        Some(score)
    }
}
