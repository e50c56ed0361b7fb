//! Bounded top-K retention over (item, score) pairs.
//!
//! Insertion is an unconditional append. Ranking happens once per batch in
//! [`ResultPool::cut`], which sorts the accumulated scores and keeps the
//! `capacity` best entries. After a cut the entries are in ascending score
//! order, so the best entry is last when keeping the largest scores and
//! first when keeping the smallest.

use std::cmp::Ordering;

/// Bounded collection of items and their scores.
#[derive(Debug, Clone)]
pub struct ResultPool<T> {
    capacity: usize,
    items: Vec<T>,
    scores: Vec<f64>,
}

impl<T> ResultPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity.min(1024)),
            scores: Vec::with_capacity(capacity.min(1024)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Append an entry. No ordering is maintained until the next cut.
    pub fn in_pool(&mut self, item: T, score: f64) {
        self.items.push(item);
        self.scores.push(score);
    }

    /// Keep only the `capacity` best entries, sorted ascending by score.
    ///
    /// NaN scores rank below everything when keeping the largest and above
    /// everything when keeping the smallest, so they are dropped first.
    pub fn cut(&mut self, keep_largest: bool) {
        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        let scores = &self.scores;
        order.sort_by(|&a, &b| rank_cmp(scores[a], scores[b], keep_largest));

        let keep: Vec<usize> = if keep_largest {
            let skip = order.len().saturating_sub(self.capacity);
            order[skip..].to_vec()
        } else {
            order.into_iter().take(self.capacity).collect()
        };

        let mut slots: Vec<Option<(T, f64)>> = self
            .items
            .drain(..)
            .zip(self.scores.drain(..))
            .map(Some)
            .collect();
        for idx in keep {
            if let Some((item, score)) = slots[idx].take() {
                self.items.push(item);
                self.scores.push(score);
            }
        }
    }

    /// Best entry after a cut.
    pub fn best(&self, keep_largest: bool) -> Option<(&T, f64)> {
        let idx = if keep_largest {
            self.items.len().checked_sub(1)?
        } else if self.items.is_empty() {
            return None;
        } else {
            0
        };
        Some((&self.items[idx], self.scores[idx]))
    }

    /// Drop every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.items.clear();
        self.scores.clear();
    }

    /// Concatenate two pools. The result takes the larger capacity and is
    /// unordered until cut.
    pub fn merge(mut self, other: ResultPool<T>) -> Self {
        self.capacity = self.capacity.max(other.capacity);
        self.items.extend(other.items);
        self.scores.extend(other.scores);
        self
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<f64>) {
        (self.items, self.scores)
    }
}

/// Ascending order with NaN placed where it is discarded first.
fn rank_cmp(a: f64, b: f64, keep_largest: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) if keep_largest => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) if keep_largest => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}
