//! Fixed-capacity top-K retention.
//!
//! Keeps the K greatest items seen so far in a min-heap, so a ranking over an
//! unbounded stream never holds more than K candidates. Two partial
//! selections merge by re-pushing one into the other, which makes shard
//! results combinable in any order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Bounded selection of the K greatest items
#[derive(Debug, Clone)]
pub struct TopK<T: Ord> {
    capacity: usize,
    heap: BinaryHeap<Reverse<T>>,
}

impl<T: Ord> TopK<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1).min(1024)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Smallest retained item, the one the next admission would evict
    pub fn peek_min(&self) -> Option<&T> {
        self.heap.peek().map(|Reverse(min)| min)
    }

    /// Offer an item; it is kept only if it ranks among the K greatest.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(item));
            return;
        }
        let replaces_min = self
            .heap
            .peek()
            .map(|Reverse(min)| item > *min)
            .unwrap_or(false);
        if replaces_min {
            self.heap.pop();
            self.heap.push(Reverse(item));
        }
    }

    /// Fold another partial selection into this one.
    pub fn merge(&mut self, other: TopK<T>) {
        for Reverse(item) in other.heap {
            self.push(item);
        }
    }

    /// Retained items, greatest first
    pub fn into_sorted_vec(self) -> Vec<T> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(item)| item)
            .collect()
    }
}

/// Payload ordered by its ranking key alone
#[derive(Debug, Clone)]
pub struct Ranked<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Ranked<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

impl<K: PartialEq, V> PartialEq for Ranked<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq, V> Eq for Ranked<K, V> {}

impl<K: Ord, V> PartialOrd for Ranked<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for Ranked<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
