// src/dedup.rs
use std::collections::{HashSet, VecDeque};

/// Bounded FIFO membership cache for recently seen source links.
/// - `insert` evicts the oldest entry once capacity is exceeded.
/// - `contains` is O(1) amortized (HashSet mirror of the queue).
///
/// This is a performance shortcut inside one crawl session only; the
/// persistent store remains the authority for cross-run dedup, so a miss
/// here is always followed by a store lookup.
#[derive(Debug)]
pub struct RecentLinkCache {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecentLinkCache {
    /// `capacity` of 0 is bumped to 1 so the cache stays well-formed.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            members: HashSet::with_capacity(capacity + 1),
        }
    }

    pub fn contains(&self, link: &str) -> bool {
        self.members.contains(link)
    }

    pub fn insert(&mut self, link: impl Into<String>) {
        let link = link.into();
        if !self.members.insert(link.clone()) {
            return; // already tracked; keep original FIFO position
        }
        self.order.push_back(link);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find() {
        let mut c = RecentLinkCache::new(3);
        c.insert("a");
        assert!(c.contains("a"));
        assert!(!c.contains("b"));
    }

    #[test]
    fn capacity_plus_one_evicts_oldest() {
        let mut c = RecentLinkCache::new(10);
        for i in 0..11 {
            c.insert(format!("link-{i}"));
        }
        assert!(!c.contains("link-0"));
        for i in 1..11 {
            assert!(c.contains(&format!("link-{i}")), "link-{i} should remain");
        }
        assert_eq!(c.len(), 10);
    }

    #[test]
    fn duplicate_insert_does_not_grow() {
        let mut c = RecentLinkCache::new(2);
        c.insert("x");
        c.insert("x");
        c.insert("y");
        assert_eq!(c.len(), 2);
        assert!(c.contains("x"));
        assert!(c.contains("y"));
    }
}
