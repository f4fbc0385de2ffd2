//! Per-depth work queues
//!
//! Every worker owns one `LevelQueue`: pending links bucketed by the depth
//! at which they were discovered. Within a depth the bucket is a stack
//! (last discovered, first processed). Which depth to work next is decided
//! by the traversal order and re-evaluated after every link, since new
//! depths appear while the crawl runs.

use crate::state::Link;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Which depth a worker picks when several have pending links
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalOrder {
    /// Deepest discovered depth first
    #[default]
    BottomUp,
    /// Shallowest depth first
    TopDown,
}

/// Pending links partitioned by depth
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelQueue {
    levels: BTreeMap<u32, Vec<Link>>,
}

impl LevelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a queue holding a single depth's links
    pub fn from_level(depth: u32, links: Vec<Link>) -> Self {
        let mut levels = BTreeMap::new();
        if !links.is_empty() {
            levels.insert(depth, links);
        }
        Self { levels }
    }

    /// Appends a link to the bucket of its own depth
    pub fn push(&mut self, link: Link) {
        self.levels.entry(link.depth).or_default().push(link);
    }

    /// Pops the most recently pushed link of `depth`
    pub fn pop_from(&mut self, depth: u32) -> Option<Link> {
        let bucket = self.levels.get_mut(&depth)?;
        let link = bucket.pop();
        if bucket.is_empty() {
            self.levels.remove(&depth);
        }
        link
    }

    /// Number of pending links at `depth`
    pub fn len_at(&self, depth: u32) -> usize {
        self.levels.get(&depth).map_or(0, Vec::len)
    }

    /// Number of pending links across all depths
    pub fn len(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.values().all(Vec::is_empty)
    }

    /// Picks the depth to work next
    ///
    /// Only depths with pending links are candidates. `BottomUp` returns
    /// the deepest one, `TopDown` the shallowest.
    ///
    /// # Returns
    ///
    /// * `Some(depth)` - A depth with at least one pending link
    /// * `None` - Nothing is pending
    pub fn select_level(&self, order: TraversalOrder) -> Option<u32> {
        let mut candidates = self
            .levels
            .iter()
            .filter(|(_, links)| !links.is_empty())
            .map(|(depth, _)| *depth);

        match order {
            TraversalOrder::BottomUp => candidates.next_back(),
            TraversalOrder::TopDown => candidates.next(),
        }
    }

    /// Removes and returns the second half of the `depth` bucket
    ///
    /// The first `len / 2` links stay; the tail is handed out. A bucket of
    /// one link keeps nothing and donates it.
    pub fn split_off_tail(&mut self, depth: u32) -> Vec<Link> {
        let Some(bucket) = self.levels.get_mut(&depth) else {
            return Vec::new();
        };
        let keep = bucket.len() / 2;
        let tail = bucket.split_off(keep);
        if bucket.is_empty() {
            self.levels.remove(&depth);
        }
        tail
    }

    /// Iterates over every pending link, shallowest depth first
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.levels.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, depth: u32) -> Link {
        Link::new(url, depth)
    }

    #[test]
    fn test_select_level_empty() {
        let queue = LevelQueue::new();
        assert_eq!(queue.select_level(TraversalOrder::BottomUp), None);
        assert_eq!(queue.select_level(TraversalOrder::TopDown), None);
    }

    #[test]
    fn test_select_level_by_order() {
        let mut queue = LevelQueue::new();
        queue.push(link("a", 0));
        queue.push(link("b", 3));
        queue.push(link("c", 1));

        assert_eq!(queue.select_level(TraversalOrder::BottomUp), Some(3));
        assert_eq!(queue.select_level(TraversalOrder::TopDown), Some(0));
    }

    #[test]
    fn test_drained_level_no_longer_selected() {
        let mut queue = LevelQueue::new();
        queue.push(link("a", 0));
        queue.push(link("b", 5));

        assert!(queue.pop_from(5).is_some());
        assert_eq!(queue.select_level(TraversalOrder::BottomUp), Some(0));
    }

    #[test]
    fn test_pop_is_lifo() {
        let mut queue = LevelQueue::new();
        queue.push(link("first", 1));
        queue.push(link("second", 1));

        assert_eq!(queue.pop_from(1).unwrap().url, "second");
        assert_eq!(queue.pop_from(1).unwrap().url, "first");
        assert!(queue.pop_from(1).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_large_depth_keys() {
        let mut queue = LevelQueue::new();
        queue.push(link("deep", u32::MAX));
        assert_eq!(queue.select_level(TraversalOrder::BottomUp), Some(u32::MAX));
        assert_eq!(queue.len_at(u32::MAX), 1);
    }

    #[test]
    fn test_split_off_tail_keeps_first_half() {
        let mut queue = LevelQueue::new();
        for i in 0..7 {
            queue.push(link(&format!("l{}", i), 2));
        }

        let tail = queue.split_off_tail(2);
        let tail_urls: Vec<_> = tail.iter().map(|l| l.url.as_str()).collect();

        assert_eq!(tail_urls, vec!["l3", "l4", "l5", "l6"]);
        assert_eq!(queue.len_at(2), 3);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_split_off_missing_level() {
        let mut queue = LevelQueue::new();
        assert!(queue.split_off_tail(4).is_empty());
    }
}
