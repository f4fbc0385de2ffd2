//! Process-wide cache of built indexes
//!
//! Inverted indexes are keyed by indexer identity and q-gram dictionaries
//! by their source file and build options. An entry, once inserted, is
//! kept until it is explicitly invalidated: a second insert under the same
//! key hands back the entry that is already there.

use crate::index::inverted::InvertedIndex;
use crate::index::qgram::QGramIndex;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A built inverted index with its build time
#[derive(Debug, Clone)]
pub struct CachedIndex {
    pub index: Arc<InvertedIndex>,
    pub built_at: DateTime<Utc>,
}

impl CachedIndex {
    fn new(index: Arc<InvertedIndex>) -> Self {
        Self {
            index,
            built_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct IndexCache {
    indexers: RwLock<HashMap<String, CachedIndex>>,
    dictionaries: RwLock<HashMap<String, Arc<QGramIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key of an indexer
    pub fn indexer_key(name: &str) -> String {
        format!("indexer:{}", name)
    }

    pub fn get_index(&self, key: &str) -> Option<Arc<InvertedIndex>> {
        self.indexers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|entry| Arc::clone(&entry.index))
    }

    /// Caches a built index unless one is already cached under `key`
    ///
    /// # Returns
    ///
    /// The index that ends up cached, which is the earlier one when two
    /// builds race
    pub fn insert_index(&self, key: &str, index: Arc<InvertedIndex>) -> Arc<InvertedIndex> {
        let mut indexers = self
            .indexers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = indexers
            .entry(key.to_string())
            .or_insert_with(|| CachedIndex::new(index));
        Arc::clone(&entry.index)
    }

    /// When the index under `key` was cached
    pub fn built_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.indexers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|entry| entry.built_at)
    }

    /// Keys of every cached inverted index, sorted
    pub fn cached_indexer_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .indexers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Drops a cached inverted index so the next build starts over
    ///
    /// # Returns
    ///
    /// * `true` - If an entry was removed
    /// * `false` - If nothing was cached under `key`
    pub fn invalidate(&self, key: &str) -> bool {
        self.indexers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn get_dictionary(&self, key: &str) -> Option<Arc<QGramIndex>> {
        self.dictionaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert_dictionary(&self, key: &str, dictionary: Arc<QGramIndex>) -> Arc<QGramIndex> {
        let mut dictionaries = self
            .dictionaries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(dictionaries.entry(key.to_string()).or_insert(dictionary))
    }
}
