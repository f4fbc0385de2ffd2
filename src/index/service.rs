//! Search and suggestion entry points
//!
//! `SearchService` ties the cache to the stored field values: it builds
//! (or reuses) the inverted index of an indexer, answers ranked keyword
//! searches with an optional boost, and serves autocomplete suggestions
//! from the indexer's entity dictionary.

use crate::config::IndexerConfig;
use crate::index::cache::IndexCache;
use crate::index::formula::evaluate_formula;
use crate::index::inverted::{Bm25Params, InvertedIndex};
use crate::index::qgram::QGramIndex;
use crate::index::tokenize::tokenize;
use crate::storage::{FieldValueRecord, FieldValueSource};
use crate::{Result, ScrapeError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Index builds allowed to run in the background at once
pub const BACKGROUND_BUILDS: usize = 2;

/// One ranked document
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document_id: i64,
    pub score: f64,
    /// `(field name, value)` of every stored value of the document
    pub values: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    /// Keywords actually searched, after vocabulary correction
    pub keywords: Vec<String>,
    pub hits: Vec<SearchHit>,
}

/// One autocomplete suggestion
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub entity_id: usize,
    pub name: String,
    pub score: i64,
    pub ped: usize,
    /// The name or synonym the prefix matched
    pub matched_name: String,
}

#[derive(Clone)]
pub struct SearchService {
    cache: Arc<IndexCache>,
    source: Arc<dyn FieldValueSource>,
    build_permits: Arc<Semaphore>,
}

impl SearchService {
    pub fn new(cache: Arc<IndexCache>, source: Arc<dyn FieldValueSource>) -> Self {
        Self {
            cache,
            source,
            build_permits: Arc::new(Semaphore::new(BACKGROUND_BUILDS)),
        }
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    /// Returns the cached index of `indexer`, building it on a cold cache
    pub fn build_index(&self, indexer: &IndexerConfig) -> Result<Arc<InvertedIndex>> {
        let key = IndexCache::indexer_key(&indexer.name);
        if let Some(index) = self.cache.get_index(&key) {
            tracing::debug!("Index '{}' already built", indexer.name);
            return Ok(index);
        }

        let values = self.source.field_values_for(&indexer.fields)?;
        tracing::info!(
            "Building index '{}' over {} field values",
            indexer.name,
            values.len()
        );
        let index = InvertedIndex::build(&values, &Bm25Params::from_config(indexer), indexer.q);
        Ok(self.cache.insert_index(&key, Arc::new(index)))
    }

    /// Drops the cached index of `indexer` and builds it again
    pub fn rebuild_index(&self, indexer: &IndexerConfig) -> Result<Arc<InvertedIndex>> {
        self.cache.invalidate(&IndexCache::indexer_key(&indexer.name));
        self.build_index(indexer)
    }

    /// Builds an index on the blocking pool without holding up the caller
    ///
    /// At most [`BACKGROUND_BUILDS`] builds run at a time; later requests
    /// wait for a permit.
    pub fn build_in_background(
        &self,
        indexer: IndexerConfig,
    ) -> JoinHandle<Result<Arc<InvertedIndex>>> {
        let service = self.clone();
        let permits = Arc::clone(&self.build_permits);

        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| ScrapeError::Index(e.to_string()))?;

            tokio::task::spawn_blocking(move || service.build_index(&indexer))
                .await
                .map_err(|e| ScrapeError::Index(format!("index build task failed: {}", e)))?
        })
    }

    /// Ranked OR-search over the indexer's field values
    ///
    /// Posting scores are summed per document. When the indexer has a
    /// boosting formula, each document's variable values are added on top
    /// through it.
    ///
    /// # Arguments
    ///
    /// * `indexer` - The indexer to search (built on demand)
    /// * `query` - Free text; tokenized like indexed values
    pub fn search(&self, indexer: &IndexerConfig, query: &str) -> Result<SearchResults> {
        let index = self.build_index(indexer)?;
        let keywords: Vec<String> = tokenize(query)
            .iter()
            .map(|kw| index.correct_keyword(kw))
            .collect();

        let mut per_document: Vec<(i64, f64)> = Vec::new();
        let mut positions: HashMap<i64, usize> = HashMap::new();
        for posting in index.process_query(&keywords) {
            match positions.get(&posting.document_id) {
                Some(&pos) => per_document[pos].1 += posting.score,
                None => {
                    positions.insert(posting.document_id, per_document.len());
                    per_document.push((posting.document_id, posting.score));
                }
            }
        }

        let mut hits = Vec::with_capacity(per_document.len());
        for (document_id, score) in per_document {
            let values = self.source.field_values_of_document(document_id)?;
            let boost = match &indexer.boosting_formula {
                Some(formula) => evaluate_formula(formula, &formula_variables(&values)),
                None => 0.0,
            };
            hits.push(SearchHit {
                document_id,
                score: score + boost,
                values: values
                    .into_iter()
                    .map(|v| (v.field_name, v.value))
                    .collect(),
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        Ok(SearchResults { keywords, hits })
    }

    /// Autocomplete suggestions for a prefix from the indexer's dictionary
    pub fn suggest(&self, indexer: &IndexerConfig, prefix: &str) -> Result<Vec<Suggestion>> {
        let dictionary = self.dictionary(indexer)?;
        let normalized = QGramIndex::normalize(prefix);
        let (matches, computations) = dictionary.find_matches(&normalized, indexer.suggest_delta);
        tracing::debug!(
            "Suggest '{}': {} matches, {} PED computations",
            normalized,
            matches.len(),
            computations
        );

        let suggestions = QGramIndex::rank_matches(matches)
            .into_iter()
            .filter_map(|m| {
                let entity = dictionary.entity(m.entity_id)?;
                Some(Suggestion {
                    entity_id: m.entity_id,
                    name: entity.name.clone(),
                    score: m.score,
                    ped: m.ped,
                    matched_name: dictionary.name(m.name_id)?.to_string(),
                })
            })
            .collect();
        Ok(suggestions)
    }

    fn dictionary(&self, indexer: &IndexerConfig) -> Result<Arc<QGramIndex>> {
        let path = indexer.dictionary.as_deref().ok_or_else(|| {
            ScrapeError::Index(format!("indexer '{}' has no dictionary", indexer.name))
        })?;
        let key = format!(
            "dictionary:{}:{}:{}",
            path, indexer.q, indexer.use_synonyms
        );
        if let Some(dictionary) = self.cache.get_dictionary(&key) {
            return Ok(dictionary);
        }

        let mut dictionary = QGramIndex::new(indexer.q, indexer.use_synonyms);
        dictionary.build_from_file(Path::new(path))?;
        Ok(self.cache.insert_dictionary(&key, Arc::new(dictionary)))
    }
}

/// Numeric variables of a document: values whose field declares a
/// variable name and that parse as a number
fn formula_variables(values: &[FieldValueRecord]) -> HashMap<String, f64> {
    values
        .iter()
        .filter_map(|v| {
            let name = v.variable_name.as_ref()?;
            match v.value.trim().parse::<f64>() {
                Ok(number) => Some((name.clone(), number)),
                Err(_) => {
                    tracing::debug!("Variable '{}' is not numeric: '{}'", name, v.value);
                    None
                }
            }
        })
        .collect()
}
