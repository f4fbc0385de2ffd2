//! BM25-ranked inverted index over extracted field values
//!
//! Every field value is one indexed document, numbered by a one-based
//! document counter in the order values are read. Posting lists are kept
//! sorted by that counter so keyword lists can be combined with a linear
//! merge.

use crate::config::IndexerConfig;
use crate::index::qgram::QGramIndex;
use crate::index::tokenize::tokenize;
use crate::storage::FieldValueRecord;
use std::collections::{HashMap, HashSet};

/// One entry of a word's posting list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    /// One-based position of the field value in the build input
    pub doc_counter: usize,
    pub field_value_id: i64,
    /// Raw term frequency during the first pass, BM25 score afterwards
    pub score: f64,
    pub document_id: i64,
}

/// Tuning knobs for the BM25 build
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Params {
    pub k: f64,
    pub b: f64,
    pub small_words_threshold: usize,
    pub skip_words: HashSet<String>,
    pub weight_words: HashMap<String, f64>,
}

impl Bm25Params {
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            k: config.k,
            b: config.b,
            small_words_threshold: config.small_words_threshold,
            skip_words: config.skip_words.iter().map(|w| w.to_lowercase()).collect(),
            weight_words: config
                .weight_words
                .iter()
                .map(|(w, weight)| (w.to_lowercase(), *weight))
                .collect(),
        }
    }

    fn keeps(&self, word: &str) -> bool {
        word.chars().count() > self.small_words_threshold && !self.skip_words.contains(word)
    }
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k: 1.75,
            b: 0.75,
            small_words_threshold: 0,
            skip_words: HashSet::new(),
            weight_words: HashMap::new(),
        }
    }
}

/// Word → postings index with a word-level q-gram index for corrections
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>,
    /// Kept-token count per document counter; slot 0 is unused
    doc_lengths: Vec<usize>,
    vocabulary: QGramIndex,
}

impl InvertedIndex {
    /// Builds the index in two passes: term frequencies first, then BM25
    /// scores once document lengths are known
    ///
    /// # Arguments
    ///
    /// * `values` - Field values to index, in document-counter order
    /// * `params` - BM25 parameters and word filters
    /// * `q` - Q-gram size of the vocabulary index
    pub fn build(values: &[FieldValueRecord], params: &Bm25Params, q: usize) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut doc_lengths = vec![0usize];
        let mut vocabulary = QGramIndex::new(q, false);

        for (idx, value) in values.iter().enumerate() {
            let doc_counter = idx + 1;
            let mut length = 0;

            for word in tokenize(&value.value) {
                if !params.keeps(&word) {
                    continue;
                }
                length += 1;

                if !postings.contains_key(&word) {
                    vocabulary.add_entity(word.clone(), 0, Vec::new(), &[]);
                }
                let list = postings.entry(word).or_default();
                match list.last_mut() {
                    Some(last) if last.doc_counter == doc_counter => last.score += 1.0,
                    _ => list.push(Posting {
                        doc_counter,
                        field_value_id: value.id,
                        score: 1.0,
                        document_id: value.document_id,
                    }),
                }
            }
            doc_lengths.push(length);
        }

        let n = values.len() as f64;
        let total: usize = doc_lengths.iter().sum();
        let avdl = if values.is_empty() {
            0.0
        } else {
            total as f64 / n
        };

        for (word, list) in postings.iter_mut() {
            let df = list.len() as f64;
            let idf = (n / df).log2();
            let bonus = params.weight_words.get(word).copied().unwrap_or(0.0);

            for posting in list.iter_mut() {
                let dl = doc_lengths[posting.doc_counter] as f64;
                let tf = posting.score;
                let tf = if params.k == 0.0 {
                    1.0
                } else {
                    let alpha = 1.0 - params.b + params.b * dl / avdl;
                    tf * (1.0 + 1.0 / params.k) / (alpha + tf / params.k)
                };
                posting.score = tf * idf + bonus;
            }
        }

        tracing::info!(
            "Indexed {} field values, {} distinct words",
            values.len(),
            postings.len()
        );

        Self {
            postings,
            doc_lengths,
            vocabulary,
        }
    }

    /// Wraps ready-made posting lists (already scored and sorted by counter)
    pub fn from_postings(postings: HashMap<String, Vec<Posting>>) -> Self {
        let docs = postings
            .values()
            .flat_map(|list| list.iter().map(|p| p.doc_counter))
            .max()
            .unwrap_or(0);

        let mut vocabulary = QGramIndex::new(3, false);
        let mut words: Vec<&String> = postings.keys().collect();
        words.sort();
        for word in words {
            vocabulary.add_entity(word.clone(), 0, Vec::new(), &[]);
        }

        Self {
            postings,
            doc_lengths: vec![0; docs + 1],
            vocabulary,
        }
    }

    /// Linear merge of two counter-sorted lists; equal counters have their
    /// scores summed and keep the first list's other fields
    pub fn merge(list1: &[Posting], list2: &[Posting]) -> Vec<Posting> {
        let mut merged = Vec::with_capacity(list1.len() + list2.len());
        let (mut i, mut j) = (0, 0);

        while i < list1.len() && j < list2.len() {
            let (a, b) = (list1[i], list2[j]);
            if a.doc_counter == b.doc_counter {
                merged.push(Posting {
                    score: a.score + b.score,
                    ..a
                });
                i += 1;
                j += 1;
            } else if a.doc_counter < b.doc_counter {
                merged.push(a);
                i += 1;
            } else {
                merged.push(b);
                j += 1;
            }
        }
        merged.extend_from_slice(&list1[i..]);
        merged.extend_from_slice(&list2[j..]);
        merged
    }

    /// OR-query: postings of every keyword merged, zero scores dropped,
    /// highest score first
    pub fn process_query(&self, keywords: &[String]) -> Vec<Posting> {
        let mut result: Vec<Posting> = Vec::new();
        for keyword in keywords {
            if let Some(list) = self.postings.get(keyword) {
                result = Self::merge(&result, list);
            }
        }

        result.retain(|p| p.score != 0.0);
        result.sort_by(|a, b| b.score.total_cmp(&a.score));
        result
    }

    /// Replaces a keyword missing from the vocabulary with its closest
    /// indexed word (prefix edit distance at most 1), if any
    pub fn correct_keyword(&self, keyword: &str) -> String {
        if self.postings.contains_key(keyword) {
            return keyword.to_string();
        }

        let normalized = QGramIndex::normalize(keyword);
        if normalized.is_empty() {
            return keyword.to_string();
        }

        let (matches, _) = self.vocabulary.find_matches(&normalized, 1);
        matches
            .iter()
            .min_by_key(|m| (m.ped, m.name_id))
            .and_then(|best| self.vocabulary.name(best.name_id))
            .map(str::to_string)
            .unwrap_or_else(|| keyword.to_string())
    }

    pub fn postings(&self, word: &str) -> &[Posting] {
        self.postings.get(word).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of indexed field values
    pub fn document_count(&self) -> usize {
        self.doc_lengths.len().saturating_sub(1)
    }

    pub fn word_count(&self) -> usize {
        self.postings.len()
    }

    /// Kept-token count of one document counter
    pub fn document_length(&self, doc_counter: usize) -> Option<usize> {
        match doc_counter {
            0 => None,
            n => self.doc_lengths.get(n).copied(),
        }
    }
}
