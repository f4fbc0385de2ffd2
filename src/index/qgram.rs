//! Q-gram index for fuzzy prefix search
//!
//! Every indexed name is normalized, left-padded with `q - 1` `$`
//! characters and cut into overlapping q-grams. A q-gram's posting list
//! holds `(name_id, frequency)` pairs in increasing name order, which is
//! what lets `merge_lists` do a k-way merge instead of a sort.
//!
//! Name and entity IDs are one-based.

use crate::index::ped::prefix_edit_distance;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

const PAD: char = '$';

/// One dictionary entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    /// Popularity, used to rank equally distant matches
    pub score: i64,
    /// Every tab-separated column of the dictionary line
    pub columns: Vec<String>,
}

/// A fuzzy match for a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QGramMatch {
    pub entity_id: usize,
    pub ped: usize,
    pub score: i64,
    /// The name (or synonym) that produced the best distance
    pub name_id: usize,
}

/// A q-gram index over entity names
#[derive(Debug, Clone)]
pub struct QGramIndex {
    q: usize,
    padding: String,
    inverted_lists: HashMap<String, Vec<(usize, usize)>>,
    entities: Vec<Entity>,
    norm_names: Vec<String>,
    names: Vec<String>,
    name_entity: Vec<usize>,
    use_synonyms: bool,
}

impl QGramIndex {
    /// Creates an empty index
    ///
    /// # Arguments
    ///
    /// * `q` - Q-gram length (values below 1 are treated as 1)
    /// * `use_synonyms` - Also index the `;`-separated synonyms column
    pub fn new(q: usize, use_synonyms: bool) -> Self {
        let q = q.max(1);
        Self {
            q,
            padding: PAD.to_string().repeat(q - 1),
            inverted_lists: HashMap::new(),
            entities: Vec::new(),
            norm_names: Vec::new(),
            names: Vec::new(),
            name_entity: Vec::new(),
            use_synonyms,
        }
    }

    pub fn q(&self) -> usize {
        self.q
    }

    /// Lowercases and keeps only alphanumeric characters
    pub fn normalize(word: &str) -> String {
        word.to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect()
    }

    /// Q-grams of the padded word, one per character of `word`
    pub fn compute_qgrams(&self, word: &str) -> Vec<String> {
        let padded: Vec<char> = self.padding.chars().chain(word.chars()).collect();
        let len = word.chars().count();
        (0..len)
            .map(|i| padded[i..i + self.q].iter().collect())
            .collect()
    }

    /// Builds from a dictionary file
    ///
    /// See [`QGramIndex::build_from_reader`] for the format.
    pub fn build_from_file(&mut self, path: &Path) -> io::Result<()> {
        let file = File::open(path)?;
        self.build_from_reader(BufReader::new(file))
    }

    /// Builds from tab-separated dictionary lines
    ///
    /// The first line is a header and is skipped. Column 1 is the name,
    /// column 2 the integer popularity score and, when synonyms are
    /// enabled, column 6 a `;`-separated synonym list. Blank lines are
    /// ignored; an unparsable score counts as 0.
    pub fn build_from_reader<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines().skip(1) {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            let columns: Vec<String> = line.split('\t').map(str::to_string).collect();
            let score = columns
                .get(1)
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0);

            let synonyms: Vec<String> = if self.use_synonyms {
                columns
                    .get(5)
                    .map(|s| {
                        s.split(';')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            let name = columns.first().cloned().unwrap_or_default();
            self.add_entity(name, score, columns, &synonyms);
        }

        tracing::debug!(
            "Q-gram index built: {} entities, {} names, {} q-grams",
            self.entities.len(),
            self.names.len(),
            self.inverted_lists.len()
        );
        Ok(())
    }

    /// Adds an entity with its name and synonyms; returns its ID
    pub fn add_entity(
        &mut self,
        name: String,
        score: i64,
        columns: Vec<String>,
        synonyms: &[String],
    ) -> usize {
        self.entities.push(Entity {
            name: name.clone(),
            score,
            columns,
        });
        let entity_id = self.entities.len();

        self.add_name(entity_id, &name);
        for synonym in synonyms {
            self.add_name(entity_id, synonym);
        }
        entity_id
    }

    fn add_name(&mut self, entity_id: usize, name: &str) {
        let name_id = self.names.len() + 1;
        let normalized = Self::normalize(name);

        for qgram in self.compute_qgrams(&normalized) {
            let list = self.inverted_lists.entry(qgram).or_default();
            match list.last_mut() {
                Some((id, freq)) if *id == name_id => *freq += 1,
                _ => list.push((name_id, 1)),
            }
        }

        self.names.push(name.to_string());
        self.norm_names.push(normalized);
        self.name_entity.push(entity_id);
    }

    /// Posting list of one q-gram (empty if unknown)
    pub fn posting_list(&self, qgram: &str) -> &[(usize, usize)] {
        self.inverted_lists
            .get(qgram)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Merges sorted posting lists, summing frequencies of equal IDs
    pub fn merge_lists(lists: &[&[(usize, usize)]]) -> Vec<(usize, usize)> {
        let mut heap = BinaryHeap::new();
        for (list_idx, list) in lists.iter().enumerate() {
            if let Some(&(id, _)) = list.first() {
                heap.push(Reverse((id, list_idx, 0usize)));
            }
        }

        let mut merged: Vec<(usize, usize)> = Vec::new();
        while let Some(Reverse((id, list_idx, pos))) = heap.pop() {
            let freq = lists[list_idx][pos].1;
            match merged.last_mut() {
                Some((last_id, last_freq)) if *last_id == id => *last_freq += freq,
                _ => merged.push((id, freq)),
            }

            if let Some(&(next_id, _)) = lists[list_idx].get(pos + 1) {
                heap.push(Reverse((next_id, list_idx, pos + 1)));
            }
        }
        merged
    }

    /// Finds entities with a name within prefix edit distance `delta` of
    /// the (already normalized) `prefix`
    ///
    /// # Returns
    ///
    /// The best match per entity, ordered by entity ID, and the number of
    /// PED computations performed.
    pub fn find_matches(&self, prefix: &str, delta: usize) -> (Vec<QGramMatch>, usize) {
        let qgrams = self.compute_qgrams(prefix);
        let lists: Vec<&[(usize, usize)]> = qgrams
            .iter()
            .filter_map(|g| self.inverted_lists.get(g).map(Vec::as_slice))
            .collect();
        let merged = Self::merge_lists(&lists);

        let threshold = prefix.chars().count() as i64 - (self.q * delta) as i64;
        let mut ped_computations = 0;
        let mut candidates: Vec<(usize, usize, usize)> = Vec::new();

        for (name_id, freq) in merged {
            if (freq as i64) < threshold {
                continue;
            }
            ped_computations += 1;
            let ped = prefix_edit_distance(prefix, &self.norm_names[name_id - 1], delta);
            if ped <= delta {
                candidates.push((self.name_entity[name_id - 1], ped, name_id));
            }
        }

        candidates.sort_by_key(|&(entity_id, ped, _)| (entity_id, ped));
        candidates.dedup_by_key(|&mut (entity_id, _, _)| entity_id);

        let matches = candidates
            .into_iter()
            .map(|(entity_id, ped, name_id)| QGramMatch {
                entity_id,
                ped,
                score: self.entities[entity_id - 1].score,
                name_id,
            })
            .collect();

        (matches, ped_computations)
    }

    /// Orders matches by distance, then by descending popularity
    pub fn rank_matches(mut matches: Vec<QGramMatch>) -> Vec<QGramMatch> {
        matches.sort_by(|a, b| a.ped.cmp(&b.ped).then_with(|| b.score.cmp(&a.score)));
        matches
    }

    pub fn entity(&self, entity_id: usize) -> Option<&Entity> {
        entity_id.checked_sub(1).and_then(|i| self.entities.get(i))
    }

    /// Original (unnormalized) spelling of a name or synonym
    pub fn name(&self, name_id: usize) -> Option<&str> {
        name_id
            .checked_sub(1)
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
