//! Normalized-term index.
//!
//! Maps a normalized term to the concepts whose names or synonyms normalize to
//! it. Buckets are always sequences, kept sorted by concept ID with no
//! duplicate IDs, so the built index does not depend on insertion order.

use std::collections::HashMap;

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::normalizer::TermNormalizer;
use crate::models::{Concept, TermRecord};

/// Concepts sharing one normalized key. Most keys hold a single concept.
pub type Bucket = SmallVec<[Concept; 1]>;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} terms ({per_sec}) {msg}";

/// Read-only lookup table from normalized term to concepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerbatimIndex {
    entries: HashMap<String, Bucket>,
}

impl VerbatimIndex {
    /// Concepts stored under an already-normalized key (empty when absent).
    pub fn get(&self, normalized_term: &str) -> &[Concept] {
        self.entries
            .get(normalized_term)
            .map(|bucket| bucket.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains_key(&self, normalized_term: &str) -> bool {
        self.entries.contains_key(normalized_term)
    }

    /// Number of distinct normalized keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of (key, concept) entries.
    pub fn concept_count(&self) -> usize {
        self.entries.values().map(|bucket| bucket.len()).sum()
    }

    /// Largest bucket size.
    pub fn max_bucket_len(&self) -> usize {
        self.entries.values().map(|bucket| bucket.len()).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bucket)> {
        self.entries.iter()
    }

    /// Entries sorted by key, for stable hashing and comparisons.
    pub fn sorted_entries(&self) -> Vec<(&String, &Bucket)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Accumulates (key, concept) pairs into a [`VerbatimIndex`].
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: HashMap<String, Bucket>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a concept under a normalized key.
    ///
    /// A concept ID already in the bucket is not added twice. When the same ID
    /// arrives with different names the lexicographically smallest name is
    /// kept. Empty keys are ignored.
    pub fn insert(&mut self, key: String, concept: Concept) {
        if key.is_empty() {
            return;
        }
        let bucket = self.entries.entry(key).or_default();
        match bucket.binary_search_by_key(&concept.concept_id, |c| c.concept_id) {
            Ok(pos) => {
                if concept.concept_name < bucket[pos].concept_name {
                    bucket[pos] = concept;
                }
            }
            Err(pos) => bucket.insert(pos, concept),
        }
    }

    /// Fold another builder into this one.
    pub fn merge(&mut self, other: IndexBuilder) {
        for (key, bucket) in other.entries {
            for concept in bucket {
                self.insert(key.clone(), concept);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> VerbatimIndex {
        VerbatimIndex {
            entries: self.entries,
        }
    }
}

impl Extend<(String, Concept)> for IndexBuilder {
    fn extend<T: IntoIterator<Item = (String, Concept)>>(&mut self, iter: T) {
        for (key, concept) in iter {
            self.insert(key, concept);
        }
    }
}

impl FromIterator<(String, Concept)> for IndexBuilder {
    fn from_iter<T: IntoIterator<Item = (String, Concept)>>(iter: T) -> Self {
        let mut builder = IndexBuilder::new();
        builder.extend(iter);
        builder
    }
}

/// Normalize term records on a worker pool and merge them into a builder.
///
/// Normalization runs in parallel; the merge is single-threaded.
pub fn normalize_records(
    records: &[TermRecord],
    normalizer: &TermNormalizer,
    pool: &ThreadPool,
    progress: Option<&ProgressBar>,
) -> IndexBuilder {
    let pairs: Vec<(String, Concept)> = pool.install(|| {
        let iter = records
            .par_iter()
            .map(|record| (normalizer.normalize(&record.term), record.concept()));
        match progress {
            Some(pb) => iter.progress_with(pb.clone()).collect(),
            None => iter.collect(),
        }
    });
    pairs.into_iter().collect()
}

/// Progress bar for index construction.
pub fn create_progress_bar(length: u64, description: &str) -> ProgressBar {
    let pb = ProgressBar::new(length);
    if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(description.to_string());
    pb
}
