//! Embedding-similarity candidate retrieval over an in-memory vector table.

use std::sync::Mutex;

use concept_mapper_core::models::SearchHit;
use concept_mapper_core::search::CandidateRetriever;

use crate::cost::CostLedger;
use crate::provider::{EmbeddingProvider, ProviderError, ProviderResult, TokenUsage};

/// Texts per embedding request when indexing concepts.
const EMBED_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct ConceptVector {
    hit: SearchHit,
    vector: Vec<f32>,
}

pub struct VectorSearcher<E> {
    provider: E,
    concepts: Vec<ConceptVector>,
    ledger: Mutex<CostLedger>,
}

impl<E: EmbeddingProvider> VectorSearcher<E> {
    pub fn new(provider: E) -> Self {
        Self {
            provider,
            concepts: Vec::new(),
            ledger: Mutex::new(CostLedger::new()),
        }
    }

    /// Embed concept names and add them to the table.
    pub fn add_concepts(&mut self, hits: Vec<SearchHit>) -> ProviderResult<()> {
        for chunk in hits.chunks(EMBED_BATCH_SIZE) {
            let names: Vec<String> = chunk.iter().map(|h| h.concept_name.clone()).collect();
            let response = self.provider.embed(&names)?;
            if response.vectors.len() != chunk.len() {
                return Err(ProviderError::InvalidFormat(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    response.vectors.len()
                )));
            }
            self.record(&response.usage);
            self.concepts.extend(
                chunk
                    .iter()
                    .cloned()
                    .zip(response.vectors)
                    .map(|(hit, vector)| ConceptVector { hit, vector }),
            );
        }
        log::info!("Vector table holds {} concepts", self.concepts.len());
        Ok(())
    }

    /// Add a concept with a precomputed vector.
    pub fn insert(&mut self, hit: SearchHit, vector: Vec<f32>) {
        self.concepts.push(ConceptVector { hit, vector });
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Embedding cost so far.
    pub fn ledger(&self) -> CostLedger {
        self.ledger.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn record(&self, usage: &TokenUsage) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.record(usage);
        }
    }

    fn rank(&self, query: &[f32], limit: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f64, &ConceptVector)> = self
            .concepts
            .iter()
            .map(|c| (cosine_similarity(query, &c.vector), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(limit)
            .map(|(score, c)| SearchHit {
                score: Some(score),
                ..c.hit.clone()
            })
            .collect()
    }
}

impl<E: EmbeddingProvider> CandidateRetriever for VectorSearcher<E> {
    fn search(&self, term: &str, limit: usize) -> Option<Vec<SearchHit>> {
        let response = match self.provider.embed(&[term.to_string()]) {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Embedding failed for '{}': {}", term, e);
                return None;
            }
        };
        self.record(&response.usage);

        let query = response.vectors.into_iter().next()?;
        let hits = self.rank(&query, limit);
        if hits.is_empty() {
            None
        } else {
            Some(hits)
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    (dot_product / (magnitude_a * magnitude_b)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EmbeddingResponse, MockProvider};

    fn hit(concept_id: i64, name: &str) -> SearchHit {
        SearchHit {
            concept_id,
            concept_name: name.to_string(),
            domain_id: Some("Condition".into()),
            concept_class_id: None,
            vocabulary_id: Some("SNOMED".into()),
            score: None,
        }
    }

    struct FailingEmbedder;

    impl EmbeddingProvider for FailingEmbedder {
        fn embed(&self, _texts: &[String]) -> ProviderResult<EmbeddingResponse> {
            Err(ProviderError::InvalidFormat("offline".into()))
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_exact_name_ranks_first() {
        let mut searcher = VectorSearcher::new(MockProvider::new());
        searcher
            .add_concepts(vec![hit(1, "Gout"), hit(2, "Asthma"), hit(3, "Myocardial infarction")])
            .unwrap();
        assert_eq!(searcher.len(), 3);

        let hits = searcher.search("asthma", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].concept_id, 2);
        assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-6);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(searcher.ledger().calls(), 2);
    }

    #[test]
    fn test_precomputed_vectors() {
        let mut searcher = VectorSearcher::new(FailingEmbedder);
        searcher.insert(hit(1, "Gout"), vec![1.0, 0.0]);
        assert!(!searcher.is_empty());
        assert_eq!(searcher.rank(&[1.0, 0.0], 5)[0].concept_id, 1);
    }

    #[test]
    fn test_provider_failure_is_none() {
        let mut searcher = VectorSearcher::new(FailingEmbedder);
        searcher.insert(hit(1, "Gout"), vec![1.0, 0.0]);
        assert!(searcher.search("gout", 5).is_none());
    }

    #[test]
    fn test_empty_table_is_none() {
        let searcher = VectorSearcher::new(MockProvider::new());
        assert!(searcher.search("gout", 5).is_none());
        assert_eq!(searcher.ledger().calls(), 1);
    }
}
