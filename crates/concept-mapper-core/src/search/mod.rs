//! Candidate retrieval.
//!
//! A [`CandidateRetriever`] proposes ranked concepts for a source term. Failures
//! are logged inside the retriever and reported as `None`, so one failed
//! search never aborts a batch.

mod hecate;

pub use hecate::{HecateSearcher, DEFAULT_HECATE_URL};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbError;
use crate::models::{MappingCandidate, SearchHit};

/// Search errors. Retrievers log these and return `None`.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

pub type SearchResult<T> = Result<T, SearchError>;

pub trait CandidateRetriever {
    /// Up to `limit` ranked hits, or `None` when nothing was found or the search failed.
    fn search(&self, term: &str, limit: usize) -> Option<Vec<SearchHit>>;
}

impl<R: CandidateRetriever + ?Sized> CandidateRetriever for &R {
    fn search(&self, term: &str, limit: usize) -> Option<Vec<SearchHit>> {
        (**self).search(term, limit)
    }
}

impl<R: CandidateRetriever + ?Sized> CandidateRetriever for Box<R> {
    fn search(&self, term: &str, limit: usize) -> Option<Vec<SearchHit>> {
        (**self).search(term, limit)
    }
}

/// Adds prompt context (parents, children, synonyms) to search hits.
pub trait ConceptContext {
    fn enrich(&self, hits: Vec<SearchHit>) -> SearchResult<Vec<MappingCandidate>>;
}

/// Candidates found for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermCandidates {
    pub term: String,
    pub hits: Vec<SearchHit>,
}

/// Search every term, keeping only terms with at least one hit.
pub fn search_terms<R, S>(retriever: &R, terms: &[S], limit: usize) -> Vec<TermCandidates>
where
    R: CandidateRetriever + ?Sized,
    S: AsRef<str>,
{
    let mut results = Vec::new();
    for term in terms {
        let term = term.as_ref();
        match retriever.search(term, limit) {
            Some(hits) if !hits.is_empty() => results.push(TermCandidates {
                term: term.to_string(),
                hits,
            }),
            _ => log::debug!("No candidates for '{}'", term),
        }
    }
    log::info!("Found candidates for {} of {} terms", results.len(), terms.len());
    results
}
