//! Vocabulary concept models.

use serde::{Deserialize, Serialize};

/// A standardized vocabulary entry. Identity is the concept ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Concept {
    /// Concept identifier in the reference vocabulary
    pub concept_id: i64,
    /// Canonical concept name
    pub concept_name: String,
}

impl Concept {
    pub fn new(concept_id: i64, concept_name: impl Into<String>) -> Self {
        Self {
            concept_id,
            concept_name: concept_name.into(),
        }
    }
}

/// One row of a bulk term file: a name or synonym belonging to a concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermRecord {
    pub concept_id: i64,
    /// The term text (canonical name or synonym)
    pub term: String,
    /// Canonical name of the owning concept
    pub concept_name: String,
}

impl TermRecord {
    pub fn new(concept_id: i64, term: impl Into<String>, concept_name: impl Into<String>) -> Self {
        Self {
            concept_id,
            term: term.into(),
            concept_name: concept_name.into(),
        }
    }

    /// The concept this term belongs to.
    pub fn concept(&self) -> Concept {
        Concept::new(self.concept_id, self.concept_name.clone())
    }
}

/// A ranked hit returned by a candidate retriever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub concept_id: i64,
    pub concept_name: String,
    pub domain_id: Option<String>,
    pub concept_class_id: Option<String>,
    pub vocabulary_id: Option<String>,
    /// Relevance score reported by the retriever (higher is better)
    pub score: Option<f64>,
}

/// A candidate concept enriched with optional prompt context.
///
/// Parents, children and synonyms are `;`-separated name lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MappingCandidate {
    pub concept_id: i64,
    pub concept_name: String,
    pub domain_id: Option<String>,
    pub concept_class_id: Option<String>,
    pub vocabulary_id: Option<String>,
    pub parents: Option<String>,
    pub children: Option<String>,
    pub synonyms: Option<String>,
}

impl MappingCandidate {
    /// Create a candidate with only ID and name.
    pub fn new(concept_id: i64, concept_name: impl Into<String>) -> Self {
        Self {
            concept_id,
            concept_name: concept_name.into(),
            ..Default::default()
        }
    }

    pub fn concept(&self) -> Concept {
        Concept::new(self.concept_id, self.concept_name.clone())
    }
}

impl From<SearchHit> for MappingCandidate {
    fn from(hit: SearchHit) -> Self {
        Self {
            concept_id: hit.concept_id,
            concept_name: hit.concept_name,
            domain_id: hit.domain_id,
            concept_class_id: hit.concept_class_id,
            vocabulary_id: hit.vocabulary_id,
            parents: None,
            children: None,
            synonyms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_ordering_by_id() {
        let mut concepts = vec![Concept::new(3, "c"), Concept::new(1, "a"), Concept::new(2, "b")];
        concepts.sort();
        let ids: Vec<i64> = concepts.iter().map(|c| c.concept_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_candidate_from_hit() {
        let hit = SearchHit {
            concept_id: 4329847,
            concept_name: "Myocardial infarction".into(),
            domain_id: Some("Condition".into()),
            concept_class_id: Some("Clinical Finding".into()),
            vocabulary_id: Some("SNOMED".into()),
            score: Some(0.93),
        };

        let candidate: MappingCandidate = hit.into();
        assert_eq!(candidate.concept_id, 4329847);
        assert_eq!(candidate.domain_id.as_deref(), Some("Condition"));
        assert!(candidate.parents.is_none());
    }
}
