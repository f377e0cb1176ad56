//! Mapping decision models.

use serde::{Deserialize, Serialize};

/// Concept ID reported when no candidate matches.
pub const NO_MATCH_CONCEPT_ID: i64 = -1;

/// Concept name reported when no candidate matches.
pub const NO_MATCH_CONCEPT_NAME: &str = "no_match";

/// A decision for one source term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingResult {
    /// Selected concept, or -1 for no match
    pub matched_concept_id: i64,
    /// Selected concept name, or "no_match"
    pub matched_concept_name: String,
    /// Free-text justification extracted from the model output
    pub rationale: String,
}

impl MappingResult {
    pub fn matched(concept_id: i64, concept_name: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            matched_concept_id: concept_id,
            matched_concept_name: concept_name.into(),
            rationale: rationale.into(),
        }
    }

    pub fn no_match(rationale: impl Into<String>) -> Self {
        Self {
            matched_concept_id: NO_MATCH_CONCEPT_ID,
            matched_concept_name: NO_MATCH_CONCEPT_NAME.to_string(),
            rationale: rationale.into(),
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.matched_concept_id == NO_MATCH_CONCEPT_ID
    }
}

/// Terminal state of a mapping call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MappingOutcome {
    /// A decision was reached (possibly "no match")
    Decided(MappingResult),
    /// The provider's content filter fired; callers skip the term
    Filtered,
}

impl MappingOutcome {
    /// The decision, or `None` for a filtered call.
    pub fn result(&self) -> Option<&MappingResult> {
        match self {
            MappingOutcome::Decided(result) => Some(result),
            MappingOutcome::Filtered => None,
        }
    }

    pub fn into_result(self) -> Option<MappingResult> {
        match self {
            MappingOutcome::Decided(result) => Some(result),
            MappingOutcome::Filtered => None,
        }
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self, MappingOutcome::Filtered)
    }
}

/// One row of a batch mapping result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappedTerm {
    /// Term as fed to the mapper (usually the cleaned term)
    pub term: String,
    pub source_id: Option<String>,
    /// Original source term before cleanup
    pub source_term: String,
    pub mapped_concept_id: i64,
    pub mapped_concept_name: String,
    pub mapped_rationale: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_result() {
        let result = MappingResult::no_match("too vague");
        assert!(result.is_no_match());
        assert_eq!(result.matched_concept_id, -1);
        assert_eq!(result.matched_concept_name, "no_match");
        assert_eq!(result.rationale, "too vague");
    }

    #[test]
    fn test_outcome_accessors() {
        let decided = MappingOutcome::Decided(MappingResult::matched(2, "Myocardial infarction", "exact"));
        assert!(!decided.is_filtered());
        assert_eq!(decided.result().map(|r| r.matched_concept_id), Some(2));

        let filtered = MappingOutcome::Filtered;
        assert!(filtered.is_filtered());
        assert!(filtered.into_result().is_none());
    }
}
