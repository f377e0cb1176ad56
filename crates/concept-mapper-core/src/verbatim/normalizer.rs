//! Clinical term normalizer.
//!
//! Produces the comparison key used by the verbatim index:
//! - Lowercasing and possessive stripping ("Prinzmetal's" → "prinzmetal")
//! - Removal of SNOMED semantic tags such as "(disorder)"
//! - Punctuation to whitespace
//! - Token lemmatization ("Disorders" → "disorder")

use std::sync::LazyLock;

use regex::Regex;

use super::lemmatizer::Lemmatizer;

static POSSESSIVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w)'s\b").unwrap());

static PUNCTUATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Bracketed qualifiers that carry no matching signal.
const QUALIFIERS: [&str; 4] = ["(disorder)", "(event)", "(finding)", "(procedure)"];

/// Normalizer for clinical terms. Stateless apart from its lookup tables.
pub struct TermNormalizer {
    lemmatizer: Lemmatizer,
}

impl Default for TermNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TermNormalizer {
    /// Create a normalizer with the default lemmatizer.
    pub fn new() -> Self {
        Self::with_lemmatizer(Lemmatizer::new())
    }

    pub fn with_lemmatizer(lemmatizer: Lemmatizer) -> Self {
        Self { lemmatizer }
    }

    /// Normalize a raw term into its comparison key.
    pub fn normalize(&self, term: &str) -> String {
        let lower = term.to_lowercase();
        let mut text = POSSESSIVE_RE.replace_all(&lower, "${1}").into_owned();
        for qualifier in QUALIFIERS {
            text = text.replace(qualifier, " ");
        }
        let text = PUNCTUATION_RE.replace_all(&text, " ");

        text.split_whitespace()
            .map(|token| self.lemmatizer.lemmatize(token))
            .filter(|lemma| !lemma.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_punctuation() {
        let normalizer = TermNormalizer::new();
        assert_eq!(normalizer.normalize("Liver-Disorders"), "liver disorder");
        assert_eq!(normalizer.normalize("Liver disorder"), "liver disorder");
    }

    #[test]
    fn test_possessive() {
        let normalizer = TermNormalizer::new();
        assert_eq!(
            normalizer.normalize("Prinzmetal's angina"),
            normalizer.normalize("Prinzmetal angina")
        );
        assert_eq!(normalizer.normalize("Prinzmetal's angina"), "prinzmetal angina");
    }

    #[test]
    fn test_semantic_tag_removed() {
        let normalizer = TermNormalizer::new();
        assert_eq!(normalizer.normalize("Severe depression (disorder)"), "severe depression");
        assert_eq!(normalizer.normalize("Appendectomy (procedure)"), "appendectomy");
    }

    #[test]
    fn test_whitespace_collapsed() {
        let normalizer = TermNormalizer::new();
        assert_eq!(normalizer.normalize("  Type 2   diabetes,\tmellitus "), "type 2 diabetes mellitus");
        assert_eq!(normalizer.normalize(""), "");
        assert_eq!(normalizer.normalize("--/--"), "");
    }

    #[test]
    fn test_idempotent_on_samples() {
        let normalizer = TermNormalizer::new();
        for term in [
            "Acute myocardial infarction, unspecified",
            "Fractures of ribs (disorder)",
            "Crohn's disease",
            "Diagnoses of metastases",
            "Patient was treated with antibiotics",
        ] {
            let once = normalizer.normalize(term);
            assert_eq!(normalizer.normalize(&once), once);
        }
    }
}
