//! LLM-based removal of non-essential modifiers from source terms.
//!
//! Only terms containing a trigger word ("unspecified", "without", "NOS",
//! ...) are sent to the model. The model answers with a `#Term: <cleaned>`
//! line.

use std::sync::LazyLock;

use regex::Regex;

use concept_mapper_core::Config;

use crate::cost::CostLedger;
use crate::provider::{LlmProvider, ProviderResult};

static TRIGGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not|unspecified|unidentified|without|other| nos|,nos| nec|,nec|encounter").unwrap()
});
static ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#Term: (.+)\z").unwrap());

pub struct TermCleaner<P> {
    provider: P,
    system_prompt: String,
}

impl<P: LlmProvider> TermCleaner<P> {
    pub fn new(provider: P, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn from_config(provider: P, config: &Config) -> Self {
        Self::new(provider, config.term_cleanup.system_prompt.clone())
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether a term would be sent to the model.
    pub fn needs_cleaning(term: &str) -> bool {
        TRIGGER_RE.is_match(term)
    }

    /// Cleaned term, or the input unchanged when no trigger word is present
    /// or the answer is missing.
    pub fn clean_term(&self, term: &str, ledger: &mut CostLedger) -> ProviderResult<String> {
        if !Self::needs_cleaning(term) {
            return Ok(term.to_string());
        }

        let prompt = format!("#Term: {}", term);
        let response = self.provider.complete(&prompt, Some(&self.system_prompt))?;
        ledger.record(&response.usage);

        match ANSWER_RE.captures(response.content.trim()).and_then(|caps| caps.get(1)) {
            Some(answer) => Ok(answer.as_str().to_string()),
            None => {
                log::warn!("Term '{}' not found in response '{}'", term, response.content);
                Ok(term.to_string())
            }
        }
    }

    pub fn clean_terms<S: AsRef<str>>(&self, terms: &[S], ledger: &mut CostLedger) -> ProviderResult<Vec<String>> {
        terms
            .iter()
            .map(|term| self.clean_term(term.as_ref(), ledger))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[test]
    fn test_trigger_words() {
        assert!(TermCleaner::<MockProvider>::needs_cleaning("Acute myocardial infarction, unspecified"));
        assert!(TermCleaner::<MockProvider>::needs_cleaning("Diabetes mellitus type 2, NOS"));
        assert!(TermCleaner::<MockProvider>::needs_cleaning("CKD without hypertension"));
        assert!(!TermCleaner::<MockProvider>::needs_cleaning("Asthma"));
    }

    #[test]
    fn test_untriggered_term_skips_provider() {
        let cleaner = TermCleaner::new(MockProvider::new(), "clean");
        let mut ledger = CostLedger::new();

        assert_eq!(cleaner.clean_term("Gout", &mut ledger).unwrap(), "Gout");
        assert_eq!(cleaner.provider().call_count(), 0);
        assert_eq!(ledger.calls(), 0);
    }

    #[test]
    fn test_answer_extracted() {
        let provider = MockProvider::new().with_response("Reasoning first.\n#Term: Acute myocardial infarction\n", 0.001);
        let cleaner = TermCleaner::new(provider, "clean");
        let mut ledger = CostLedger::new();

        let cleaned = cleaner
            .clean_term("Acute myocardial infarction, unspecified", &mut ledger)
            .unwrap();
        assert_eq!(cleaned, "Acute myocardial infarction");
        assert_eq!(
            cleaner.provider().calls()[0].prompt,
            "#Term: Acute myocardial infarction, unspecified"
        );
        assert_eq!(ledger.total_cost(), 0.001);
    }

    #[test]
    fn test_missing_answer_falls_back() {
        let provider = MockProvider::new().with_response("I cannot help with that.", 0.001);
        let cleaner = TermCleaner::new(provider, "clean");
        let mut ledger = CostLedger::new();

        let cleaned = cleaner.clean_term("Other anemia", &mut ledger).unwrap();
        assert_eq!(cleaned, "Other anemia");
        assert_eq!(ledger.calls(), 1);
    }
}
