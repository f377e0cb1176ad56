//! Multi-step LLM concept selection.
//!
//! Each configured system prompt is one step. Step one receives the source
//! term and the candidate list; every later step receives the previous
//! step's response. Responses are cached per (source id, step), so replaying
//! a source id makes no provider calls and costs nothing.
//!
//! Terminal states:
//! - `Decided`: the final response parsed to a candidate or to "no match"
//! - `Filtered`: the provider returned empty content, now or on an earlier run
//!
//! A response that cannot be parsed, or that picks a concept outside the
//! candidate set, is an error.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use concept_mapper_core::models::{MappedTerm, MappingCandidate, MappingOutcome};
use concept_mapper_core::{Config, ContextSettings};

use crate::cache::{CacheError, CacheKey, FileResponseCache, ResponseCache, CONTENT_FILTER_SENTINEL};
use crate::cost::CostLedger;
use crate::decision::{parse_decision, DecisionError};
use crate::prompts::{build_initial_prompt, context_rows, reinsert_target_details};
use crate::provider::{LlmProvider, ProviderError};

/// Mapper errors.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Format error: {0}")]
    Format(#[from] DecisionError),

    #[error("At least one system prompt is required")]
    NoSystemPrompts,
}

pub type MapperResult<T> = Result<T, MappingError>;

/// Stable numeric ID for a term without a source ID.
pub fn default_source_id(term: &str) -> u64 {
    let digest = Sha256::digest(term.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % 100_000_000
}

/// One candidate for one source term, as fed to [`LlmMapper::map_terms`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    /// Term sent to the model (usually the cleaned term)
    pub term: String,
    pub source_id: Option<String>,
    /// Original source term
    pub source_term: String,
    pub candidate: MappingCandidate,
}

struct TermGroup {
    source_term: String,
    candidates: Vec<MappingCandidate>,
}

pub struct LlmMapper<P, C = FileResponseCache> {
    provider: P,
    cache: C,
    system_prompts: Vec<String>,
    context: ContextSettings,
}

impl<P: LlmProvider> LlmMapper<P, FileResponseCache> {
    /// Mapper using the configured prompts and a file cache in the responses folder.
    pub fn from_config(provider: P, config: &Config) -> MapperResult<Self> {
        let cache = FileResponseCache::new(config.responses_folder())?;
        Self::new(
            provider,
            cache,
            config.llm_mapping.system_prompts.clone(),
            config.llm_mapping.context,
        )
    }

    pub fn responses_folder(&self) -> PathBuf {
        self.cache.folder().to_path_buf()
    }
}

impl<P: LlmProvider, C: ResponseCache> LlmMapper<P, C> {
    pub fn new(
        provider: P,
        cache: C,
        system_prompts: Vec<String>,
        context: ContextSettings,
    ) -> MapperResult<Self> {
        if system_prompts.is_empty() {
            return Err(MappingError::NoSystemPrompts);
        }
        Ok(Self {
            provider,
            cache,
            system_prompts,
            context,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn steps(&self) -> usize {
        self.system_prompts.len()
    }

    /// Map one source term onto one of `candidates`.
    ///
    /// Provider cost is recorded in `ledger` as soon as each call returns, so
    /// it is kept even when a later step fails.
    pub fn map_term(
        &self,
        source_term: &str,
        source_id: Option<&str>,
        candidates: &[MappingCandidate],
        ledger: &mut CostLedger,
    ) -> MapperResult<MappingOutcome> {
        let source_id = source_id
            .map(str::to_string)
            .unwrap_or_else(|| default_source_id(source_term).to_string());
        self.cache.check_key(&CacheKey::new(source_id.as_str(), 0))?;
        let rows = context_rows(candidates, &self.context);

        // Holds the prompt for the current step, then that step's response.
        let mut text = build_initial_prompt(source_term, &rows);

        for (step, system_prompt) in self.system_prompts.iter().enumerate() {
            let key = CacheKey::new(source_id.as_str(), step);

            if let Some(cached) = self.cache.get(&key)? {
                if cached == CONTENT_FILTER_SENTINEL {
                    log::debug!("Cached content filter for source {} step {}", source_id, step + 1);
                    return Ok(MappingOutcome::Filtered);
                }
                log::debug!("Cache hit for source {} step {}", source_id, step + 1);
                text = cached;
                continue;
            }

            let response = self.provider.complete(&text, Some(system_prompt))?;
            ledger.record(&response.usage);

            if response.content.is_empty() {
                log::warn!("Content filter triggered for '{}' (source {})", source_term, source_id);
                self.cache.put(&key, CONTENT_FILTER_SENTINEL)?;
                return Ok(MappingOutcome::Filtered);
            }

            let mut content = response.content;
            if step == 0 && self.context.re_insert_target_details {
                match reinsert_target_details(&content, &rows) {
                    Some(rewritten) => content = rewritten,
                    None => log::warn!("Could not re-insert target details for source {}", source_id),
                }
            }

            self.cache.put(&key, &content)?;
            text = content;
        }

        let result = parse_decision(&text, candidates)?;
        Ok(MappingOutcome::Decided(result))
    }

    /// Map every term in a candidate table.
    ///
    /// Rows are grouped by (term, source id); the source term of the first
    /// row in each group is reported. With an allow-list, groups whose source
    /// id is missing or not listed are skipped. Filtered groups are skipped.
    /// The first error aborts the batch.
    pub fn map_terms(
        &self,
        rows: &[CandidateRow],
        source_ids: Option<&[String]>,
        ledger: &mut CostLedger,
    ) -> MapperResult<Vec<MappedTerm>> {
        let mut groups: BTreeMap<(String, Option<String>), TermGroup> = BTreeMap::new();
        for row in rows {
            groups
                .entry((row.term.clone(), row.source_id.clone()))
                .or_insert_with(|| TermGroup {
                    source_term: row.source_term.clone(),
                    candidates: Vec::new(),
                })
                .candidates
                .push(row.candidate.clone());
        }

        let mut mapped = Vec::with_capacity(groups.len());
        let mut filtered = 0usize;
        for ((term, source_id), group) in groups {
            if let Some(allowed) = source_ids {
                let listed = source_id
                    .as_ref()
                    .is_some_and(|id| allowed.iter().any(|a| a == id));
                if !listed {
                    continue;
                }
            }

            match self.map_term(&term, source_id.as_deref(), &group.candidates, ledger)? {
                MappingOutcome::Decided(result) => mapped.push(MappedTerm {
                    term,
                    source_id,
                    source_term: group.source_term,
                    mapped_concept_id: result.matched_concept_id,
                    mapped_concept_name: result.matched_concept_name,
                    mapped_rationale: result.rationale,
                }),
                MappingOutcome::Filtered => filtered += 1,
            }
        }

        log::info!(
            "Mapped {} terms ({} skipped by content filter); cost so far {}",
            mapped.len(),
            filtered,
            ledger
        );
        Ok(mapped)
    }
}
