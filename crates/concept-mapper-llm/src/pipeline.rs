//! Three-tier mapping: verbatim lookup, then candidate retrieval, then LLM
//! selection among the candidates. A candidate whose name or synonym
//! normalizes like the term is taken without a model call.

use serde::{Deserialize, Serialize};

use concept_mapper_core::models::{Concept, MappingCandidate, MappingOutcome};
use concept_mapper_core::search::{CandidateRetriever, ConceptContext};
use concept_mapper_core::verbatim::VerbatimMapper;

use crate::cache::{FileResponseCache, ResponseCache};
use crate::cost::CostLedger;
use crate::mapper::{LlmMapper, MapperResult};
use crate::provider::LlmProvider;

pub const DEFAULT_CANDIDATE_LIMIT: usize = 25;

/// How a term was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineOutcome {
    /// Exact normalized match; no model call was made
    Verbatim(Vec<Concept>),
    /// The retriever found nothing to choose from
    NoCandidates,
    /// A retrieved candidate's name or synonym matched after normalization
    CandidateMatch(Concept),
    /// The model chose among retrieved candidates
    Llm(MappingOutcome),
}

pub struct MappingPipeline<R, P, C = FileResponseCache> {
    verbatim: VerbatimMapper,
    retriever: R,
    context: Option<Box<dyn ConceptContext>>,
    mapper: LlmMapper<P, C>,
    candidate_limit: usize,
}

impl<R, P, C> MappingPipeline<R, P, C>
where
    R: CandidateRetriever,
    P: LlmProvider,
    C: ResponseCache,
{
    pub fn new(verbatim: VerbatimMapper, retriever: R, mapper: LlmMapper<P, C>) -> Self {
        Self {
            verbatim,
            retriever,
            context: None,
            mapper,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    /// Enrich candidates with parents, children and synonyms before prompting.
    pub fn with_context(mut self, context: Box<dyn ConceptContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn mapper(&self) -> &LlmMapper<P, C> {
        &self.mapper
    }

    pub fn map_term(
        &self,
        term: &str,
        source_id: Option<&str>,
        ledger: &mut CostLedger,
    ) -> MapperResult<PipelineOutcome> {
        let concepts = self.verbatim.lookup(term);
        if !concepts.is_empty() {
            log::debug!("Verbatim match for '{}'", term);
            return Ok(PipelineOutcome::Verbatim(concepts));
        }

        let hits = match self.retriever.search(term, self.candidate_limit) {
            Some(hits) if !hits.is_empty() => hits,
            _ => return Ok(PipelineOutcome::NoCandidates),
        };

        let candidates: Vec<MappingCandidate> = match &self.context {
            Some(context) => match context.enrich(hits.clone()) {
                Ok(candidates) => candidates,
                Err(e) => {
                    log::warn!("Could not enrich candidates for '{}': {}", term, e);
                    hits.into_iter().map(MappingCandidate::from).collect()
                }
            },
            None => hits.into_iter().map(MappingCandidate::from).collect(),
        };

        if let Some(concept) = self.verbatim.match_candidates(term, &candidates) {
            log::debug!("Candidate {} matches '{}' verbatim", concept.concept_id, term);
            return Ok(PipelineOutcome::CandidateMatch(concept));
        }

        let outcome = self.mapper.map_term(term, source_id, &candidates, ledger)?;
        Ok(PipelineOutcome::Llm(outcome))
    }
}
