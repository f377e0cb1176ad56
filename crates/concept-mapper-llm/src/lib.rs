//! LLM-based concept selection.
//!
//! Given a source term and candidate concepts, a chat model picks the
//! matching candidate or declares "no match". Responses are cached per
//! (source id, step) and cost is tracked in a [`CostLedger`].
//!
//! # Modules
//!
//! - [`provider`]: Provider traits, token usage and pricing, mock provider
//! - [`openai`]: OpenAI-compatible HTTP client
//! - [`cache`]: Write-once response caches (files, memory, SQLite)
//! - [`prompts`]: Candidate context and prompt construction
//! - [`decision`]: Response grammars
//! - [`mapper`]: The multi-step mapper
//! - [`cleaner`]: Term cleanup before mapping
//! - [`vector`]: Embedding-similarity candidate retrieval
//! - [`pipeline`]: Verbatim, retrieval and LLM tiers combined

pub mod cache;
pub mod cleaner;
pub mod cost;
pub mod decision;
pub mod mapper;
pub mod openai;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod vector;

pub use cache::{
    CacheKey, FileResponseCache, MemoryResponseCache, ResponseCache, SqliteResponseCache,
    CONTENT_FILTER_SENTINEL,
};
pub use cleaner::TermCleaner;
pub use cost::CostLedger;
pub use decision::{parse_decision, DecisionError};
pub use mapper::{default_source_id, CandidateRow, LlmMapper, MapperResult, MappingError};
pub use openai::{OpenAiClient, ProviderSettings, Task};
pub use pipeline::{MappingPipeline, PipelineOutcome};
pub use provider::{
    EmbeddingProvider, LlmProvider, LlmResponse, MockProvider, ProviderError, ProviderKind, TokenUsage,
};
pub use vector::VectorSearcher;
