//! Concept Mapper Core Library
//!
//! Maps free-text clinical terms onto standard vocabulary concepts.
//!
//! # Architecture
//!
//! ```text
//! Vocabulary DB ──► Term batch files ──► Verbatim index (snapshot)
//!                    (Parquet)                 │
//!                                              ▼
//! Source term ──► Normalizer ──► Verbatim lookup ──hit──► Concept(s)
//!                                     │
//!                                    miss
//!                                     ▼
//!                          Candidate retriever ──► LLM mapper (concept-mapper-llm)
//!                       (FTS, Hecate, vectors)          │
//!                                                       ▼
//!                                          concept + rationale | no match | filtered
//! ```
//!
//! # Modules
//!
//! - [`models`]: Domain types (Concept, TermRecord, MappingCandidate, MappingResult)
//! - [`verbatim`]: Term normalizer, normalized-term index and its snapshot
//! - [`terms`]: Parquet term batch files and chunked downloads
//! - [`db`]: SQLite vocabulary store with FTS5 search
//! - [`search`]: Candidate retriever interface and the Hecate adapter
//! - [`config`]: YAML configuration
//! - [`logging`]: Logger setup

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod search;
pub mod terms;
pub mod verbatim;

// Re-export commonly used types
pub use config::{Config, ContextSettings};
pub use db::Database;
pub use models::{
    Concept, MappedTerm, MappingCandidate, MappingOutcome, MappingResult, SearchHit, TermRecord,
    NO_MATCH_CONCEPT_ID, NO_MATCH_CONCEPT_NAME,
};
pub use search::{CandidateRetriever, ConceptContext};
pub use verbatim::{TermNormalizer, VerbatimIndex, VerbatimMapper};
