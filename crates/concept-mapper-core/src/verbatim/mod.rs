//! Verbatim mapping: exact lookup of normalized terms.
//!
//! The index is built once from term batch files on a worker pool, saved as a
//! binary snapshot, and loaded from that snapshot on every later start.

mod index;
mod lemmatizer;
mod normalizer;
mod snapshot;

pub use index::*;
pub use lemmatizer::Lemmatizer;
pub use normalizer::TermNormalizer;
pub use snapshot::*;

use std::path::PathBuf;

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{effective_cores, Config};
use crate::models::{Concept, MappingCandidate, TermRecord};
use crate::terms::{list_term_files, read_term_file, TermsError};

/// Index build and snapshot errors.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Term file error: {0}")]
    Terms(#[from] TermsError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Snapshot version mismatch: expected {expected}, got {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("No index snapshot at {} and no term files in {}", .snapshot.display(), .terms_folder.display())]
    MissingInput {
        snapshot: PathBuf,
        terms_folder: PathBuf,
    },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Where the index lives and how to build it.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub snapshot_file: PathBuf,
    pub terms_folder: PathBuf,
    /// Worker threads; 0 means one per CPU
    pub max_cores: usize,
    pub show_progress: bool,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            snapshot_file: config.index_file(),
            terms_folder: config.terms_folder(),
            max_cores: config.system.max_cores,
            show_progress: config.system.show_progress,
        }
    }
}

/// One row of a verbatim batch mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerbatimMatch {
    pub term: String,
    /// First matching concept, or -1
    pub concept_id: i64,
    /// Name of the first matching concept, or empty
    pub concept_name: String,
}

/// Verbatim mapper owning a built or loaded index.
pub struct VerbatimMapper {
    normalizer: TermNormalizer,
    index: VerbatimIndex,
}

impl VerbatimMapper {
    /// Wrap an existing index.
    pub fn new(index: VerbatimIndex) -> Self {
        Self {
            normalizer: TermNormalizer::new(),
            index,
        }
    }

    /// Load the snapshot if present; otherwise build from term files and save.
    pub fn load_or_build(settings: &IndexSettings) -> IndexResult<Self> {
        if settings.snapshot_file.is_file() {
            log::info!("Loading verbatim index from {}", settings.snapshot_file.display());
            let snapshot = IndexSnapshot::load(&settings.snapshot_file)?;
            log::info!(
                "Loaded {} normalized terms (hash {})",
                snapshot.index.len(),
                snapshot.short_hash()
            );
            return Ok(Self::new(snapshot.into_index()));
        }

        let files = if settings.terms_folder.is_dir() {
            list_term_files(&settings.terms_folder)?
        } else {
            Vec::new()
        };
        if files.is_empty() {
            return Err(IndexError::MissingInput {
                snapshot: settings.snapshot_file.clone(),
                terms_folder: settings.terms_folder.clone(),
            });
        }

        let pool = build_pool(settings.max_cores)?;
        let normalizer = TermNormalizer::new();
        let mut builder = IndexBuilder::new();
        for (i, file) in files.iter().enumerate() {
            let records = read_term_file(file)?;
            log::info!(
                "Normalizing file {}/{} ({} terms): {}",
                i + 1,
                files.len(),
                records.len(),
                file.display()
            );
            let progress = settings
                .show_progress
                .then(|| create_progress_bar(records.len() as u64, "normalizing"));
            builder.merge(normalize_records(&records, &normalizer, &pool, progress.as_ref()));
            if let Some(pb) = progress {
                pb.finish_and_clear();
            }
        }

        let snapshot = IndexSnapshot::new(builder.build());
        snapshot.save(&settings.snapshot_file)?;
        log::info!(
            "Saved verbatim index to {}\n{}",
            settings.snapshot_file.display(),
            snapshot.stats()
        );

        Ok(Self {
            normalizer,
            index: snapshot.into_index(),
        })
    }

    /// Build from in-memory records without touching disk.
    pub fn build(records: &[TermRecord], max_cores: usize) -> IndexResult<Self> {
        let pool = build_pool(max_cores)?;
        let normalizer = TermNormalizer::new();
        let index = normalize_records(records, &normalizer, &pool, None).build();
        Ok(Self { normalizer, index })
    }

    pub fn normalizer(&self) -> &TermNormalizer {
        &self.normalizer
    }

    pub fn index(&self) -> &VerbatimIndex {
        &self.index
    }

    /// Concepts whose terms normalize like `term`. Empty means no match.
    pub fn lookup(&self, term: &str) -> Vec<Concept> {
        let key = self.normalizer.normalize(term);
        self.index.get(&key).to_vec()
    }

    /// First candidate whose name, or one of whose `;`-separated synonyms,
    /// normalizes like `source_term`. The candidate's name is returned in both
    /// cases.
    pub fn match_candidates(&self, source_term: &str, candidates: &[MappingCandidate]) -> Option<Concept> {
        let source = self.normalizer.normalize(source_term);
        if source.is_empty() {
            return None;
        }

        candidates
            .iter()
            .find(|candidate| {
                self.normalizer.normalize(&candidate.concept_name) == source
                    || candidate.synonyms.as_deref().is_some_and(|synonyms| {
                        synonyms
                            .split(';')
                            .any(|synonym| self.normalizer.normalize(synonym) == source)
                    })
            })
            .map(MappingCandidate::concept)
    }

    /// Map each term to its first verbatim match.
    pub fn map_terms<S: AsRef<str>>(&self, terms: &[S]) -> Vec<VerbatimMatch> {
        let results: Vec<VerbatimMatch> = terms
            .iter()
            .map(|term| {
                let term = term.as_ref();
                let (concept_id, concept_name) = match self.lookup(term).into_iter().next() {
                    Some(concept) => (concept.concept_id, concept.concept_name),
                    None => (-1, String::new()),
                };
                VerbatimMatch {
                    term: term.to_string(),
                    concept_id,
                    concept_name,
                }
            })
            .collect();

        let matched = results.iter().filter(|m| m.concept_id != -1).count();
        log::info!("Verbatim mapped {} of {} terms", matched, results.len());
        results
    }
}

/// Worker pool for index construction.
pub fn build_pool(max_cores: usize) -> IndexResult<ThreadPool> {
    let threads = effective_cores(max_cores);
    log::debug!("Using {} worker threads", threads);
    Ok(rayon::ThreadPoolBuilder::new().num_threads(threads).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::{batch_file_name, write_term_file};

    fn records() -> Vec<TermRecord> {
        vec![
            TermRecord::new(2, "Myocardial infarction", "Myocardial infarction"),
            TermRecord::new(2, "Infarction of myocardium", "Myocardial infarction"),
            TermRecord::new(3, "Liver disorder", "Disorder of liver"),
            TermRecord::new(4, "Liver disorders", "Hepatopathy"),
        ]
    }

    #[test]
    fn test_lookup_normalizes_query() {
        let mapper = VerbatimMapper::build(&records(), 2).unwrap();

        let hits = mapper.lookup("MYOCARDIAL-INFARCTIONS");
        assert_eq!(hits, vec![Concept::new(2, "Myocardial infarction")]);

        let ids: Vec<i64> = mapper.lookup("Liver-Disorders").iter().map(|c| c.concept_id).collect();
        assert_eq!(ids, vec![3, 4]);

        assert!(mapper.lookup("asthma").is_empty());
    }

    #[test]
    fn test_map_terms_first_or_sentinel() {
        let mapper = VerbatimMapper::build(&records(), 1).unwrap();
        let results = mapper.map_terms(&["liver disorder", "gout"]);

        assert_eq!(results[0].concept_id, 3);
        assert_eq!(results[0].concept_name, "Disorder of liver");
        assert_eq!(results[1].concept_id, -1);
        assert_eq!(results[1].concept_name, "");
    }

    fn heart_candidates() -> Vec<MappingCandidate> {
        vec![
            MappingCandidate {
                synonyms: Some("Hepatic disorder; Liver diseases".into()),
                ..MappingCandidate::new(1001, "Liver disorder")
            },
            MappingCandidate {
                synonyms: Some("Renal disorder; Kidney diseases".into()),
                ..MappingCandidate::new(1002, "Kidney disorder")
            },
            MappingCandidate {
                synonyms: Some("Cardiac disease; Heart conditions (disorder)".into()),
                ..MappingCandidate::new(1003, "Heart disease")
            },
        ]
    }

    #[test]
    fn test_match_candidates_by_synonym() {
        let mapper = VerbatimMapper::new(VerbatimIndex::default());
        assert_eq!(
            mapper.match_candidates("Heart condition", &heart_candidates()),
            Some(Concept::new(1003, "Heart disease"))
        );
        assert_eq!(
            mapper.match_candidates("kidney-disease", &heart_candidates()),
            Some(Concept::new(1002, "Kidney disorder"))
        );
    }

    #[test]
    fn test_match_candidates_by_name() {
        let mapper = VerbatimMapper::new(VerbatimIndex::default());
        assert_eq!(
            mapper.match_candidates("LIVER DISORDERS", &heart_candidates()),
            Some(Concept::new(1001, "Liver disorder"))
        );
    }

    #[test]
    fn test_match_candidates_no_hit() {
        let mapper = VerbatimMapper::new(VerbatimIndex::default());
        assert!(mapper
            .match_candidates("Acute myocardial infarction", &heart_candidates())
            .is_none());
        assert!(mapper.match_candidates("()", &[MappingCandidate::new(1, "-")]).is_none());
        assert!(mapper.match_candidates("Gout", &[]).is_none());
    }

    #[test]
    fn test_long_token_builds_on_pool() {
        let term = format!("{}ed", "y".repeat(100_000));
        let mapper = VerbatimMapper::build(&[TermRecord::new(9, term.as_str(), "Noise")], 2).unwrap();

        assert_eq!(mapper.index().len(), 1);
        assert_eq!(mapper.lookup(&term), vec![Concept::new(9, "Noise")]);
    }

    #[test]
    fn test_missing_input_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let settings = IndexSettings {
            snapshot_file: dir.path().join("index.bin"),
            terms_folder: dir.path().join("terms"),
            max_cores: 1,
            show_progress: false,
        };

        assert!(matches!(
            VerbatimMapper::load_or_build(&settings),
            Err(IndexError::MissingInput { .. })
        ));
        assert!(!settings.snapshot_file.exists());
    }

    #[test]
    fn test_build_then_reuse_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let terms = dir.path().join("terms");
        write_term_file(&terms.join(batch_file_name(1, 4)), &records()).unwrap();

        let settings = IndexSettings {
            snapshot_file: dir.path().join("index").join("verbatim.bin"),
            terms_folder: terms.clone(),
            max_cores: 2,
            show_progress: false,
        };
        let built = VerbatimMapper::load_or_build(&settings).unwrap();
        assert!(settings.snapshot_file.is_file());

        // Snapshot wins even after the source files disappear.
        std::fs::remove_dir_all(&terms).unwrap();
        let loaded = VerbatimMapper::load_or_build(&settings).unwrap();
        assert_eq!(loaded.index(), built.index());
    }
}
