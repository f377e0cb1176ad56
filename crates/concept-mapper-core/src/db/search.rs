//! Full-text concept search and prompt context.

use std::collections::HashMap;

use rusqlite::params;
use strsim::{jaro_winkler, normalized_levenshtein};

use super::{Database, DbResult, ENGLISH_LANGUAGE_CONCEPT_ID};
use crate::models::{MappingCandidate, SearchHit};
use crate::search::{CandidateRetriever, ConceptContext, SearchResult};

/// FTS rows fetched per requested hit, before grouping by concept.
const FTS_OVERFETCH: usize = 5;

/// Children listed per concept in prompt context.
pub const MAX_CHILDREN: usize = 10;

impl Database {
    /// Search standard concepts by name and synonym.
    ///
    /// FTS5 prefix matching proposes concepts; they are re-ranked by fuzzy
    /// similarity between the query and each concept's best matching term.
    pub fn search_concepts(&self, query: &str, limit: usize) -> DbResult<Vec<SearchHit>> {
        let escaped_query = escape_fts_query(query);
        if escaped_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.concept_id, c.concept_name, c.domain_id, c.concept_class_id,
                   c.vocabulary_id, m.term, m.rank
            FROM (
                SELECT CAST(concept_id AS INTEGER) AS concept_id, term,
                       bm25(concept_term_fts) AS rank
                FROM concept_term_fts
                WHERE concept_term_fts MATCH ?1
                ORDER BY rank
                LIMIT ?2
            ) m
            JOIN concept c ON c.concept_id = m.concept_id
            WHERE c.standard_concept = 'S'
            ORDER BY m.rank
            "#,
        )?;

        let rows = stmt.query_map(
            params![escaped_query, fts_row_limit(limit)],
            |row| {
                Ok((
                    SearchHit {
                        concept_id: row.get(0)?,
                        concept_name: row.get(1)?,
                        domain_id: row.get(2)?,
                        concept_class_id: row.get(3)?,
                        vocabulary_id: row.get(4)?,
                        score: None,
                    },
                    row.get::<_, String>(5)?,
                ))
            },
        )?;

        let query_lower = query.to_lowercase();
        let mut order: Vec<i64> = Vec::new();
        let mut best: HashMap<i64, SearchHit> = HashMap::new();
        for row in rows {
            let (mut hit, term) = row?;
            let score = fuzzy_match(&query_lower, &term.to_lowercase());
            match best.get_mut(&hit.concept_id) {
                Some(existing) => {
                    if score > existing.score.unwrap_or(0.0) {
                        existing.score = Some(score);
                    }
                }
                None => {
                    hit.score = Some(score);
                    order.push(hit.concept_id);
                    best.insert(hit.concept_id, hit);
                }
            }
        }

        // Stable sort keeps FTS order among equal scores.
        let mut hits: Vec<SearchHit> = order.into_iter().filter_map(|id| best.remove(&id)).collect();
        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Names of direct parents, `;`-separated.
    pub fn parent_names(&self, concept_id: i64) -> DbResult<Option<String>> {
        self.related_names(
            r#"
            SELECT c.concept_name FROM concept_ancestor a
            JOIN concept c ON c.concept_id = a.ancestor_concept_id
            WHERE a.descendant_concept_id = ?1 AND a.min_levels_of_separation = 1
            ORDER BY c.concept_name
            LIMIT ?2
            "#,
            concept_id,
            usize::MAX,
        )
    }

    /// Names of up to [`MAX_CHILDREN`] direct children, `;`-separated.
    pub fn child_names(&self, concept_id: i64) -> DbResult<Option<String>> {
        self.related_names(
            r#"
            SELECT c.concept_name FROM concept_ancestor a
            JOIN concept c ON c.concept_id = a.descendant_concept_id
            WHERE a.ancestor_concept_id = ?1 AND a.min_levels_of_separation = 1
            ORDER BY c.concept_name
            LIMIT ?2
            "#,
            concept_id,
            MAX_CHILDREN,
        )
    }

    /// English synonyms other than the concept name, `;`-separated.
    pub fn synonym_names(&self, concept_id: i64) -> DbResult<Option<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.concept_synonym_name FROM concept_synonym s
            JOIN concept c ON c.concept_id = s.concept_id
            WHERE s.concept_id = ?1 AND s.language_concept_id = ?2
              AND s.concept_synonym_name != c.concept_name
            ORDER BY s.concept_synonym_name
            "#,
        )?;
        let names = stmt
            .query_map(params![concept_id, ENGLISH_LANGUAGE_CONCEPT_ID], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(join_names(names))
    }

    fn related_names(&self, sql: &str, concept_id: i64, limit: usize) -> DbResult<Option<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let names = stmt
            .query_map(params![concept_id, limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(join_names(names))
    }

    /// Add parents, children and synonyms to search hits.
    pub fn enrich_candidates(&self, hits: Vec<SearchHit>) -> DbResult<Vec<MappingCandidate>> {
        hits.into_iter()
            .map(|hit| {
                let concept_id = hit.concept_id;
                let mut candidate = MappingCandidate::from(hit);
                candidate.parents = self.parent_names(concept_id)?;
                candidate.children = self.child_names(concept_id)?;
                candidate.synonyms = self.synonym_names(concept_id)?;
                Ok(candidate)
            })
            .collect()
    }
}

impl CandidateRetriever for Database {
    fn search(&self, term: &str, limit: usize) -> Option<Vec<SearchHit>> {
        match self.search_concepts(term, limit) {
            Ok(hits) if hits.is_empty() => None,
            Ok(hits) => Some(hits),
            Err(e) => {
                log::warn!("Concept search for '{}' failed: {}", term, e);
                None
            }
        }
    }
}

impl ConceptContext for Database {
    fn enrich(&self, hits: Vec<SearchHit>) -> SearchResult<Vec<MappingCandidate>> {
        Ok(self.enrich_candidates(hits)?)
    }
}

/// FTS rows to fetch for `limit` hits, clamped to SQLite's integer range.
fn fts_row_limit(limit: usize) -> i64 {
    i64::try_from(limit.saturating_mul(FTS_OVERFETCH)).unwrap_or(i64::MAX)
}

fn join_names(names: Vec<String>) -> Option<String> {
    if names.is_empty() {
        None
    } else {
        Some(names.join(";"))
    }
}

/// Escape FTS5 special characters and add prefix matching.
fn escape_fts_query(query: &str) -> String {
    // Remove special FTS5 operators and add wildcard for prefix matching
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute fuzzy string similarity using combined metrics.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    let jw = jaro_winkler(a, b);
    let lev = normalized_levenshtein(a, b);

    // Jaro-Winkler favours shared prefixes
    jw * 0.6 + lev * 0.4
}
