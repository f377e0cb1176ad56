//! Vocabulary rows for the verbatim index.

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use super::Database;
use crate::config::VerbatimMappingConfig;
use crate::models::TermRecord;
use crate::terms::{TermSource, TermsResult};

/// Which concepts and terms are exported.
#[derive(Debug, Clone, Default)]
pub struct TermFilter {
    /// Restrict to these vocabularies (empty = all)
    pub vocabularies: Vec<String>,
    /// Restrict to these domains (empty = all)
    pub domain_ids: Vec<String>,
    pub include_classification_concepts: bool,
    pub include_synonyms: bool,
}

impl From<&VerbatimMappingConfig> for TermFilter {
    fn from(config: &VerbatimMappingConfig) -> Self {
        Self {
            vocabularies: config.vocabularies.clone(),
            domain_ids: config.domain_ids.clone(),
            include_classification_concepts: config.include_classification_concepts,
            include_synonyms: config.include_synonyms,
        }
    }
}

impl TermFilter {
    /// WHERE clause over alias `c` plus its bind values.
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if self.include_classification_concepts {
            clauses.push("c.standard_concept IN ('S', 'C')".to_string());
        } else {
            clauses.push("c.standard_concept = 'S'".to_string());
        }
        for (column, allowed) in [("c.vocabulary_id", &self.vocabularies), ("c.domain_id", &self.domain_ids)] {
            if allowed.is_empty() {
                continue;
            }
            let placeholders = vec!["?"; allowed.len()].join(", ");
            clauses.push(format!("{} IN ({})", column, placeholders));
            values.extend(allowed.iter().cloned().map(Value::Text));
        }

        (clauses.join(" AND "), values)
    }
}

/// A filtered view of the vocabulary, read in stable (concept_id, term) order.
pub struct VocabularyTermSource<'a> {
    db: &'a Database,
    filter: TermFilter,
}

impl<'a> VocabularyTermSource<'a> {
    pub fn new(db: &'a Database, filter: TermFilter) -> Self {
        Self { db, filter }
    }

    fn query(&self) -> (String, Vec<Value>) {
        let (where_clause, mut values) = self.filter.where_clause();
        let mut sql = format!(
            "SELECT c.concept_id, c.concept_name AS term, c.concept_name \
             FROM concept c WHERE {}",
            where_clause
        );
        if self.filter.include_synonyms {
            let (synonym_where, synonym_values) = self.filter.where_clause();
            sql.push_str(&format!(
                " UNION SELECT c.concept_id, s.concept_synonym_name AS term, c.concept_name \
                 FROM concept_synonym s JOIN concept c ON c.concept_id = s.concept_id WHERE {}",
                synonym_where
            ));
            values.extend(synonym_values);
        }
        let sql = format!(
            "SELECT concept_id, term, concept_name FROM ({}) ORDER BY concept_id, term LIMIT ? OFFSET ?",
            sql
        );
        (sql, values)
    }
}

impl TermSource for VocabularyTermSource<'_> {
    fn fetch_terms(&self, offset: usize, limit: usize) -> TermsResult<Vec<TermRecord>> {
        let (sql, mut values) = self.query();
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));

        let mut stmt = self.db.conn.prepare(&sql).map_err(crate::db::DbError::from)?;
        let records = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(TermRecord::new(row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(crate::db::DbError::from)?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::VocabularyConcept;
    use crate::terms::{download_terms, read_term_file};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_concept(&VocabularyConcept::standard(1, "Asthma", "Condition", "SNOMED", "Clinical Finding"))
            .unwrap();
        db.upsert_concept(&VocabularyConcept::standard(2, "Appendectomy", "Procedure", "SNOMED", "Procedure"))
            .unwrap();
        let mut classification = VocabularyConcept::standard(3, "Disorder of lung", "Condition", "SNOMED", "Clinical Finding");
        classification.standard_concept = Some("C".into());
        db.upsert_concept(&classification).unwrap();
        let mut non_standard = VocabularyConcept::standard(4, "Asthma NOS", "Condition", "ICD10CM", "4-char billing code");
        non_standard.standard_concept = None;
        db.upsert_concept(&non_standard).unwrap();

        db.add_synonym(1, "Bronchial asthma").unwrap();
        db.add_synonym(1, "Asthma").unwrap();
        db
    }

    #[test]
    fn test_standard_with_synonyms() {
        let db = setup_db();
        let filter = TermFilter {
            include_synonyms: true,
            ..Default::default()
        };
        let rows = VocabularyTermSource::new(&db, filter).fetch_terms(0, 100).unwrap();

        assert_eq!(
            rows,
            vec![
                TermRecord::new(1, "Asthma", "Asthma"),
                TermRecord::new(1, "Bronchial asthma", "Asthma"),
                TermRecord::new(2, "Appendectomy", "Appendectomy"),
            ]
        );
    }

    #[test]
    fn test_domain_and_classification_filters() {
        let db = setup_db();
        let filter = TermFilter {
            domain_ids: vec!["Condition".into()],
            include_classification_concepts: true,
            ..Default::default()
        };
        let rows = VocabularyTermSource::new(&db, filter).fetch_terms(0, 100).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.concept_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_vocabulary_filter_and_paging() {
        let db = setup_db();
        let filter = TermFilter {
            vocabularies: vec!["SNOMED".into()],
            include_synonyms: true,
            ..Default::default()
        };
        let source = VocabularyTermSource::new(&db, filter);
        assert_eq!(source.fetch_terms(1, 1).unwrap(), vec![TermRecord::new(1, "Bronchial asthma", "Asthma")]);
        assert!(source.fetch_terms(10, 5).unwrap().is_empty());
    }

    #[test]
    fn test_download_from_database() {
        let db = setup_db();
        let dir = tempfile::tempdir().unwrap();
        let source = VocabularyTermSource::new(
            &db,
            TermFilter {
                include_synonyms: true,
                ..Default::default()
            },
        );

        let files = download_terms(&source, dir.path(), 2).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(read_term_file(&files[1]).unwrap().len(), 1);
    }
}
