//! Concept, synonym and hierarchy storage.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DbError, DbResult, ENGLISH_LANGUAGE_CONCEPT_ID};
use crate::models::Concept;

/// A row of the `concept` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyConcept {
    pub concept_id: i64,
    pub concept_name: String,
    pub domain_id: Option<String>,
    pub vocabulary_id: Option<String>,
    pub concept_class_id: Option<String>,
    /// 'S' for standard, 'C' for classification, `None` otherwise
    pub standard_concept: Option<String>,
}

impl VocabularyConcept {
    /// A standard concept with the given attributes.
    pub fn standard(
        concept_id: i64,
        concept_name: impl Into<String>,
        domain_id: &str,
        vocabulary_id: &str,
        concept_class_id: &str,
    ) -> Self {
        Self {
            concept_id,
            concept_name: concept_name.into(),
            domain_id: Some(domain_id.to_string()),
            vocabulary_id: Some(vocabulary_id.to_string()),
            concept_class_id: Some(concept_class_id.to_string()),
            standard_concept: Some("S".to_string()),
        }
    }

    pub fn concept(&self) -> Concept {
        Concept::new(self.concept_id, self.concept_name.clone())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            concept_id: row.get(0)?,
            concept_name: row.get(1)?,
            domain_id: row.get(2)?,
            vocabulary_id: row.get(3)?,
            concept_class_id: row.get(4)?,
            standard_concept: row.get(5)?,
        })
    }
}

impl Database {
    /// Insert or update a concept.
    pub fn upsert_concept(&self, concept: &VocabularyConcept) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO concept (concept_id, concept_name, domain_id, vocabulary_id,
                                 concept_class_id, standard_concept)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(concept_id) DO UPDATE SET
                concept_name = excluded.concept_name,
                domain_id = excluded.domain_id,
                vocabulary_id = excluded.vocabulary_id,
                concept_class_id = excluded.concept_class_id,
                standard_concept = excluded.standard_concept
            "#,
            params![
                concept.concept_id,
                concept.concept_name,
                concept.domain_id,
                concept.vocabulary_id,
                concept.concept_class_id,
                concept.standard_concept,
            ],
        )?;
        Ok(())
    }

    /// Insert many concepts in one transaction.
    pub fn upsert_concepts(&mut self, concepts: &[VocabularyConcept]) -> DbResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO concept (concept_id, concept_name, domain_id, vocabulary_id,
                                     concept_class_id, standard_concept)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(concept_id) DO UPDATE SET
                    concept_name = excluded.concept_name,
                    domain_id = excluded.domain_id,
                    vocabulary_id = excluded.vocabulary_id,
                    concept_class_id = excluded.concept_class_id,
                    standard_concept = excluded.standard_concept
                "#,
            )?;
            for concept in concepts {
                stmt.execute(params![
                    concept.concept_id,
                    concept.concept_name,
                    concept.domain_id,
                    concept.vocabulary_id,
                    concept.concept_class_id,
                    concept.standard_concept,
                ])?;
            }
        }
        tx.commit()?;
        Ok(concepts.len())
    }

    /// Get a concept by ID.
    pub fn get_concept(&self, concept_id: i64) -> DbResult<Option<VocabularyConcept>> {
        let concept = self
            .conn
            .query_row(
                r#"
                SELECT concept_id, concept_name, domain_id, vocabulary_id,
                       concept_class_id, standard_concept
                FROM concept WHERE concept_id = ?
                "#,
                [concept_id],
                VocabularyConcept::from_row,
            )
            .optional()?;
        Ok(concept)
    }

    pub fn delete_concept(&self, concept_id: i64) -> DbResult<()> {
        let rows = self
            .conn
            .execute("DELETE FROM concept WHERE concept_id = ?", [concept_id])?;
        if rows == 0 {
            return Err(DbError::NotFound(format!("concept {}", concept_id)));
        }
        Ok(())
    }

    pub fn concept_count(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM concept", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Add an English synonym. Duplicates are ignored.
    pub fn add_synonym(&self, concept_id: i64, synonym: &str) -> DbResult<()> {
        self.add_synonym_in_language(concept_id, synonym, ENGLISH_LANGUAGE_CONCEPT_ID)
    }

    pub fn add_synonym_in_language(
        &self,
        concept_id: i64,
        synonym: &str,
        language_concept_id: i64,
    ) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO concept_synonym (concept_id, concept_synonym_name, language_concept_id)
            VALUES (?1, ?2, ?3)
            "#,
            params![concept_id, synonym, language_concept_id],
        )?;
        Ok(())
    }

    pub fn remove_synonym(&self, concept_id: i64, synonym: &str) -> DbResult<()> {
        let rows = self.conn.execute(
            "DELETE FROM concept_synonym WHERE concept_id = ?1 AND concept_synonym_name = ?2",
            params![concept_id, synonym],
        )?;
        if rows == 0 {
            return Err(DbError::NotFound(format!("synonym '{}' of concept {}", synonym, concept_id)));
        }
        Ok(())
    }

    /// Record that `ancestor` subsumes `descendant`.
    pub fn add_ancestor(
        &self,
        ancestor_concept_id: i64,
        descendant_concept_id: i64,
        min_levels: i64,
        max_levels: i64,
    ) -> DbResult<()> {
        if ancestor_concept_id == descendant_concept_id {
            return Err(DbError::Constraint(format!(
                "concept {} cannot be its own ancestor",
                ancestor_concept_id
            )));
        }
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO concept_ancestor
                (ancestor_concept_id, descendant_concept_id,
                 min_levels_of_separation, max_levels_of_separation)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![ancestor_concept_id, descendant_concept_id, min_levels, max_levels],
        )?;
        Ok(())
    }
}
