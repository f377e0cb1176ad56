//! SQLite schema definition.

/// English, the language of synonyms used for prompt context.
pub const ENGLISH_LANGUAGE_CONCEPT_ID: i64 = 4180186;

/// Vocabulary schema: OMOP-style concept tables plus an FTS5 term index.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Concepts
-- ============================================================================

CREATE TABLE IF NOT EXISTS concept (
    concept_id INTEGER PRIMARY KEY,
    concept_name TEXT NOT NULL,
    domain_id TEXT,
    vocabulary_id TEXT,
    concept_class_id TEXT,
    standard_concept TEXT                        -- 'S', 'C' or NULL
);

CREATE INDEX IF NOT EXISTS idx_concept_vocabulary ON concept(vocabulary_id);
CREATE INDEX IF NOT EXISTS idx_concept_domain ON concept(domain_id);

CREATE TABLE IF NOT EXISTS concept_synonym (
    concept_id INTEGER NOT NULL REFERENCES concept(concept_id) ON DELETE CASCADE,
    concept_synonym_name TEXT NOT NULL,
    language_concept_id INTEGER NOT NULL DEFAULT 4180186,
    UNIQUE (concept_id, concept_synonym_name)
);

CREATE TABLE IF NOT EXISTS concept_ancestor (
    ancestor_concept_id INTEGER NOT NULL REFERENCES concept(concept_id) ON DELETE CASCADE,
    descendant_concept_id INTEGER NOT NULL REFERENCES concept(concept_id) ON DELETE CASCADE,
    min_levels_of_separation INTEGER NOT NULL,
    max_levels_of_separation INTEGER NOT NULL,
    PRIMARY KEY (ancestor_concept_id, descendant_concept_id)
);

CREATE INDEX IF NOT EXISTS idx_ancestor_descendant ON concept_ancestor(descendant_concept_id);

-- ============================================================================
-- Term search
-- ============================================================================

-- One row per concept name or synonym; kind is 'name' or 'synonym'
CREATE VIRTUAL TABLE IF NOT EXISTS concept_term_fts USING fts5(
    term,
    concept_id UNINDEXED,
    kind UNINDEXED
);

CREATE TRIGGER IF NOT EXISTS concept_ai AFTER INSERT ON concept BEGIN
    INSERT INTO concept_term_fts(term, concept_id, kind)
    VALUES (new.concept_name, new.concept_id, 'name');
END;

CREATE TRIGGER IF NOT EXISTS concept_ad AFTER DELETE ON concept BEGIN
    DELETE FROM concept_term_fts WHERE concept_id = old.concept_id;
END;

CREATE TRIGGER IF NOT EXISTS concept_au AFTER UPDATE OF concept_name ON concept BEGIN
    DELETE FROM concept_term_fts WHERE concept_id = old.concept_id AND kind = 'name';
    INSERT INTO concept_term_fts(term, concept_id, kind)
    VALUES (new.concept_name, new.concept_id, 'name');
END;

CREATE TRIGGER IF NOT EXISTS concept_synonym_ai AFTER INSERT ON concept_synonym BEGIN
    INSERT INTO concept_term_fts(term, concept_id, kind)
    VALUES (new.concept_synonym_name, new.concept_id, 'synonym');
END;

CREATE TRIGGER IF NOT EXISTS concept_synonym_ad AFTER DELETE ON concept_synonym BEGIN
    DELETE FROM concept_term_fts
    WHERE concept_id = old.concept_id AND term = old.concept_synonym_name AND kind = 'synonym';
END;
"#;
