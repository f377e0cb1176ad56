//! Prompt construction for concept selection.
//!
//! The first step sends the source term and one JSON line per candidate,
//! restricted to the context columns enabled in [`ContextSettings`].

use serde::Serialize;
use serde_json::{Map, Value};

use concept_mapper_core::models::MappingCandidate;
use concept_mapper_core::ContextSettings;

use crate::decision::extract_json_object;

/// One candidate as shown to the model. Disabled or empty columns are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextRow {
    pub concept_id: i64,
    pub concept_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_parents: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_vocabulary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_children: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_synonyms: Option<String>,
}

impl ContextRow {
    pub fn from_candidate(candidate: &MappingCandidate, settings: &ContextSettings) -> Self {
        let pick = |enabled: bool, value: &Option<String>| if enabled { value.clone() } else { None };
        Self {
            concept_id: candidate.concept_id,
            concept_name: candidate.concept_name.clone(),
            concept_class_id: pick(settings.include_target_class, &candidate.concept_class_id),
            concept_parents: pick(settings.include_target_parents, &candidate.parents),
            concept_domain: pick(settings.include_target_domain, &candidate.domain_id),
            concept_vocabulary: pick(settings.include_target_vocabulary, &candidate.vocabulary_id),
            concept_children: pick(settings.include_target_children, &candidate.children),
            concept_synonyms: pick(settings.include_target_synonyms, &candidate.synonyms),
        }
    }
}

pub fn context_rows(candidates: &[MappingCandidate], settings: &ContextSettings) -> Vec<ContextRow> {
    candidates
        .iter()
        .map(|c| ContextRow::from_candidate(c, settings))
        .collect()
}

/// One JSON object per line.
pub fn format_context_lines(rows: &[ContextRow]) -> String {
    rows.iter()
        .filter_map(|row| serde_json::to_string(row).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for the first step.
pub fn build_initial_prompt(source_term: &str, rows: &[ContextRow]) -> String {
    format!(
        "Source term: {}\n\nCandidate target concepts:\n{}",
        source_term,
        format_context_lines(rows)
    )
}

/// Add full context rows to a step-one response of the form
/// `{"source_term": .., "target_concepts": [{"id": .., ..}, ..]}`.
///
/// Targets are joined to rows by ID. Returns `None` when the response does
/// not have that shape; callers then keep the response as is.
pub fn reinsert_target_details(response: &str, rows: &[ContextRow]) -> Option<String> {
    let object = extract_json_object(response)?;
    let data: Value = serde_json::from_str(object).ok()?;
    let source_term = data.get("source_term")?.clone();
    let targets = data.get("target_concepts")?.as_array()?;

    let merged: Vec<Value> = targets
        .iter()
        .map(|target| merge_target(target, rows))
        .collect::<Option<_>>()?;

    let mut output = Map::new();
    output.insert("source_term".to_string(), source_term);
    output.insert("target_concepts".to_string(), Value::Array(merged));
    serde_json::to_string_pretty(&Value::Object(output)).ok()
}

fn merge_target(target: &Value, rows: &[ContextRow]) -> Option<Value> {
    let mut fields = target.as_object()?.clone();
    let id = match fields.get("id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    if let Some(id) = id {
        fields.insert("id".to_string(), Value::from(id));
        if let Some(row) = rows.iter().find(|r| r.concept_id == id) {
            if let Value::Object(details) = serde_json::to_value(row).ok()? {
                for (key, value) in details {
                    if key != "concept_id" {
                        fields.entry(key).or_insert(value);
                    }
                }
            }
        }
    }
    Some(Value::Object(fields))
}
