//! Parsing the final model response into a mapping decision.
//!
//! Two grammars are tried in order:
//! 1. Legacy lines: `Match: <concept_id | no_match | -1>` with an optional
//!    `Justification:` section.
//! 2. A JSON object with `match_found`, `concept_id` and `justification`.
//!
//! Each grammar is a pure function returning a [`ParsedDecision`] or a
//! [`ParseFailure`]. Only `NotRecognized` falls through to the next grammar;
//! a malformed decision is a hard error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use concept_mapper_core::models::{MappingCandidate, MappingResult};

static MATCH_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^#* ?Match ?:.*").unwrap());
static NO_MATCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)no[ _]match|-1").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static JUSTIFICATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Justification[:\-]?(.*)").unwrap());

/// Format errors in a model response. These abort the mapping call.
#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("No recognized decision format in response: {0}")]
    Unrecognized(String),

    #[error("No numeric match found in line: {0}")]
    MissingNumber(String),

    #[error("Match value '{0}' is not a valid integer")]
    InvalidConceptId(String),

    #[error("Match '{0}' not found in candidates")]
    UnknownConcept(i64),

    #[error("JSON parse error: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing or invalid field '{0}' in JSON response")]
    MissingField(&'static str),
}

pub type DecisionResult<T> = Result<T, DecisionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Legacy,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    NoMatch,
    Concept(i64),
}

/// A decision read from the response, not yet checked against candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDecision {
    pub grammar: Grammar,
    pub selection: Selection,
    pub rationale: String,
}

#[derive(Debug)]
pub enum ParseFailure {
    /// The grammar does not apply to this text
    NotRecognized,
    /// The grammar applies but the decision is unusable
    Malformed(DecisionError),
}

impl From<DecisionError> for ParseFailure {
    fn from(error: DecisionError) -> Self {
        ParseFailure::Malformed(error)
    }
}

/// The span from the first `{` to the last `}`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Legacy grammar. Bold markers are stripped and the last `Match:` line wins.
pub fn parse_legacy(response: &str) -> Result<ParsedDecision, ParseFailure> {
    let response = response.replace("**", "");
    let line = MATCH_LINE_RE
        .find_iter(&response)
        .last()
        .ok_or(ParseFailure::NotRecognized)?
        .as_str();

    let selection = if NO_MATCH_RE.is_match(line) {
        Selection::NoMatch
    } else {
        let number = NUMBER_RE
            .find(line)
            .ok_or_else(|| DecisionError::MissingNumber(line.to_string()))?
            .as_str();
        let concept_id = number
            .parse::<i64>()
            .map_err(|_| DecisionError::InvalidConceptId(number.to_string()))?;
        Selection::Concept(concept_id)
    };

    let rationale = JUSTIFICATION_RE
        .captures(&response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().replace('\n', " ").replace("\\n", "\n"))
        .unwrap_or_default();

    Ok(ParsedDecision {
        grammar: Grammar::Legacy,
        selection,
        rationale,
    })
}

/// JSON grammar: `{"match_found": bool, "concept_id": .., "justification": ".."}`.
pub fn parse_json(response: &str) -> Result<ParsedDecision, ParseFailure> {
    let object = extract_json_object(response).ok_or(ParseFailure::NotRecognized)?;
    let data: Value = serde_json::from_str(object).map_err(DecisionError::from)?;

    let match_found = data
        .get("match_found")
        .and_then(Value::as_bool)
        .ok_or(DecisionError::MissingField("match_found"))?;
    let rationale = data
        .get("justification")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let selection = if match_found {
        let value = data
            .get("concept_id")
            .ok_or(DecisionError::MissingField("concept_id"))?;
        Selection::Concept(coerce_concept_id(value)?)
    } else {
        Selection::NoMatch
    };

    Ok(ParsedDecision {
        grammar: Grammar::Json,
        selection,
        rationale,
    })
}

fn coerce_concept_id(value: &Value) -> DecisionResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| DecisionError::InvalidConceptId(value.to_string()))
}

/// Try each grammar in order.
pub fn parse_response(response: &str) -> DecisionResult<ParsedDecision> {
    let grammars: [fn(&str) -> Result<ParsedDecision, ParseFailure>; 2] = [parse_legacy, parse_json];
    for grammar in grammars {
        match grammar(response) {
            Ok(decision) => return Ok(decision),
            Err(ParseFailure::NotRecognized) => continue,
            Err(ParseFailure::Malformed(e)) => return Err(e),
        }
    }
    Err(DecisionError::Unrecognized(response.to_string()))
}

impl ParsedDecision {
    /// Check the selection against the candidate set and attach its name.
    pub fn resolve(self, candidates: &[MappingCandidate]) -> DecisionResult<MappingResult> {
        match self.selection {
            Selection::NoMatch => Ok(MappingResult::no_match(self.rationale)),
            Selection::Concept(concept_id) => candidates
                .iter()
                .find(|c| c.concept_id == concept_id)
                .map(|c| MappingResult::matched(concept_id, c.concept_name.clone(), self.rationale))
                .ok_or(DecisionError::UnknownConcept(concept_id)),
        }
    }
}

/// Parse a final response and validate it against the candidates.
pub fn parse_decision(response: &str, candidates: &[MappingCandidate]) -> DecisionResult<MappingResult> {
    parse_response(response)?.resolve(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<MappingCandidate> {
        vec![
            MappingCandidate::new(1001, "Heart attack"),
            MappingCandidate::new(1002, "Myocardial infarction"),
        ]
    }

    #[test]
    fn test_legacy_match_with_justification() {
        let result =
            parse_decision("Match: 1002\nJustification: because exact synonym", &candidates()).unwrap();
        assert_eq!(result, MappingResult::matched(1002, "Myocardial infarction", "because exact synonym"));
    }

    #[test]
    fn test_legacy_no_match() {
        let result = parse_decision("Match: no_match", &candidates()).unwrap();
        assert_eq!(result, MappingResult::no_match(""));

        let result = parse_decision("Match: -1", &candidates()).unwrap();
        assert!(result.is_no_match());

        let result = parse_decision("match : No Match", &candidates()).unwrap();
        assert!(result.is_no_match());
    }

    #[test]
    fn test_legacy_markdown_and_last_line() {
        let response = "## **Match:** 1001\nOn reflection:\n### Match: 1002\n**Justification:** closer\\nfit";
        let decision = parse_legacy(response).unwrap();
        assert_eq!(decision.selection, Selection::Concept(1002));
        assert_eq!(decision.rationale, "closer\nfit");
    }

    #[test]
    fn test_legacy_multiline_justification_flattened() {
        let decision = parse_legacy("Match: 1001\nJustification:\nline one\nline two\n").unwrap();
        assert_eq!(decision.rationale, "line one line two");
    }

    #[test]
    fn test_legacy_without_number_fails() {
        let err = parse_response("Match: the second one").unwrap_err();
        assert!(matches!(err, DecisionError::MissingNumber(_)));
    }

    #[test]
    fn test_unknown_concept_fails_hard() {
        let err = parse_decision("Match: 999", &candidates()).unwrap_err();
        assert!(matches!(err, DecisionError::UnknownConcept(999)));
    }

    #[test]
    fn test_json_no_match() {
        let result =
            parse_decision(r#"{"match_found": false, "justification": "too vague"}"#, &candidates()).unwrap();
        assert_eq!(result, MappingResult::no_match("too vague"));
    }

    #[test]
    fn test_json_match_in_prose() {
        let response = "Here is my answer:\n```json\n{\"match_found\": true, \"concept_id\": \"1001\", \"justification\": \"synonym\"}\n```";
        let result = parse_decision(response, &candidates()).unwrap();
        assert_eq!(result, MappingResult::matched(1001, "Heart attack", "synonym"));
    }

    #[test]
    fn test_json_errors() {
        assert!(matches!(
            parse_response(r#"{"match_found": true, "concept_id": "abc"}"#),
            Err(DecisionError::InvalidConceptId(_))
        ));
        assert!(matches!(
            parse_response(r#"{"match_found": true}"#),
            Err(DecisionError::MissingField("concept_id"))
        ));
        assert!(matches!(
            parse_response(r#"{"concept_id": 1}"#),
            Err(DecisionError::MissingField("match_found"))
        ));
        assert!(matches!(parse_response("{not json}"), Err(DecisionError::InvalidJson(_))));
    }

    #[test]
    fn test_legacy_takes_priority_over_json() {
        let response = "{\"match_found\": false}\nMatch: 1001";
        assert_eq!(parse_response(response).unwrap().grammar, Grammar::Legacy);
    }

    #[test]
    fn test_unrecognized_response() {
        let err = parse_response("I am not sure.").unwrap_err();
        assert!(matches!(err, DecisionError::Unrecognized(_)));
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("a {\"x\": {\"y\": 1}} b"), Some("{\"x\": {\"y\": 1}}"));
        assert_eq!(extract_json_object("} no {"), None);
        assert_eq!(extract_json_object("plain"), None);
    }
}
