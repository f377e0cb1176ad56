//! Hecate concept search API adapter.

use std::time::Duration;

use serde::Deserialize;

use super::{CandidateRetriever, SearchError, SearchResult};
use crate::models::SearchHit;

pub const DEFAULT_HECATE_URL: &str = "https://hecate.pantheon-hds.com/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const EVALUATION_DOMAINS: &str = "Condition,Observation,Measurement,Procedure";

const EVALUATION_CONCEPT_CLASSES: &str = "3-dig billing code,3-dig nonbill code,4-dig billing code,\
Answer,Claims Attachment,Clinical Finding,Clinical Observation,Context-dependent,CPT4,CPT4 Modifier,\
Disorder,Event,Genetic Variation,HCPCS,Histopattern,ICD10PCS,ICD10PCS Hierarchy,ICDO Condition,\
ICDO Histology,Ingredient,Lab Test,MDC,Metastasis,MS-DRG,NAACCR Variable,Observable Entity,Procedure,\
Question,Social Context,Staging / Scales,Staging/Grading,Survey,Topic,Topography,Value,Variable";

const EVALUATION_EXCLUDED_VOCABULARIES: &str = "ICD9CM,ICD10CM,ICD10,ICD10CN,ICD10GM,CIM10,ICDO3,KCD7,Read";

/// One matched term in a Hecate response, listing the concepts it belongs to.
#[derive(Debug, Deserialize)]
struct HecateTerm {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    concepts: Vec<HecateConcept>,
}

#[derive(Debug, Deserialize)]
struct HecateConcept {
    concept_id: i64,
    concept_name: String,
    #[serde(default)]
    domain_id: Option<String>,
    #[serde(default)]
    concept_class_id: Option<String>,
    #[serde(default)]
    vocabulary_id: Option<String>,
}

/// Blocking client for `{base}/search_standard`.
pub struct HecateSearcher {
    base_url: String,
    client: reqwest::blocking::Client,
    /// Query parameters sent with every request
    params: Vec<(String, String)>,
}

impl std::fmt::Debug for HecateSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HecateSearcher")
            .field("base_url", &self.base_url)
            .field("params", &self.params)
            .finish()
    }
}

impl HecateSearcher {
    /// Searcher restricted to standard concepts.
    pub fn new(base_url: impl Into<String>) -> SearchResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            params: vec![("standard_concept".to_string(), "S".to_string())],
        })
    }

    /// Searcher configured for benchmark runs: clinical domains and concept
    /// classes only, source classification vocabularies excluded.
    pub fn for_evaluation(base_url: impl Into<String>) -> SearchResult<Self> {
        Ok(Self::new(base_url)?
            .with_param("domain_id", EVALUATION_DOMAINS)
            .with_param("concept_class_id", EVALUATION_CONCEPT_CLASSES)
            .with_param("exclude_vocabulary_id", EVALUATION_EXCLUDED_VOCABULARIES))
    }

    /// Add a query parameter sent with every request.
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    fn fetch(&self, term: &str, limit: usize) -> SearchResult<Vec<SearchHit>> {
        let url = format!("{}/search_standard", self.base_url);
        let limit = limit.to_string();
        let mut query: Vec<(&str, &str)> = vec![("q", term), ("limit", limit.as_str())];
        query.extend(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self.client.get(&url).query(&query).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SearchError::InvalidResponse(format!("{}: {}", status, body)));
        }
        let body = response.text()?;
        parse_hecate_response(&body)
    }
}

/// Flatten a Hecate response: each term's score is copied onto its concepts.
fn parse_hecate_response(body: &str) -> SearchResult<Vec<SearchHit>> {
    let terms: Vec<HecateTerm> =
        serde_json::from_str(body).map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

    Ok(terms
        .into_iter()
        .flat_map(|term| {
            let score = term.score;
            term.concepts.into_iter().map(move |c| SearchHit {
                concept_id: c.concept_id,
                concept_name: c.concept_name,
                domain_id: c.domain_id,
                concept_class_id: c.concept_class_id,
                vocabulary_id: c.vocabulary_id,
                score,
            })
        })
        .collect())
}

impl CandidateRetriever for HecateSearcher {
    fn search(&self, term: &str, limit: usize) -> Option<Vec<SearchHit>> {
        match self.fetch(term, limit) {
            Ok(hits) if hits.is_empty() => None,
            Ok(hits) => Some(hits),
            Err(e) => {
                log::warn!("Hecate search for '{}' failed: {}", term, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_copies_term_score() {
        let body = r#"[
            {"term": "heart attack", "score": 0.91, "concepts": [
                {"concept_id": 4329847, "concept_name": "Myocardial infarction",
                 "domain_id": "Condition", "concept_class_id": "Clinical Finding",
                 "vocabulary_id": "SNOMED", "standard_concept": "S"},
                {"concept_id": 312327, "concept_name": "Acute myocardial infarction"}
            ]},
            {"term": "mi", "score": 0.5, "concepts": []}
        ]"#;

        let hits = parse_hecate_response(body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, Some(0.91));
        assert_eq!(hits[1].score, Some(0.91));
        assert_eq!(hits[0].vocabulary_id.as_deref(), Some("SNOMED"));
        assert!(hits[1].domain_id.is_none());
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(
            parse_hecate_response(r#"{"error": "bad"}"#),
            Err(SearchError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_connection_failure_degrades_to_none() {
        let searcher = HecateSearcher::new("http://127.0.0.1:1/api").unwrap();
        assert!(searcher.search("asthma", 5).is_none());
    }

    #[test]
    fn test_evaluation_params() {
        let searcher = HecateSearcher::for_evaluation(DEFAULT_HECATE_URL).unwrap();
        let keys: Vec<&str> = searcher.params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["standard_concept", "domain_id", "concept_class_id", "exclude_vocabulary_id"]
        );

        let classes: Vec<&str> = searcher.params[2].1.split(',').collect();
        assert_eq!(classes.len(), 36);
        assert_eq!(classes[0], "3-dig billing code");
        assert!(classes.contains(&"Staging / Scales"));
        assert!(classes.contains(&"Clinical Finding"));
        assert_eq!(classes[35], "Variable");
    }
}
