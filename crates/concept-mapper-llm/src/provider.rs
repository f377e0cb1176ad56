//! Completion and embedding providers.
//!
//! Providers return content plus token usage; cost is computed from the
//! pricing table below. Local providers and unknown models cost nothing.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider errors. These are not retried.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Mock provider has no scripted response left")]
    Exhausted,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Token counts and cost of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_cost_usd: f64,
}

/// Completion output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Empty when the provider's content filter fired
    pub content: String,
    pub usage: TokenUsage,
}

/// Embedding output, one vector per input text in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResponse {
    pub vectors: Vec<Vec<f32>>,
    pub usage: TokenUsage,
}

pub trait LlmProvider {
    /// Send one user prompt with an optional system instruction.
    fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> ProviderResult<LlmResponse>;
}

pub trait EmbeddingProvider {
    fn embed(&self, texts: &[String]) -> ProviderResult<EmbeddingResponse>;
}

/// Where requests are sent. Local deployments are free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    OpenAi,
    Azure,
    Local,
}

/// USD per million tokens: (model key, input, output).
const PRICING_TABLE: &[(&str, f64, f64)] = &[
    ("o3", 2.00, 8.00),
    ("o3-mini", 1.10, 4.40),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("text-embedding-3-small", 0.02, 0.00),
    ("text-embedding-3-large", 0.13, 0.00),
    ("local", 0.00, 0.00),
];

/// Models that accept an explicit zero temperature.
const TEMPERATURE_OK_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4",
    "gpt-35-turbo",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-3.5-turbo",
];

/// Price entry for a model name: the longest table key contained in it.
fn price_for(model: &str) -> Option<(f64, f64)> {
    PRICING_TABLE
        .iter()
        .filter(|(key, _, _)| model.contains(key))
        .max_by_key(|(key, _, _)| key.len())
        .map(|&(_, input, output)| (input, output))
}

/// Cost in USD, rounded to six decimals.
pub fn calculate_cost(model: &str, input_tokens: u64, output_tokens: u64, kind: ProviderKind) -> f64 {
    if kind == ProviderKind::Local {
        return 0.0;
    }
    let Some((input_price, output_price)) = price_for(model) else {
        return 0.0;
    };
    let cost = (input_tokens as f64 / 1e6) * input_price + (output_tokens as f64 / 1e6) * output_price;
    (cost * 1e6).round() / 1e6
}

/// Temperature to send for a model, if any.
pub fn temperature_for(model: &str) -> Option<f64> {
    TEMPERATURE_OK_MODELS.contains(&model).then_some(0.0)
}

/// A recorded call to [`MockProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub system_prompt: Option<String>,
}

/// Mock provider returning scripted responses, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MockProvider {
    responses: RefCell<VecDeque<LlmResponse>>,
    calls: RefCell<Vec<RecordedCall>>,
    embed_calls: Cell<usize>,
    dimensions: usize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            dimensions: 8,
            ..Default::default()
        }
    }

    /// Queue a response with the given content and cost.
    pub fn with_response(self, content: impl Into<String>, cost_usd: f64) -> Self {
        self.push_response(content, cost_usd);
        self
    }

    pub fn push_response(&self, content: impl Into<String>, cost_usd: f64) {
        let content = content.into();
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: content.split_whitespace().count() as u64,
            reasoning_tokens: 0,
            total_cost_usd: cost_usd,
        };
        self.responses
            .borrow_mut()
            .push_back(LlmResponse { content, usage });
    }

    /// Number of completion calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn embed_call_count(&self) -> usize {
        self.embed_calls.get()
    }

    /// Deterministic bag-of-characters vector for a text.
    fn mock_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions.max(1)];
        let len = vector.len();
        for (i, byte) in text.to_lowercase().bytes().enumerate() {
            vector[(byte as usize + i % 3) % len] += 1.0;
        }
        vector
    }
}

impl LlmProvider for MockProvider {
    fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> ProviderResult<LlmResponse> {
        self.calls.borrow_mut().push(RecordedCall {
            prompt: prompt.to_string(),
            system_prompt: system_prompt.map(str::to_string),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or(ProviderError::Exhausted)
    }
}

impl EmbeddingProvider for MockProvider {
    fn embed(&self, texts: &[String]) -> ProviderResult<EmbeddingResponse> {
        self.embed_calls.set(self.embed_calls.get() + 1);
        let input_tokens: u64 = texts.iter().map(|t| t.split_whitespace().count() as u64).sum();
        Ok(EmbeddingResponse {
            vectors: texts.iter().map(|t| self.mock_vector(t)).collect(),
            usage: TokenUsage {
                input_tokens,
                output_tokens: 0,
                reasoning_tokens: 0,
                total_cost_usd: calculate_cost("text-embedding-3-small", input_tokens, 0, ProviderKind::OpenAi),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_uses_most_specific_key() {
        // 1M input + 1M output tokens
        assert_eq!(calculate_cost("gpt-4o", 1_000_000, 1_000_000, ProviderKind::OpenAi), 12.5);
        assert_eq!(calculate_cost("gpt-4o-mini", 1_000_000, 1_000_000, ProviderKind::OpenAi), 0.75);
        assert_eq!(calculate_cost("o3-mini-2025-01-31", 1_000_000, 0, ProviderKind::Azure), 1.1);
        assert_eq!(calculate_cost("o3", 0, 1_000_000, ProviderKind::OpenAi), 8.0);
    }

    #[test]
    fn test_cost_rounded_to_six_decimals() {
        assert_eq!(calculate_cost("gpt-4o-mini", 1, 1, ProviderKind::OpenAi), 0.000001);
        assert_eq!(calculate_cost("text-embedding-3-small", 1234, 0, ProviderKind::OpenAi), 0.000025);
    }

    #[test]
    fn test_unknown_and_local_are_free() {
        assert_eq!(calculate_cost("llama-3.1-8b", 5_000, 5_000, ProviderKind::OpenAi), 0.0);
        assert_eq!(calculate_cost("gpt-4o", 5_000, 5_000, ProviderKind::Local), 0.0);
    }

    #[test]
    fn test_temperature_only_for_known_models() {
        assert_eq!(temperature_for("gpt-4o"), Some(0.0));
        assert_eq!(temperature_for("gpt-3.5-turbo"), Some(0.0));
        assert_eq!(temperature_for("o3-mini"), None);
        assert_eq!(temperature_for("gpt-4o-2024-08-06"), None);
    }

    #[test]
    fn test_mock_provider_scripted() {
        let provider = MockProvider::new().with_response("Match: 1", 0.01);

        let response = provider.complete("prompt", Some("system")).unwrap();
        assert_eq!(response.content, "Match: 1");
        assert_eq!(response.usage.total_cost_usd, 0.01);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.calls()[0].system_prompt.as_deref(), Some("system"));

        assert!(matches!(provider.complete("again", None), Err(ProviderError::Exhausted)));
    }

    #[test]
    fn test_mock_embeddings_deterministic() {
        let provider = MockProvider::new();
        let texts = vec!["Asthma".to_string(), "asthma".to_string()];
        let response = provider.embed(&texts).unwrap();

        assert_eq!(response.vectors.len(), 2);
        assert_eq!(response.vectors[0], response.vectors[1]);
        assert_eq!(provider.embed_call_count(), 1);
    }
}
