//! OpenAI-compatible HTTP client (OpenAI, Azure OpenAI, LM Studio).
//!
//! Settings come from environment variables:
//! - `GENAI_PROVIDER`: `openai` (default), `azure` or `lm-studio`
//! - `LLM_MODEL` / `LLM_API_KEY`, `EMBEDDING_MODEL` / `EMBEDDING_API_KEY`
//! - Azure: `AZURE_LLM_ENDPOINT`, `AZURE_EMBEDDING_ENDPOINT`, `AZURE_OPENAI_API_VERSION`
//! - LM Studio: `LM_STUDIO_ENDPOINT`

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::provider::{
    calculate_cost, temperature_for, EmbeddingProvider, EmbeddingResponse, LlmProvider, LlmResponse,
    ProviderError, ProviderKind, ProviderResult, TokenUsage,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const LM_STUDIO_API_KEY: &str = "lm-studio";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Which model family the client is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Completion,
    Embedding,
}

#[derive(Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Sent as the `api-version` query parameter (Azure only)
    pub api_version: Option<String>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl ProviderSettings {
    pub fn from_env(task: Task) -> ProviderResult<Self> {
        Self::from_lookup(task, |name| std::env::var(name).ok())
    }

    /// Read settings through `lookup` instead of the process environment.
    pub fn from_lookup<F>(task: Task, lookup: F) -> ProviderResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| lookup(name).ok_or_else(|| ProviderError::MissingEnv(name.to_string()));

        let (model_var, key_var, azure_endpoint_var) = match task {
            Task::Completion => ("LLM_MODEL", "LLM_API_KEY", "AZURE_LLM_ENDPOINT"),
            Task::Embedding => ("EMBEDDING_MODEL", "EMBEDDING_API_KEY", "AZURE_EMBEDDING_ENDPOINT"),
        };
        let model = require(model_var)?;
        let provider = lookup("GENAI_PROVIDER")
            .unwrap_or_else(|| "openai".to_string())
            .to_lowercase();

        let settings = match provider.as_str() {
            "azure" => Self {
                kind: ProviderKind::Azure,
                base_url: require(azure_endpoint_var)?,
                api_key: require(key_var)?,
                model,
                api_version: Some(require("AZURE_OPENAI_API_VERSION")?),
            },
            "lm-studio" => Self {
                kind: ProviderKind::Local,
                base_url: require("LM_STUDIO_ENDPOINT")?,
                api_key: LM_STUDIO_API_KEY.to_string(),
                model,
                api_version: None,
            },
            _ => Self {
                kind: ProviderKind::OpenAi,
                base_url: OPENAI_BASE_URL.to_string(),
                api_key: require(key_var)?,
                model,
                api_version: None,
            },
        };
        Ok(settings)
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionDetails {
    reasoning_tokens: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    completion_tokens_details: Option<CompletionDetails>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: ApiUsage,
}

/// Blocking client for chat completions and embeddings.
pub struct OpenAiClient {
    settings: ProviderSettings,
    client: reqwest::blocking::Client,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(settings: ProviderSettings) -> ProviderResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { settings, client })
    }

    pub fn from_env(task: Task) -> ProviderResult<Self> {
        Self::new(ProviderSettings::from_env(task)?)
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> ProviderResult<String> {
        let url = format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path);
        let mut request = self
            .client
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(body);
        if let Some(version) = &self.settings.api_version {
            request = request
                .query(&[("api-version", version.as_str())])
                .header("api-key", &self.settings.api_key);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

fn chat_request_body(model: &str, prompt: &str, system_prompt: Option<&str>) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));

    let mut body = json!({"model": model, "messages": messages});
    if let Some(temperature) = temperature_for(model) {
        body["temperature"] = json!(temperature);
    }
    body
}

fn parse_chat_response(text: &str, model: &str, kind: ProviderKind) -> ProviderResult<LlmResponse> {
    let response: ChatResponse = serde_json::from_str(text)
        .map_err(|e| ProviderError::InvalidFormat(format!("chat response: {}", e)))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidFormat("no choices in response".into()))?;

    let usage = response.usage;
    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        usage: TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            reasoning_tokens: usage
                .completion_tokens_details
                .and_then(|d| d.reasoning_tokens)
                .unwrap_or(0),
            total_cost_usd: calculate_cost(model, usage.prompt_tokens, usage.completion_tokens, kind),
        },
    })
}

fn parse_embeddings_response(text: &str, model: &str, kind: ProviderKind) -> ProviderResult<EmbeddingResponse> {
    let mut response: EmbeddingsResponse = serde_json::from_str(text)
        .map_err(|e| ProviderError::InvalidFormat(format!("embedding response: {}", e)))?;
    response.data.sort_by_key(|d| d.index);

    let input_tokens = response.usage.prompt_tokens;
    Ok(EmbeddingResponse {
        vectors: response.data.into_iter().map(|d| d.embedding).collect(),
        usage: TokenUsage {
            input_tokens,
            output_tokens: 0,
            reasoning_tokens: 0,
            total_cost_usd: calculate_cost(model, input_tokens, 0, kind),
        },
    })
}

impl LlmProvider for OpenAiClient {
    fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> ProviderResult<LlmResponse> {
        let body = chat_request_body(&self.settings.model, prompt, system_prompt);
        let text = self.post("chat/completions", &body)?;
        let response = parse_chat_response(&text, &self.settings.model, self.settings.kind)?;
        log::debug!(
            "Completion: {} input / {} output tokens, ${:.6}",
            response.usage.input_tokens,
            response.usage.output_tokens,
            response.usage.total_cost_usd
        );
        Ok(response)
    }
}

impl EmbeddingProvider for OpenAiClient {
    fn embed(&self, texts: &[String]) -> ProviderResult<EmbeddingResponse> {
        let body = json!({"model": self.settings.model, "input": texts});
        let text = self.post("embeddings", &body)?;
        parse_embeddings_response(&text, &self.settings.model, self.settings.kind)
    }
}
