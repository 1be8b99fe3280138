//! `LlmClient` trait and the `OpenAiCompatibleClient` implementation:
//! one `reqwest::Client` per provider, lazily built and cached, all network
//! calls routed through `summarizer_core::retry_with_backoff`.
//!
//! Grounded in the teacher's `TMDbClient` (`reqwest::Client` held by value,
//! one POST per call, JSON body parsed into a typed response,
//! `error_for_status` used to distinguish transport failure from an
//! application-level non-2xx) from `crates/ingestion/src/aggregator/tmdb.rs`.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use summarizer_core::{retry_with_backoff, RetryPolicy};

use crate::error::{LlmErrorKind, SummarizerError};
use crate::rate_limit::RateLimitManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Structured output bound to a named JSON schema.
    JsonSchema,
    /// Generic `{"type": "json_object"}` mode, no schema enforcement.
    JsonObject,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub raw_text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub latency_ms: u64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, provider: &str, request: &LlmRequest) -> Result<LlmResponse, SummarizerError>;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

/// An OpenAI-chat-completions-compatible client, one `reqwest::Client`
/// built lazily per provider name and reused across calls.
pub struct OpenAiCompatibleClient {
    providers: HashMap<String, ProviderConfig>,
    clients: RwLock<HashMap<String, Arc<OnceCell<reqwest::Client>>>>,
    call_timeout: Duration,
    rate_limiter: Arc<RateLimitManager>,
}

impl OpenAiCompatibleClient {
    pub fn new(providers: HashMap<String, ProviderConfig>, call_timeout: Duration, rate_limiter: Arc<RateLimitManager>) -> Self {
        Self {
            providers,
            clients: RwLock::new(HashMap::new()),
            call_timeout,
            rate_limiter,
        }
    }

    async fn client_for(&self, provider: &str) -> Result<reqwest::Client, SummarizerError> {
        let cell = {
            let clients = self.clients.read().await;
            clients.get(provider).cloned()
        };
        let cell = match cell {
            Some(cell) => cell,
            None => {
                let mut clients = self.clients.write().await;
                clients
                    .entry(provider.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            }
        };

        let client = cell.get_or_try_init(|| {
            reqwest::Client::builder()
                .timeout(self.call_timeout)
                .build()
                .map_err(|e| SummarizerError::internal(format!("failed to build http client: {e}"), None))
        })?;

        Ok(client.clone())
    }
}

#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, provider: &str, request: &LlmRequest) -> Result<LlmResponse, SummarizerError> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| SummarizerError::internal(format!("unknown llm provider '{provider}'"), None))?
            .clone();
        let client = self.client_for(provider).await?;

        let service = format!("llm:{provider}");
        self.rate_limiter.acquire(&service).await;

        let response_format = match request.response_format {
            ResponseFormat::JsonSchema => Some(serde_json::json!({"type": "json_schema"})),
            ResponseFormat::JsonObject => Some(serde_json::json!({"type": "json_object"})),
        };

        let policy = RetryPolicy::new(3, 500, 5000, true);
        let endpoint = format!("{}/chat/completions", config.base_url);
        let api_key = config.api_key.clone();
        let model = request.model.clone();
        let messages = request.messages.clone();
        let temperature = request.temperature;
        let top_p = request.top_p;

        let started = std::time::Instant::now();
        let result = retry_with_backoff(
            || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let api_key = api_key.clone();
                let model = model.clone();
                let messages = messages.clone();
                let response_format = response_format.clone();
                async move {
                    let payload = CompletionPayload {
                        model: &model,
                        messages: &messages,
                        temperature,
                        top_p,
                        response_format,
                    };
                    send_completion(&client, &endpoint, &api_key, &payload).await
                }
            },
            policy,
            |err: &SummarizerError| err.is_retryable(),
        )
        .await;

        if let Err(SummarizerError::Llm { kind: LlmErrorKind::RateLimited, .. }) = &result {
            self.rate_limiter.note_rate_limited(&service, None).await;
        }
        let result = result?;

        Ok(LlmResponse {
            raw_text: result.0,
            prompt_tokens: result.1,
            completion_tokens: result.2,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

async fn send_completion(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    payload: &CompletionPayload<'_>,
) -> Result<(String, Option<u32>, Option<u32>), SummarizerError> {
    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(payload)
        .send()
        .await
        .map_err(|e| SummarizerError::llm(LlmErrorKind::ServerError, e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(SummarizerError::llm(LlmErrorKind::RateLimited, "provider returned 429"));
    }
    if status.is_server_error() {
        return Err(SummarizerError::llm(LlmErrorKind::ServerError, format!("provider returned {status}")));
    }
    if !status.is_success() {
        return Err(SummarizerError::llm(LlmErrorKind::EmptyResponse, format!("provider returned {status}")));
    }

    let parsed: CompletionResponse = response
        .json()
        .await
        .map_err(|e| SummarizerError::llm(LlmErrorKind::StructuredParse, format!("malformed completion envelope: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(SummarizerError::llm(LlmErrorKind::EmptyResponse, "provider returned empty content"));
    }

    let (prompt_tokens, completion_tokens) = parsed
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((None, None));

    Ok((content, prompt_tokens, completion_tokens))
}

/// Strip the `Authorization` header's value before a request envelope is
/// persisted (spec.md §4.6). The body itself is kept in full.
pub fn redact_authorization(mut headers: serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    if headers.contains_key("Authorization") || headers.contains_key("authorization") {
        headers.insert("Authorization".to_string(), Value::String("[redacted]".to_string()));
        headers.remove("authorization");
    }
    headers
}
