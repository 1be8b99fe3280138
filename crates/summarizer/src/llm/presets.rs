//! Preset and model cascade (spec.md §4.6). For the primary model, run the
//! three-preset ladder (`schema_strict` → `schema_relaxed` →
//! `json_object_guardrail`); each configured fallback model gets exactly one
//! attempt under `json_object_fallback`. An empty or unparseable response
//! is a failed attempt that advances the cursor; the final error names
//! every `(model, preset)` combination tried.

use crate::error::{LlmErrorKind, SummarizerError};
use crate::models::Preset;

use super::client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, ResponseFormat};

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
    pub window_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub primary: ModelSpec,
    pub fallbacks: Vec<ModelSpec>,
    pub long_context_model: ModelSpec,
    pub base_temperature: f32,
    pub base_top_p: f32,
    pub relaxed_temperature: f32,
    pub relaxed_top_p: f32,
    pub guardrail_temperature: f32,
    pub guardrail_top_p: f32,
}

/// One model/preset attempt, successful or not, with everything needed to
/// persist it as its own `LlmCall` row (spec.md §3: every attempt, including
/// failures, is recorded).
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider: String,
    pub model: String,
    pub preset: Preset,
    pub request_messages: Vec<ChatMessage>,
    pub response_text: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub response: LlmResponse,
    pub provider: String,
    pub model: String,
    pub preset: Preset,
    /// Every attempt made this cascade, in order, the successful one last.
    pub attempts: Vec<AttemptRecord>,
}

/// The cascade exhausted every model/preset combination without a usable
/// response. `attempts` carries the full history so the caller can still
/// persist every failed `LlmCall` row even though the overall call failed.
#[derive(Debug)]
pub struct CascadeFailure {
    pub error: SummarizerError,
    pub attempts: Vec<AttemptRecord>,
}

struct PresetStep {
    preset: Preset,
    temperature: f32,
    top_p: f32,
    format: ResponseFormat,
}

fn primary_ladder(config: &CascadeConfig) -> Vec<PresetStep> {
    vec![
        PresetStep {
            preset: Preset::SchemaStrict,
            temperature: config.base_temperature,
            top_p: config.base_top_p,
            format: ResponseFormat::JsonSchema,
        },
        PresetStep {
            preset: Preset::SchemaRelaxed,
            temperature: config.relaxed_temperature,
            top_p: config.relaxed_top_p,
            format: ResponseFormat::JsonSchema,
        },
        PresetStep {
            preset: Preset::JsonObjectGuardrail,
            temperature: config.guardrail_temperature,
            top_p: config.guardrail_top_p,
            format: ResponseFormat::JsonObject,
        },
    ]
}

fn fallback_step(config: &CascadeConfig) -> PresetStep {
    PresetStep {
        preset: Preset::JsonObjectFallback,
        temperature: config.guardrail_temperature,
        top_p: config.guardrail_top_p,
        format: ResponseFormat::JsonObject,
    }
}

/// Run the full model/preset cascade. `is_acceptable` decides whether a raw
/// response counts as a usable attempt (parse + contract validation live in
/// the agent loop above this; here we only gate on "non-empty").
pub async fn run_cascade(
    client: &dyn LlmClient,
    messages: &[ChatMessage],
    estimated_tokens: u32,
    config: &CascadeConfig,
) -> Result<CascadeOutcome, CascadeFailure> {
    let mut attempts = Vec::new();

    if estimated_tokens > config.primary.window_tokens {
        attempts.push(AttemptRecord {
            provider: config.primary.provider.clone(),
            model: config.primary.model.clone(),
            preset: Preset::SchemaStrict,
            request_messages: messages.to_vec(),
            response_text: None,
            prompt_tokens: None,
            completion_tokens: None,
            latency_ms: 0,
            error: Some(format!(
                "skipped: input ~{estimated_tokens} tokens exceeds primary window {}",
                config.primary.window_tokens
            )),
        });
        return run_model(client, &config.long_context_model, messages, &[fallback_step(config)], &mut attempts)
            .await
            .map_err(|_| exhausted(attempts));
    }

    if let Ok(outcome) = run_model(client, &config.primary, messages, &primary_ladder(config), &mut attempts).await {
        return Ok(outcome);
    }

    for fallback in &config.fallbacks {
        if let Ok(outcome) = run_model(client, fallback, messages, std::slice::from_ref(&fallback_step(config)), &mut attempts).await {
            return Ok(outcome);
        }
    }

    Err(exhausted(attempts))
}

async fn run_model(
    client: &dyn LlmClient,
    spec: &ModelSpec,
    messages: &[ChatMessage],
    steps: &[PresetStep],
    attempts: &mut Vec<AttemptRecord>,
) -> Result<CascadeOutcome, ()> {
    for step in steps {
        let request = LlmRequest {
            model: spec.model.clone(),
            messages: messages.to_vec(),
            temperature: step.temperature,
            top_p: step.top_p,
            response_format: step.format,
        };

        match client.complete(&spec.provider, &request).await {
            Ok(response) if !response.raw_text.trim().is_empty() => {
                attempts.push(AttemptRecord {
                    provider: spec.provider.clone(),
                    model: spec.model.clone(),
                    preset: step.preset,
                    request_messages: messages.to_vec(),
                    response_text: Some(response.raw_text.clone()),
                    prompt_tokens: response.prompt_tokens,
                    completion_tokens: response.completion_tokens,
                    latency_ms: response.latency_ms,
                    error: None,
                });
                return Ok(CascadeOutcome {
                    response,
                    provider: spec.provider.clone(),
                    model: spec.model.clone(),
                    preset: step.preset,
                    attempts: attempts.clone(),
                });
            }
            Ok(response) => attempts.push(AttemptRecord {
                provider: spec.provider.clone(),
                model: spec.model.clone(),
                preset: step.preset,
                request_messages: messages.to_vec(),
                response_text: Some(response.raw_text.clone()),
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
                latency_ms: response.latency_ms,
                error: Some("empty response".to_string()),
            }),
            Err(err) => attempts.push(AttemptRecord {
                provider: spec.provider.clone(),
                model: spec.model.clone(),
                preset: step.preset,
                request_messages: messages.to_vec(),
                response_text: None,
                prompt_tokens: None,
                completion_tokens: None,
                latency_ms: 0,
                error: Some(err.to_string()),
            }),
        }
    }
    Err(())
}

fn exhausted(attempts: Vec<AttemptRecord>) -> CascadeFailure {
    let summary = attempts
        .iter()
        .map(|a| format!("{}/{}{}", a.model, a.preset.as_str(), a.error.as_ref().map(|e| format!(" ({e})")).unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(", ");
    CascadeFailure {
        error: SummarizerError::llm(LlmErrorKind::AllAttemptsFailed, format!("all attempts exhausted: {summary}")),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        responses: Vec<Result<&'static str, LlmErrorKind>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _provider: &str, _request: &LlmRequest) -> Result<LlmResponse, SummarizerError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(idx).cloned().unwrap_or(Err(LlmErrorKind::EmptyResponse)) {
                Ok(text) => Ok(LlmResponse {
                    raw_text: text.to_string(),
                    prompt_tokens: Some(1),
                    completion_tokens: Some(1),
                    latency_ms: 1,
                }),
                Err(kind) => Err(SummarizerError::llm(kind, "scripted failure")),
            }
        }
    }

    fn config() -> CascadeConfig {
        CascadeConfig {
            primary: ModelSpec {
                provider: "primary".to_string(),
                model: "gpt-primary".to_string(),
                window_tokens: 100_000,
            },
            fallbacks: vec![ModelSpec {
                provider: "fallback".to_string(),
                model: "gpt-fallback".to_string(),
                window_tokens: 100_000,
            }],
            long_context_model: ModelSpec {
                provider: "long".to_string(),
                model: "gpt-long".to_string(),
                window_tokens: 1_000_000,
            },
            base_temperature: 0.2,
            base_top_p: 0.9,
            relaxed_temperature: 0.5,
            relaxed_top_p: 0.95,
            guardrail_temperature: 0.1,
            guardrail_top_p: 0.8,
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user".to_string(),
            content: "summarize this".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_succeeds_on_first_preset() {
        let client = ScriptedClient {
            responses: vec![Ok("{}")],
            calls: AtomicUsize::new(0),
        };
        let outcome = run_cascade(&client, &messages(), 10, &config()).await.unwrap();
        assert_eq!(outcome.model, "gpt-primary");
        assert_eq!(outcome.preset, Preset::SchemaStrict);
        // the successful attempt itself is recorded too, so every LlmCall
        // row (success and failure alike) has a source attempt.
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].error.is_none());
    }

    #[tokio::test]
    async fn test_falls_through_preset_ladder_before_fallback_model() {
        let client = ScriptedClient {
            responses: vec![Err(LlmErrorKind::StructuredParse), Err(LlmErrorKind::StructuredParse), Ok("{}")],
            calls: AtomicUsize::new(0),
        };
        let outcome = run_cascade(&client, &messages(), 10, &config()).await.unwrap();
        assert_eq!(outcome.model, "gpt-primary");
        assert_eq!(outcome.preset, Preset::JsonObjectGuardrail);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(outcome.attempts.iter().filter(|a| a.error.is_some()).count(), 2);
    }

    #[tokio::test]
    async fn test_falls_through_to_fallback_model() {
        let client = ScriptedClient {
            responses: vec![
                Err(LlmErrorKind::StructuredParse),
                Err(LlmErrorKind::StructuredParse),
                Err(LlmErrorKind::StructuredParse),
                Ok("{}"),
            ],
            calls: AtomicUsize::new(0),
        };
        let outcome = run_cascade(&client, &messages(), 10, &config()).await.unwrap();
        assert_eq!(outcome.model, "gpt-fallback");
        assert_eq!(outcome.preset, Preset::JsonObjectFallback);
        assert_eq!(outcome.attempts.len(), 4);
        assert_eq!(outcome.attempts.iter().filter(|a| a.error.is_some()).count(), 3);
    }

    #[tokio::test]
    async fn test_long_context_input_skips_straight_to_long_context_model() {
        let client = ScriptedClient {
            responses: vec![Ok("{}")],
            calls: AtomicUsize::new(0),
        };
        let outcome = run_cascade(&client, &messages(), 500_000, &config()).await.unwrap();
        assert_eq!(outcome.model, "gpt-long");
        // one recorded "skipped" attempt explaining why primary wasn't tried,
        // plus the successful attempt against the long-context model.
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts[0].error.as_ref().unwrap().contains("skipped"));
        assert!(outcome.attempts[1].error.is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_attempted_combination() {
        let client = ScriptedClient {
            responses: vec![
                Err(LlmErrorKind::StructuredParse),
                Err(LlmErrorKind::StructuredParse),
                Err(LlmErrorKind::StructuredParse),
                Err(LlmErrorKind::StructuredParse),
            ],
            calls: AtomicUsize::new(0),
        };
        let failure = run_cascade(&client, &messages(), 10, &config()).await.unwrap_err();
        let message = failure.error.to_string();
        assert!(message.contains("gpt-primary"));
        assert!(message.contains("gpt-fallback"));
        assert_eq!(failure.attempts.len(), 4);
    }
}
