//! Summarization agent (C8, spec.md §4.8). Couples the chunker, LLM
//! cascade, and contract validator into a bounded self-correction loop:
//! validation errors from one attempt become structured feedback for the
//! next, and two identical responses in a row abort early rather than
//! burn a third call on a model that's stopped listening.

use sha2::{Digest, Sha256};

use crate::contract::{self, FieldError};
use crate::error::{LlmErrorKind, SummarizerError};
use crate::llm::{run_cascade, AttemptRecord, CascadeConfig, ChatMessage, LlmClient};
use crate::models::{Preset, SummaryPayload};

const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub payload: SummaryPayload,
    pub provider: String,
    pub model: String,
    pub preset: Preset,
    pub attempt_count: u32,
    /// Every model/preset attempt made across the whole self-correction
    /// loop, successes and failures alike, in call order.
    pub attempts: Vec<AttemptRecord>,
}

/// The self-correction loop exhausted its retries (or gave up early on
/// repeated identical feedback) without ever producing a valid payload.
/// `attempts` still carries every `LlmCall` made along the way so the
/// caller can persist the full record even though summarization failed.
#[derive(Debug)]
pub struct AgentFailure {
    pub error: SummarizerError,
    pub attempts: Vec<AttemptRecord>,
}

/// Build the system+user message pair for one attempt, folding in the
/// previous attempt's validation errors as structured feedback when present.
fn build_messages(content: &str, metadata_header: &str, last_errors: &[FieldError]) -> Vec<ChatMessage> {
    let system = ChatMessage {
        role: "system".to_string(),
        content: "You produce a single JSON object matching the summary contract. \
            Fix every listed validation error exactly; do not introduce new ones."
            .to_string(),
    };

    let mut user_content = format!("{metadata_header}\n\n{content}");
    if !last_errors.is_empty() {
        let feedback = last_errors
            .iter()
            .map(|e| format!("- {}: {}", e.field, e.reason))
            .collect::<Vec<_>>()
            .join("\n");
        user_content = format!("{user_content}\n\nThe previous attempt failed validation:\n{feedback}");
    }

    vec![
        system,
        ChatMessage {
            role: "user".to_string(),
            content: user_content,
        },
    ]
}

fn fingerprint(payload: &SummaryPayload) -> Result<String, SummarizerError> {
    let canonical = serde_json::to_vec(payload)
        .map_err(|e| SummarizerError::internal(format!("failed to canonicalize payload for fingerprinting: {e}"), None))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Parse the raw LLM response into the summary contract shape. Goes through
/// `serde_json::Value` first so `contract::coerce_stringified_numbers` gets
/// a chance to fix up numeric fields the model returned as strings before
/// the strict typed deserialize would otherwise reject them outright.
fn parse_contract_payload(raw_text: &str) -> Result<SummaryPayload, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_str(raw_text)?;
    contract::coerce_stringified_numbers(&mut value);
    serde_json::from_value(value)
}

/// Run the self-correction loop described in spec.md §4.8's pseudocode.
pub async fn summarize(
    client: &dyn LlmClient,
    cascade_config: &CascadeConfig,
    content: &str,
    metadata_header: &str,
    estimated_tokens: u32,
    agent_config: &AgentConfig,
) -> Result<AgentOutcome, AgentFailure> {
    let mut attempt: u32 = 1;
    let mut previous_fingerprint: Option<String> = None;
    let mut last_errors: Vec<FieldError> = Vec::new();
    let mut final_error: Option<SummarizerError> = None;
    let mut attempts: Vec<AttemptRecord> = Vec::new();

    while attempt <= agent_config.max_retries {
        let messages = build_messages(content, metadata_header, &last_errors);
        let cascade_outcome = match run_cascade(client, &messages, estimated_tokens, cascade_config).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                attempts.extend(failure.attempts);
                return Err(AgentFailure { error: failure.error, attempts });
            }
        };
        attempts.extend(cascade_outcome.attempts.clone());

        let mut payload: SummaryPayload = match parse_contract_payload(&cascade_outcome.response.raw_text) {
            Ok(parsed) => parsed,
            Err(parse_err) => {
                last_errors = vec![FieldError {
                    field: "$".to_string(),
                    reason: format!("response was not valid JSON for the contract shape: {parse_err}"),
                }];
                final_error = Some(SummarizerError::llm(LlmErrorKind::StructuredParse, parse_err.to_string()));
                attempt += 1;
                continue;
            }
        };

        contract::repair(&mut payload);
        let errors = contract::validate(&payload);

        if errors.is_empty() {
            return Ok(AgentOutcome {
                payload,
                provider: cascade_outcome.provider,
                model: cascade_outcome.model,
                preset: cascade_outcome.preset,
                attempt_count: attempt,
                attempts,
            });
        }

        let fp = match fingerprint(&payload) {
            Ok(fp) => fp,
            Err(e) => return Err(AgentFailure { error: e, attempts }),
        };
        if attempt >= 2 && previous_fingerprint.as_deref() == Some(fp.as_str()) {
            return Err(AgentFailure {
                error: SummarizerError::llm(
                    LlmErrorKind::FeedbackIneffective,
                    "model returned an identical response after structured feedback; aborting self-correction",
                ),
                attempts,
            });
        }
        previous_fingerprint = Some(fp);

        final_error = Some(SummarizerError::llm(
            LlmErrorKind::StructuredParse,
            errors.iter().map(|e| format!("{}: {}", e.field, e.reason)).collect::<Vec<_>>().join("; "),
        ));
        last_errors = errors;
        attempt += 1;
    }

    Err(AgentFailure {
        error: final_error.unwrap_or_else(|| {
            SummarizerError::llm(LlmErrorKind::AllAttemptsFailed, "self-correction loop exhausted with no recorded error")
        }),
        attempts,
    })
}
