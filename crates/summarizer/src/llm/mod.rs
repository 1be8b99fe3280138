//! LLM client (C6, spec.md §4.6): structured-output calls against an
//! OpenAI-compatible completions endpoint, with a preset/model cascade and
//! a bounded per-network-call retry budget.

pub mod client;
pub mod presets;

pub use client::{redact_authorization, ChatMessage, LlmClient, LlmRequest, LlmResponse, OpenAiCompatibleClient, ProviderConfig};
pub use presets::{run_cascade, AttemptRecord, CascadeConfig, CascadeFailure, CascadeOutcome, ModelSpec};
