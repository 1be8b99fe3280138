//! Data model (spec.md §3). Row-level `created_at`/`updated_at` are
//! `DateTime<Utc>` on every entity, matching the teacher's convention of
//! timestamping every persisted row even where not explicitly required.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    UrlWeb,
    UrlVideo,
    Forward,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Ok,
    Error,
}

impl RequestStatus {
    /// Monotonic transition table (spec.md §3): forward-only, except
    /// `error -> error` which is allowed (repeated failure recording).
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, next) {
            (Pending, Processing) | (Pending, Error) => true,
            (Processing, Ok) | (Processing, Error) => true,
            (Error, Error) => true,
            (same, next) if same == next => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub input_text: String,
    pub normalized_url: Option<String>,
    pub dedupe_hash: Option<String>,
    pub lang_detected: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl Request {
    pub fn new(kind: RequestKind, input_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            status: RequestStatus::Pending,
            input_text: input_text.into(),
            normalized_url: None,
            dedupe_hash: None,
            lang_detected: None,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub request_id: Uuid,
    pub source_url: String,
    pub http_status: Option<u16>,
    pub status: CrawlStatus,
    pub markdown: String,
    pub html: Option<String>,
    pub structured: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub links: Vec<String>,
    pub latency_ms: u64,
    pub error_text: Option<String>,
    pub raw_payload: Option<serde_json::Value>,
    pub source: CrawlSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrawlSource {
    Scraper,
    Salvage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoArtifactStatus {
    Pending,
    Downloading,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    ApiManual,
    ApiAuto,
    VttFallback,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub request_id: Uuid,
    pub video_id: String,
    pub status: VideoArtifactStatus,
    pub video_path: Option<String>,
    pub subtitle_path: Option<String>,
    pub metadata_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub duration_seconds: Option<u64>,
    pub resolution: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_source: TranscriptSource,
    pub subtitle_language: Option<String>,
    pub auto_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl VideoArtifact {
    /// spec.md §3 invariant: a completed artifact has a non-empty transcript
    /// or an explicit `none` source.
    pub fn satisfies_transcript_invariant(&self) -> bool {
        if self.status != VideoArtifactStatus::Completed {
            return true;
        }
        match self.transcript_source {
            TranscriptSource::None => true,
            _ => self
                .transcript_text
                .as_ref()
                .is_some_and(|t| !t.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    SchemaStrict,
    SchemaRelaxed,
    JsonObjectGuardrail,
    JsonObjectFallback,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::SchemaStrict => "schema_strict",
            Preset::SchemaRelaxed => "schema_relaxed",
            Preset::JsonObjectGuardrail => "json_object_guardrail",
            Preset::JsonObjectFallback => "json_object_fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmCallStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCall {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider: String,
    pub model: String,
    pub preset: Preset,
    pub attempt_index: u32,
    pub request_messages: serde_json::Value,
    pub response_text: Option<String>,
    pub response_object: Option<serde_json::Value>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cost_estimate: Option<f64>,
    pub latency_ms: u64,
    pub status: LlmCallStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub request_id: Uuid,
    pub lang: String,
    pub json_payload: serde_json::Value,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStat {
    pub label: String,
    pub value: String,
    pub unit: Option<String>,
    pub source_excerpt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    pub people: Vec<String>,
    pub organizations: Vec<String>,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readability {
    pub method: String,
    pub score: f64,
    pub level: String,
}

/// The typed contract payload (spec.md §4.7), parsed/validated by
/// [`crate::contract`] before being wrapped in a [`Summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub summary_250: String,
    pub summary_1000: String,
    pub tldr: String,
    pub key_ideas: Vec<String>,
    pub topic_tags: Vec<String>,
    pub entities: Entities,
    pub estimated_reading_time_min: u32,
    #[serde(default)]
    pub key_stats: Vec<KeyStat>,
    #[serde(default)]
    pub answered_questions: Vec<String>,
    pub readability: Readability,
    pub seo_keywords: Vec<String>,
}
