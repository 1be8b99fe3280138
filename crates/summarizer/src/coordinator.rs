//! Pipeline coordinator (C10, spec.md §4.10). Drives one submission from
//! raw input text through to a stored summary: canonicalize, dedupe lock,
//! dedupe lookup, request creation, extraction, summarization, and the
//! final status/summary write, with a completion audit event on every exit
//! path. Free text carrying more than one URL fans out across the batch
//! orchestrator (C9); a single URL or a URL-less forward runs inline.
//!
//! Grounded in `crates/ingestion/src/pipeline.rs`'s `IngestionPipeline` for
//! the `Arc`-composed, `Clone`-cheap coordinator shape that owns every
//! upstream component by trait object.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use summarizer_core::{AuditAction, AuditEvent, AuditLogger};

use crate::agent::{self, AgentConfig, AgentOutcome};
use crate::canonicalizer::{self, CanonicalUrl, UrlCanonicalizer};
use crate::chunker::{estimate_tokens, ChunkPlan, Chunker, ChunkerConfig};
use crate::error::{Result, SummarizerError};
use crate::extractor::ContentExtractor;
use crate::llm::{redact_authorization, AttemptRecord, CascadeConfig, ChatMessage, LlmClient};
use crate::lock::{LockError, LockManager};
use crate::models::{LlmCall, LlmCallStatus, Request, RequestKind, RequestStatus, Summary};
use crate::orchestrator::{BatchOrchestrator, OrchestratorConfig, ProgressSink, Submission};
use crate::store::RequestStore;

/// Rough token overhead for the system prompt + contract schema, folded
/// into the chunker's routing decision alongside the content itself.
const PROMPT_OVERHEAD_TOKENS: usize = 800;
const DEFAULT_LOCK_TTL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub lock_ttl: Duration,
    pub agent_config: AgentConfig,
    pub chunker_config: ChunkerConfig,
    pub cascade_config: CascadeConfig,
}

impl CoordinatorConfig {
    pub fn new(cascade_config: CascadeConfig) -> Self {
        Self {
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            agent_config: AgentConfig::default(),
            chunker_config: ChunkerConfig::default(),
            cascade_config,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollStatus {
    pub status: RequestStatus,
    pub error: Option<String>,
}

enum SubmissionInput {
    Url(CanonicalUrl),
    Forward(String),
}

#[derive(Clone)]
pub struct PipelineCoordinator {
    store: Arc<dyn RequestStore>,
    lock_manager: Arc<LockManager>,
    extractor: Arc<ContentExtractor>,
    llm_client: Arc<dyn LlmClient>,
    audit: Arc<dyn AuditLogger>,
    config: Arc<CoordinatorConfig>,
}

impl PipelineCoordinator {
    pub fn new(
        store: Arc<dyn RequestStore>,
        lock_manager: Arc<LockManager>,
        extractor: Arc<ContentExtractor>,
        llm_client: Arc<dyn LlmClient>,
        audit: Arc<dyn AuditLogger>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            lock_manager,
            extractor,
            llm_client,
            audit,
            config: Arc::new(config),
        }
    }

    /// A single already-identified URL. Returns the correlation ID
    /// (equal to the request ID) once the pipeline has finished, whether
    /// it succeeded or recorded a taxonomy error.
    pub async fn submit_url(&self, url: &str, user_id: &str) -> Result<Uuid> {
        let canonical = UrlCanonicalizer::new()
            .canonicalize_one(url)
            .map_err(|reason| SummarizerError::validation(reason.to_string()))?;
        self.process_submission(SubmissionInput::Url(canonical), user_id).await
    }

    /// Free text that may carry zero, one, or many URLs (spec.md §4.10
    /// step 1). Zero URLs is itself a valid submission: the forwarded text
    /// is summarized directly. More than one URL fans each out as its own
    /// submission through the batch orchestrator.
    pub async fn submit_forward(&self, text: &str, user_id: &str) -> Result<Vec<Uuid>> {
        let report = UrlCanonicalizer::new().extract_and_canonicalize(text);

        if report.urls.is_empty() {
            let id = self
                .process_submission(SubmissionInput::Forward(text.to_string()), user_id)
                .await?;
            return Ok(vec![id]);
        }

        if report.urls.len() == 1 {
            let id = self
                .process_submission(SubmissionInput::Url(report.urls.into_iter().next().unwrap()), user_id)
                .await?;
            return Ok(vec![id]);
        }

        self.process_batch(report.urls, user_id).await
    }

    pub async fn poll_status(&self, correlation_id: Uuid) -> Result<PollStatus> {
        let request = self
            .store
            .get(correlation_id)
            .await?
            .ok_or_else(|| SummarizerError::validation("unknown correlation id"))?;
        Ok(PollStatus {
            status: request.status,
            error: request.error,
        })
    }

    pub async fn fetch_summary(&self, correlation_id: Uuid) -> Result<Summary> {
        self.store
            .get_summary(correlation_id)
            .await?
            .ok_or_else(|| SummarizerError::validation("summary not available for this correlation id"))
    }

    async fn process_batch(&self, urls: Vec<CanonicalUrl>, user_id: &str) -> Result<Vec<Uuid>> {
        let orchestrator = BatchOrchestrator::new(OrchestratorConfig::default());
        let cancelled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let progress: Arc<dyn ProgressSink> = Arc::new(NoopProgress);

        let submission_ids: Arc<tokio::sync::Mutex<Vec<Uuid>>> = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let submissions: Vec<Submission> = urls
            .iter()
            .map(|u| Submission {
                id: Uuid::new_v4(),
                url: u.normalized.clone(),
                user_id: user_id.to_string(),
            })
            .collect();
        let by_url: std::collections::HashMap<String, CanonicalUrl> =
            urls.into_iter().map(|u| (u.normalized.clone(), u)).collect();

        let coordinator = self.clone();
        let collected = submission_ids.clone();
        let user_id_owned = user_id.to_string();

        orchestrator
            .run_batch(submissions, cancelled, progress, move |submission| {
                let coordinator = coordinator.clone();
                let collected = collected.clone();
                let user_id = user_id_owned.clone();
                let canonical = by_url.get(&submission.url).cloned();
                async move {
                    let canonical = canonical.ok_or_else(|| {
                        SummarizerError::internal("submission url missing from canonical set", None)
                    })?;
                    let id = coordinator
                        .process_submission(SubmissionInput::Url(canonical), &user_id)
                        .await?;
                    collected.lock().await.push(id);
                    Ok(())
                }
            })
            .await;

        Ok(Arc::try_unwrap(submission_ids)
            .map(|m| m.into_inner())
            .unwrap_or_default())
    }

    async fn process_submission(&self, input: SubmissionInput, user_id: &str) -> Result<Uuid> {
        let (kind, input_text, canonical) = match input {
            SubmissionInput::Url(canonical) => (canonical.kind, canonical.normalized.clone(), Some(canonical)),
            SubmissionInput::Forward(text) => (RequestKind::Forward, text, None),
        };
        let dedupe_hash = canonicalizer::dedupe_hash(&input_text);
        let lock_key = format!("dedupe:{dedupe_hash}");

        let handle = self.lock_manager.acquire(&lock_key, self.config.lock_ttl).await.map_err(|e| match e {
            LockError::Held { key } => SummarizerError::LockHeld { key },
            LockError::BackendUnavailable(msg) => {
                SummarizerError::internal(format!("lock backend unavailable: {msg}"), None)
            }
        })?;
        let lock_degraded = handle.is_degraded();

        let result = self.process_locked(kind, &input_text, &dedupe_hash, canonical.as_ref(), user_id, lock_degraded).await;

        let _ = self.lock_manager.release(&lock_key, handle).await;

        result
    }

    async fn process_locked(
        &self,
        kind: RequestKind,
        input_text: &str,
        dedupe_hash: &str,
        canonical: Option<&CanonicalUrl>,
        user_id: &str,
        lock_degraded: bool,
    ) -> Result<Uuid> {
        if let Some(existing) = self.store.get_by_dedupe(dedupe_hash).await? {
            if matches!(existing.status, RequestStatus::Ok | RequestStatus::Error) {
                self.emit_audit(existing.id, AuditAction::Reused, serde_json::json!({ "user_id": user_id })).await;
                return Ok(existing.id);
            }
        }

        let request = self
            .store
            .create_request(kind, input_text, canonical.map(|c| c.normalized.as_str()), Some(dedupe_hash))
            .await?;
        let correlation_id = request.id;
        self.emit_audit(correlation_id, AuditAction::Created, serde_json::json!({ "user_id": user_id, "kind": format!("{kind:?}") })).await;
        if lock_degraded {
            self.emit_audit(
                correlation_id,
                AuditAction::DegradedMode,
                serde_json::json!({ "component": "dedupe_lock", "reason": "primary lock backend unreachable" }),
            )
            .await;
        }

        match self.run_pipeline(&request, canonical).await {
            Ok(()) => {
                self.emit_audit(correlation_id, AuditAction::Completed, serde_json::json!({})).await;
                Ok(correlation_id)
            }
            Err(err) => {
                let message = err.to_string();
                let _ = self
                    .store
                    .update_status(correlation_id, RequestStatus::Error, Some(message.as_str()))
                    .await;
                self.emit_audit(
                    correlation_id,
                    AuditAction::Error,
                    serde_json::json!({ "category": err.category(), "message": err.to_string() }),
                )
                .await;
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, request: &Request, canonical: Option<&CanonicalUrl>) -> Result<()> {
        let (content, metadata_header) = match canonical {
            Some(c) if c.kind == RequestKind::UrlVideo => {
                let video_id = UrlCanonicalizer::new()
                    .youtube_video_id(&c.normalized)
                    .ok_or_else(|| SummarizerError::validation("not a recognizable youtube video id"))?;
                let (mut artifact, content_for_llm) = self.extractor.extract_youtube(&video_id).await?;
                artifact.request_id = request.id;
                self.store.record_video(&artifact).await?;
                self.emit_audit(request.id, AuditAction::VideoRecorded, serde_json::json!({})).await;
                (content_for_llm, format!("YouTube video {video_id}"))
            }
            Some(c) => {
                let mut crawl = self.extractor.extract_web(&c.normalized).await?;
                crawl.request_id = request.id;
                let header = crawl
                    .metadata
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or(crawl.source_url.as_str())
                    .to_string();
                let content = crawl.markdown.clone();
                self.store.record_crawl(&crawl).await?;
                self.emit_audit(request.id, AuditAction::CrawlRecorded, serde_json::json!({})).await;
                (content, header)
            }
            None => (request.input_text.clone(), "Forwarded message".to_string()),
        };

        self.store.update_status(request.id, RequestStatus::Processing, None).await?;
        self.emit_audit(request.id, AuditAction::StatusChanged, serde_json::json!({ "status": "processing" })).await;

        let summary = match self.summarize_content(&content, &metadata_header).await {
            Ok(summary) => summary,
            Err(failure) => {
                self.record_llm_attempts(request.id, &failure.attempts).await;
                return Err(failure.error);
            }
        };
        self.record_llm_attempts(request.id, &summary.attempts).await;
        let outcome = summary.outcome;

        let payload = serde_json::to_value(&outcome.payload)
            .map_err(|e| SummarizerError::internal(format!("failed to encode summary payload: {e}"), Some(request.id)))?;
        self.store.upsert_summary(request.id, "en", payload).await?;
        self.emit_audit(request.id, AuditAction::SummaryWritten, serde_json::json!({ "model": outcome.model })).await;

        self.store.update_status(request.id, RequestStatus::Ok, None).await?;
        Ok(())
    }

    /// Runs the chunk plan's agent call(s), accumulating every `AttemptRecord`
    /// made along the way regardless of where the plan ultimately lands.
    async fn summarize_content(&self, content: &str, metadata_header: &str) -> std::result::Result<ContentSummary, SummarizeContentError> {
        let chunker = Chunker::new(self.config.chunker_config.clone());
        let prompt_overhead = estimate_tokens(metadata_header) + PROMPT_OVERHEAD_TOKENS;

        match chunker.plan(content, prompt_overhead) {
            ChunkPlan::Single => {
                let tokens = (estimate_tokens(content) + prompt_overhead) as u32;
                self.run_agent(content, metadata_header, tokens, Vec::new()).await
            }
            ChunkPlan::LongContext => {
                let forced_tokens = self.config.cascade_config.primary.window_tokens + 1;
                self.run_agent(content, metadata_header, forced_tokens, Vec::new()).await
            }
            ChunkPlan::Chunked { .. } => {
                let chunks = chunker.split(content, Some(metadata_header));
                let mut partial_notes = String::new();
                let mut attempts: Vec<AttemptRecord> = Vec::new();
                for chunk in &chunks {
                    let tokens = (chunk.approx_tokens + prompt_overhead) as u32;
                    let summary = self.run_agent(&chunk.text, metadata_header, tokens, attempts).await?;
                    attempts = summary.attempts;
                    partial_notes.push_str(&summary.outcome.payload.tldr);
                    partial_notes.push('\n');
                }
                let reduce_tokens = (estimate_tokens(&partial_notes) + prompt_overhead) as u32;
                self.run_agent(&partial_notes, metadata_header, reduce_tokens, attempts).await
            }
        }
    }

    /// Runs one `agent::summarize` call, folding its attempts onto `prior`
    /// whether the call itself succeeds or fails.
    async fn run_agent(
        &self,
        content: &str,
        metadata_header: &str,
        estimated_tokens: u32,
        mut prior: Vec<AttemptRecord>,
    ) -> std::result::Result<ContentSummary, SummarizeContentError> {
        match agent::summarize(
            self.llm_client.as_ref(),
            &self.config.cascade_config,
            content,
            metadata_header,
            estimated_tokens,
            &self.config.agent_config,
        )
        .await
        {
            Ok(outcome) => {
                prior.extend(outcome.attempts.clone());
                Ok(ContentSummary {
                    outcome,
                    attempts: prior,
                })
            }
            Err(failure) => {
                prior.extend(failure.attempts);
                Err(SummarizeContentError {
                    error: failure.error,
                    attempts: prior,
                })
            }
        }
    }

    /// Persists one `LlmCall` row per recorded attempt (spec.md §3: every
    /// attempt, including failures, is recorded), request headers redacted
    /// before the envelope is written.
    async fn record_llm_attempts(&self, request_id: Uuid, attempts: &[AttemptRecord]) {
        for (index, attempt) in attempts.iter().enumerate() {
            let call = LlmCall {
                id: Uuid::new_v4(),
                request_id,
                provider: attempt.provider.clone(),
                model: attempt.model.clone(),
                preset: attempt.preset,
                attempt_index: index as u32 + 1,
                request_messages: redacted_request_envelope(&attempt.request_messages),
                response_text: attempt.response_text.clone(),
                response_object: None,
                prompt_tokens: attempt.prompt_tokens,
                completion_tokens: attempt.completion_tokens,
                cost_estimate: None,
                latency_ms: attempt.latency_ms,
                status: if attempt.error.is_none() { LlmCallStatus::Ok } else { LlmCallStatus::Error },
                error: attempt.error.clone(),
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = self.store.record_llm_call(&call).await {
                tracing::warn!(error = %e, "failed to persist llm call record");
            } else {
                self.emit_audit(request_id, AuditAction::LlmCallRecorded, serde_json::json!({ "attempt_index": call.attempt_index })).await;
            }
        }
    }

    async fn emit_audit(&self, correlation_id: Uuid, action: AuditAction, details: serde_json::Value) {
        let sequence = self.audit.next_sequence();
        let event = AuditEvent::new(action, correlation_id, sequence).with_details(details);
        if let Err(e) = self.audit.log(event).await {
            tracing::warn!(error = %e, "failed to append audit event");
        }
    }
}

struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_submission_complete(&self, _result: &crate::orchestrator::SubmissionResult) {}
}

/// A finished `agent::summarize` outcome alongside every attempt made
/// across the whole chunk plan (not just the attempts of the final call).
struct ContentSummary {
    outcome: AgentOutcome,
    attempts: Vec<AttemptRecord>,
}

/// Mirrors `AgentFailure`, but carries every attempt made across the whole
/// chunk plan rather than just the one call that ultimately failed.
struct SummarizeContentError {
    error: SummarizerError,
    attempts: Vec<AttemptRecord>,
}

/// Builds the JSON envelope persisted alongside an `LlmCall` row: the
/// request messages plus a headers map with the `Authorization` value
/// stripped (spec.md §4.6) before anything touches the store.
fn redacted_request_envelope(messages: &[ChatMessage]) -> serde_json::Value {
    let mut headers = serde_json::Map::new();
    headers.insert("Authorization".to_string(), serde_json::Value::String("Bearer [redacted]".to_string()));
    let headers = redact_authorization(headers);
    serde_json::json!({
        "messages": messages,
        "headers": headers,
    })
}
