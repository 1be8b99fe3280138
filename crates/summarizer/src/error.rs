//! Error taxonomy for the summarization pipeline (spec.md §7).
//!
//! One enum, one `category()` mapping to the wire-level taxonomy string a
//! caller-facing reply uses, and `is_retryable()` for
//! `summarizer_core::retry::retry_with_backoff`'s predicate argument.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, SummarizerError>;

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("duplicate submission, existing request {existing_request_id}")]
    DedupeReuse { existing_request_id: Uuid },

    #[error("lock held for key '{key}'")]
    LockHeld { key: String },

    #[error("extraction failed: {kind}: {message}")]
    Extraction {
        kind: ExtractionErrorKind,
        message: String,
    },

    #[error("llm stage failed: {kind}: {message}")]
    Llm { kind: LlmErrorKind, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageErrorKind),

    #[error("operation cancelled (correlation_id={correlation_id})")]
    Cancelled { correlation_id: Uuid },

    #[error("internal error (correlation_id={correlation_id:?}): {message}")]
    Internal {
        message: String,
        correlation_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    AgeRestricted,
    GeoBlocked,
    PrivateOrRemoved,
    MembersOnly,
    ScheduledPremiere,
    RateLimited,
    TranscriptsDisabled,
    NetworkTimeout,
    QualityBelowThreshold,
    StorageFull,
}

impl std::fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionErrorKind::AgeRestricted => "age_restricted",
            ExtractionErrorKind::GeoBlocked => "geo_blocked",
            ExtractionErrorKind::PrivateOrRemoved => "private_or_removed",
            ExtractionErrorKind::MembersOnly => "members_only",
            ExtractionErrorKind::ScheduledPremiere => "scheduled_premiere",
            ExtractionErrorKind::RateLimited => "rate_limited",
            ExtractionErrorKind::TranscriptsDisabled => "transcripts_disabled",
            ExtractionErrorKind::NetworkTimeout => "network_timeout",
            ExtractionErrorKind::QualityBelowThreshold => "quality_below_threshold",
            ExtractionErrorKind::StorageFull => "storage_full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    StructuredParse,
    EmptyResponse,
    RateLimited,
    ServerError,
    AllAttemptsFailed,
    FeedbackIneffective,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl LlmErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmErrorKind::StructuredParse => "structured_parse",
            LlmErrorKind::EmptyResponse => "empty_response",
            LlmErrorKind::RateLimited => "rate_limited",
            LlmErrorKind::ServerError => "server_error",
            LlmErrorKind::AllAttemptsFailed => "all_attempts_failed",
            LlmErrorKind::FeedbackIneffective => "feedback_ineffective",
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    #[error("storage integrity violation")]
    Integrity,
    #[error("transaction failed")]
    TransactionFailed,
}

impl SummarizerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn extraction(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self::Extraction {
            kind,
            message: message.into(),
        }
    }

    pub fn llm(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self::Llm {
            kind,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>, correlation_id: Option<Uuid>) -> Self {
        Self::Internal {
            message: message.into(),
            correlation_id,
        }
    }

    /// The wire-level taxonomy string from spec.md §7.
    pub fn category(&self) -> &'static str {
        match self {
            SummarizerError::Validation { .. } => "validation",
            SummarizerError::DedupeReuse { .. } => "dedupe_reuse",
            SummarizerError::LockHeld { .. } => "lock_held",
            SummarizerError::Extraction { kind, .. } => match kind {
                ExtractionErrorKind::AgeRestricted => "extraction_age_restricted",
                ExtractionErrorKind::GeoBlocked => "extraction_geo_blocked",
                ExtractionErrorKind::PrivateOrRemoved => "extraction_private_or_removed",
                ExtractionErrorKind::MembersOnly => "extraction_members_only",
                ExtractionErrorKind::ScheduledPremiere => "extraction_premiere",
                ExtractionErrorKind::RateLimited => "extraction_rate_limited",
                ExtractionErrorKind::TranscriptsDisabled => "extraction_transcripts_disabled",
                ExtractionErrorKind::NetworkTimeout => "extraction_network_timeout",
                ExtractionErrorKind::QualityBelowThreshold => "extraction_quality_below_threshold",
                ExtractionErrorKind::StorageFull => "extraction_storage_full",
            },
            SummarizerError::Llm { kind, .. } => match kind {
                LlmErrorKind::StructuredParse => "llm_structured_parse",
                LlmErrorKind::EmptyResponse => "llm_empty_response",
                LlmErrorKind::RateLimited => "llm_rate_limited",
                LlmErrorKind::ServerError => "llm_server_error",
                LlmErrorKind::AllAttemptsFailed => "llm_all_attempts_failed",
                LlmErrorKind::FeedbackIneffective => "llm_feedback_ineffective",
            },
            SummarizerError::Storage(StorageErrorKind::Integrity) => "storage_integrity",
            SummarizerError::Storage(StorageErrorKind::TransactionFailed) => {
                "storage_transaction_failed"
            }
            SummarizerError::Cancelled { .. } => "cancelled",
            SummarizerError::Internal { .. } => "internal",
        }
    }

    /// Whether `retry_with_backoff` should retry this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SummarizerError::Extraction { kind, .. } => matches!(
                kind,
                ExtractionErrorKind::NetworkTimeout | ExtractionErrorKind::RateLimited
            ),
            SummarizerError::Llm { kind, .. } => matches!(
                kind,
                LlmErrorKind::RateLimited | LlmErrorKind::ServerError
            ),
            SummarizerError::Storage(StorageErrorKind::TransactionFailed) => true,
            _ => false,
        }
    }

    /// Whether a user-visible reply should carry `retry_possible=true`.
    pub fn retry_possible(&self) -> bool {
        self.is_retryable() || matches!(self, SummarizerError::LockHeld { .. })
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            SummarizerError::DedupeReuse { existing_request_id } => Some(*existing_request_id),
            SummarizerError::Cancelled { correlation_id } => Some(*correlation_id),
            SummarizerError::Internal { correlation_id, .. } => *correlation_id,
            _ => None,
        }
    }
}
