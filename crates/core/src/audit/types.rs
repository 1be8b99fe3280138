use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit trail entry. `correlation_id` equals the `Request`
/// id and must appear on every log, audit, and artifact row produced
/// while handling that submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub event_name: AuditAction,
    pub correlation_id: Uuid,
    pub user_id: Option<Uuid>,
    pub details: serde_json::Value,
    /// Per-process sequence number for tie-breaking events sharing a
    /// timestamp; monotonic within a process lifetime.
    pub sequence: u64,
}

impl AuditEvent {
    pub fn new(event_name: AuditAction, correlation_id: Uuid, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: event_name.default_level(),
            event_name,
            correlation_id,
            user_id: None,
            details: serde_json::json!({}),
            sequence,
        }
    }

    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

/// The closed set of audit event names a submission's trail is built
/// from. A submission's sequence starts with `Created` and ends with
/// either `Completed` or `Error` (spec invariant: totally ordered,
/// `created` .. `ok`|`error`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Created,
    Reused,
    RejectedPrivateIp,
    StatusChanged,
    CrawlRecorded,
    VideoRecorded,
    LlmCallRecorded,
    SummaryWritten,
    DegradedMode,
    Cancelled,
    Completed,
    Error,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Reused => "reused",
            AuditAction::RejectedPrivateIp => "rejected_private_ip",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::CrawlRecorded => "crawl_recorded",
            AuditAction::VideoRecorded => "video_recorded",
            AuditAction::LlmCallRecorded => "llm_call_recorded",
            AuditAction::SummaryWritten => "summary_written",
            AuditAction::DegradedMode => "degraded_mode",
            AuditAction::Cancelled => "cancelled",
            AuditAction::Completed => "ok",
            AuditAction::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(AuditAction::Created),
            "reused" => Some(AuditAction::Reused),
            "rejected_private_ip" => Some(AuditAction::RejectedPrivateIp),
            "status_changed" => Some(AuditAction::StatusChanged),
            "crawl_recorded" => Some(AuditAction::CrawlRecorded),
            "video_recorded" => Some(AuditAction::VideoRecorded),
            "llm_call_recorded" => Some(AuditAction::LlmCallRecorded),
            "summary_written" => Some(AuditAction::SummaryWritten),
            "degraded_mode" => Some(AuditAction::DegradedMode),
            "cancelled" => Some(AuditAction::Cancelled),
            "ok" => Some(AuditAction::Completed),
            "error" => Some(AuditAction::Error),
            _ => None,
        }
    }

    fn default_level(&self) -> AuditLevel {
        match self {
            AuditAction::Error => AuditLevel::Error,
            AuditAction::DegradedMode | AuditAction::RejectedPrivateIp | AuditAction::Cancelled => {
                AuditLevel::Warn
            }
            _ => AuditLevel::Info,
        }
    }
}

/// Query filter for listing audit events, e.g. for an operator CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub correlation_id: Option<Uuid>,
    pub event_name: Option<AuditAction>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            correlation_id: None,
            event_name: None,
            limit: Some(100),
            offset: Some(0),
        }
    }
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_event_name(mut self, event_name: AuditAction) -> Self {
        self.event_name = Some(event_name);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}
