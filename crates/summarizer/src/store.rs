//! Request store (C2, spec.md §4.2). Owns the `requests` row and the
//! per-stage rows (`crawl_results`, `video_artifacts`, `llm_calls`,
//! `summaries`) recorded against it.
//!
//! Grounded in the teacher's `SqliteAuditLogger`/`DatabasePool` idiom of
//! plain `sqlx::query` string SQL bound by position, not the query macros
//! (no `DATABASE_URL` is available at build time here either), with
//! multi-row operations wrapped in a `pool.begin()` transaction.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Result, StorageErrorKind, SummarizerError};
use crate::models::{
    CrawlResult, CrawlSource, CrawlStatus, LlmCall, LlmCallStatus, Request, RequestKind,
    RequestStatus, Summary, TranscriptSource, VideoArtifact, VideoArtifactStatus,
};

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new request, or return the existing row if `dedupe_hash`
    /// already has one (race-safe: the unique constraint decides the
    /// winner, this just reads it back).
    async fn create_request(
        &self,
        kind: RequestKind,
        input_text: &str,
        normalized_url: Option<&str>,
        dedupe_hash: Option<&str>,
    ) -> Result<Request>;

    async fn get(&self, id: Uuid) -> Result<Option<Request>>;
    async fn get_by_dedupe(&self, dedupe_hash: &str) -> Result<Option<Request>>;

    /// Move `id` to `next`, enforcing [`RequestStatus::can_transition_to`].
    async fn update_status(
        &self,
        id: Uuid,
        next: RequestStatus,
        error: Option<&str>,
    ) -> Result<()>;

    async fn record_crawl(&self, crawl: &CrawlResult) -> Result<()>;
    async fn record_video(&self, artifact: &VideoArtifact) -> Result<()>;
    async fn record_llm_call(&self, call: &LlmCall) -> Result<()>;

    /// Insert or bump the version of the current summary for `request_id`.
    async fn upsert_summary(
        &self,
        request_id: Uuid,
        lang: &str,
        json_payload: serde_json::Value,
    ) -> Result<Summary>;

    async fn get_summary(&self, request_id: Uuid) -> Result<Option<Summary>>;
}

pub struct SqliteRequestStore {
    pool: SqlitePool,
}

impl SqliteRequestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request> {
        let id: String = row.try_get("id").map_err(db_err)?;
        let kind: String = row.try_get("kind").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        Ok(Request {
            id: Uuid::parse_str(&id).map_err(|e| parse_err("id", e))?,
            kind: parse_kind(&kind)?,
            status: parse_status(&status)?,
            input_text: row.try_get("input_text").map_err(db_err)?,
            normalized_url: row.try_get("normalized_url").map_err(db_err)?,
            dedupe_hash: row.try_get("dedupe_hash").map_err(db_err)?,
            lang_detected: row.try_get("lang_detected").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
            updated_at: row.try_get("updated_at").map_err(db_err)?,
            error: row.try_get("error").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl RequestStore for SqliteRequestStore {
    async fn create_request(
        &self,
        kind: RequestKind,
        input_text: &str,
        normalized_url: Option<&str>,
        dedupe_hash: Option<&str>,
    ) -> Result<Request> {
        let request = Request::new(kind, input_text);

        sqlx::query(
            r#"
            INSERT INTO requests
                (id, kind, status, input_text, normalized_url, dedupe_hash,
                 lang_detected, created_at, updated_at, error)
            VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL)
            ON CONFLICT(dedupe_hash) DO NOTHING
            "#,
        )
        .bind(request.id.to_string())
        .bind(kind_str(kind))
        .bind(status_str(request.status))
        .bind(input_text)
        .bind(normalized_url)
        .bind(dedupe_hash)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(hash) = dedupe_hash {
            // Either this insert won, or a concurrent one did; read back the
            // row that the unique constraint actually settled on.
            return self
                .get_by_dedupe(hash)
                .await?
                .ok_or_else(|| SummarizerError::Storage(StorageErrorKind::Integrity));
        }

        self.get(request.id)
            .await?
            .ok_or_else(|| SummarizerError::Storage(StorageErrorKind::Integrity))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Request>> {
        let row = sqlx::query("SELECT * FROM requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| Self::row_to_request(&r)).transpose()
    }

    async fn get_by_dedupe(&self, dedupe_hash: &str) -> Result<Option<Request>> {
        let row = sqlx::query("SELECT * FROM requests WHERE dedupe_hash = ?")
            .bind(dedupe_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| Self::row_to_request(&r)).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        next: RequestStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| SummarizerError::internal("request not found", Some(id)))?;

        if !current.status.can_transition_to(next) {
            return Err(SummarizerError::internal(
                format!(
                    "invalid status transition {:?} -> {:?}",
                    current.status, next
                ),
                Some(id),
            ));
        }

        sqlx::query("UPDATE requests SET status = ?, error = ?, updated_at = ? WHERE id = ?")
            .bind(status_str(next))
            .bind(error)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn record_crawl(&self, crawl: &CrawlResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_results
                (id, request_id, source_url, http_status, status, markdown, html,
                 structured, metadata, links, latency_ms, error_text, raw_payload,
                 source, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(crawl.request_id.to_string())
        .bind(&crawl.source_url)
        .bind(crawl.http_status.map(i64::from))
        .bind(crawl_status_str(crawl.status))
        .bind(&crawl.markdown)
        .bind(&crawl.html)
        .bind(crawl.structured.as_ref().map(|v| v.to_string()))
        .bind(crawl.metadata.to_string())
        .bind(serde_json::to_string(&crawl.links).map_err(json_err)?)
        .bind(crawl.latency_ms as i64)
        .bind(&crawl.error_text)
        .bind(crawl.raw_payload.as_ref().map(|v| v.to_string()))
        .bind(crawl_source_str(crawl.source))
        .bind(crawl.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn record_video(&self, artifact: &VideoArtifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO video_artifacts
                (request_id, video_id, status, video_path, subtitle_path,
                 metadata_path, thumbnail_path, duration_seconds, resolution,
                 transcript_text, transcript_source, subtitle_language,
                 auto_generated, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(request_id, video_id) DO UPDATE SET
                status = excluded.status,
                video_path = excluded.video_path,
                subtitle_path = excluded.subtitle_path,
                metadata_path = excluded.metadata_path,
                thumbnail_path = excluded.thumbnail_path,
                duration_seconds = excluded.duration_seconds,
                resolution = excluded.resolution,
                transcript_text = excluded.transcript_text,
                transcript_source = excluded.transcript_source,
                subtitle_language = excluded.subtitle_language,
                auto_generated = excluded.auto_generated
            "#,
        )
        .bind(artifact.request_id.to_string())
        .bind(&artifact.video_id)
        .bind(video_status_str(artifact.status))
        .bind(&artifact.video_path)
        .bind(&artifact.subtitle_path)
        .bind(&artifact.metadata_path)
        .bind(&artifact.thumbnail_path)
        .bind(artifact.duration_seconds.map(|d| d as i64))
        .bind(&artifact.resolution)
        .bind(&artifact.transcript_text)
        .bind(transcript_source_str(artifact.transcript_source))
        .bind(&artifact.subtitle_language)
        .bind(artifact.auto_generated)
        .bind(artifact.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn record_llm_call(&self, call: &LlmCall) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO llm_calls
                (id, request_id, provider, model, preset, attempt_index,
                 request_messages, response_text, response_object, prompt_tokens,
                 completion_tokens, cost_estimate, latency_ms, status, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(call.id.to_string())
        .bind(call.request_id.to_string())
        .bind(&call.provider)
        .bind(&call.model)
        .bind(call.preset.as_str())
        .bind(call.attempt_index as i64)
        .bind(call.request_messages.to_string())
        .bind(&call.response_text)
        .bind(call.response_object.as_ref().map(|v| v.to_string()))
        .bind(call.prompt_tokens.map(i64::from))
        .bind(call.completion_tokens.map(i64::from))
        .bind(call.cost_estimate)
        .bind(call.latency_ms as i64)
        .bind(llm_status_str(call.status))
        .bind(&call.error)
        .bind(call.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_summary(
        &self,
        request_id: Uuid,
        lang: &str,
        json_payload: serde_json::Value,
    ) -> Result<Summary> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing_version: Option<i64> = sqlx::query(
            "SELECT version FROM summaries WHERE request_id = ?",
        )
        .bind(request_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .map(|r| r.get("version"));

        let now = Utc::now();
        let next_version = existing_version.unwrap_or(0) + 1;
        let payload_str = json_payload.to_string();

        sqlx::query(
            r#"
            INSERT INTO summaries (request_id, lang, json_payload, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(request_id) DO UPDATE SET
                lang = excluded.lang,
                json_payload = excluded.json_payload,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(request_id.to_string())
        .bind(lang)
        .bind(&payload_str)
        .bind(next_version)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(Summary {
            request_id,
            lang: lang.to_string(),
            json_payload,
            version: next_version as u32,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_summary(&self, request_id: Uuid) -> Result<Option<Summary>> {
        let row = sqlx::query("SELECT * FROM summaries WHERE request_id = ?")
            .bind(request_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };
        let payload: String = row.try_get("json_payload").map_err(db_err)?;
        Ok(Some(Summary {
            request_id,
            lang: row.try_get("lang").map_err(db_err)?,
            json_payload: serde_json::from_str(&payload).map_err(json_err)?,
            version: row.try_get::<i64, _>("version").map_err(db_err)? as u32,
            created_at: row.try_get("created_at").map_err(db_err)?,
            updated_at: row.try_get("updated_at").map_err(db_err)?,
        }))
    }
}

fn db_err(e: sqlx::Error) -> SummarizerError {
    SummarizerError::internal(format!("sqlite error: {e}"), None)
}

fn json_err(e: serde_json::Error) -> SummarizerError {
    SummarizerError::internal(format!("json encode/decode error: {e}"), None)
}

fn parse_err(field: &str, e: impl std::fmt::Display) -> SummarizerError {
    SummarizerError::internal(format!("malformed {field}: {e}"), None)
}

fn kind_str(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::UrlWeb => "url_web",
        RequestKind::UrlVideo => "url_video",
        RequestKind::Forward => "forward",
    }
}

fn parse_kind(s: &str) -> Result<RequestKind> {
    match s {
        "url_web" => Ok(RequestKind::UrlWeb),
        "url_video" => Ok(RequestKind::UrlVideo),
        "forward" => Ok(RequestKind::Forward),
        other => Err(parse_err("kind", other)),
    }
}

fn status_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::Processing => "processing",
        RequestStatus::Ok => "ok",
        RequestStatus::Error => "error",
    }
}

fn parse_status(s: &str) -> Result<RequestStatus> {
    match s {
        "pending" => Ok(RequestStatus::Pending),
        "processing" => Ok(RequestStatus::Processing),
        "ok" => Ok(RequestStatus::Ok),
        "error" => Ok(RequestStatus::Error),
        other => Err(parse_err("status", other)),
    }
}

fn crawl_status_str(status: CrawlStatus) -> &'static str {
    match status {
        CrawlStatus::Ok => "ok",
        CrawlStatus::Error => "error",
    }
}

fn crawl_source_str(source: CrawlSource) -> &'static str {
    match source {
        CrawlSource::Scraper => "scraper",
        CrawlSource::Salvage => "salvage",
    }
}

fn video_status_str(status: VideoArtifactStatus) -> &'static str {
    match status {
        VideoArtifactStatus::Pending => "pending",
        VideoArtifactStatus::Downloading => "downloading",
        VideoArtifactStatus::Completed => "completed",
        VideoArtifactStatus::Error => "error",
    }
}

fn transcript_source_str(source: TranscriptSource) -> &'static str {
    match source {
        TranscriptSource::ApiManual => "api_manual",
        TranscriptSource::ApiAuto => "api_auto",
        TranscriptSource::VttFallback => "vtt_fallback",
        TranscriptSource::None => "none",
    }
}

fn llm_status_str(status: LlmCallStatus) -> &'static str {
    match status {
        LlmCallStatus::Ok => "ok",
        LlmCallStatus::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(include_str!("../../core/migrations/0001_initial.sql"))
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_and_get_request() {
        let store = SqliteRequestStore::new(test_pool().await);
        let created = store
            .create_request(RequestKind::UrlWeb, "https://example.com/a", Some("https://example.com/a"), Some("hash1"))
            .await
            .unwrap();
        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_request_dedupe_returns_existing() {
        let store = SqliteRequestStore::new(test_pool().await);
        let first = store
            .create_request(RequestKind::UrlWeb, "https://example.com/a", None, Some("dup"))
            .await
            .unwrap();
        let second = store
            .create_request(RequestKind::UrlWeb, "https://example.com/a", None, Some("dup"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_update_status_enforces_transitions() {
        let store = SqliteRequestStore::new(test_pool().await);
        let req = store
            .create_request(RequestKind::Forward, "some text", None, None)
            .await
            .unwrap();

        store
            .update_status(req.id, RequestStatus::Processing, None)
            .await
            .unwrap();
        store
            .update_status(req.id, RequestStatus::Ok, None)
            .await
            .unwrap();

        let result = store
            .update_status(req.id, RequestStatus::Processing, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_upsert_summary_bumps_version() {
        let store = SqliteRequestStore::new(test_pool().await);
        let req = store
            .create_request(RequestKind::Forward, "text", None, None)
            .await
            .unwrap();

        let v1 = store
            .upsert_summary(req.id, "en", serde_json::json!({"tldr": "first"}))
            .await
            .unwrap();
        assert_eq!(v1.version, 1);

        let v2 = store
            .upsert_summary(req.id, "en", serde_json::json!({"tldr": "second"}))
            .await
            .unwrap();
        assert_eq!(v2.version, 2);

        let fetched = store.get_summary(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.version, 2);
        assert_eq!(fetched.json_payload["tldr"], "second");
    }

    #[tokio::test]
    async fn test_record_video_artifact_upsert() {
        let store = SqliteRequestStore::new(test_pool().await);
        let req = store
            .create_request(RequestKind::UrlVideo, "https://youtu.be/x", None, None)
            .await
            .unwrap();

        let artifact = VideoArtifact {
            request_id: req.id,
            video_id: "dQw4w9WgXcQ".to_string(),
            status: VideoArtifactStatus::Downloading,
            video_path: None,
            subtitle_path: None,
            metadata_path: None,
            thumbnail_path: None,
            duration_seconds: None,
            resolution: None,
            transcript_text: None,
            transcript_source: TranscriptSource::None,
            subtitle_language: None,
            auto_generated: false,
            created_at: Utc::now(),
        };
        store.record_video(&artifact).await.unwrap();

        let completed = VideoArtifact {
            status: VideoArtifactStatus::Completed,
            transcript_text: Some("hello world".to_string()),
            transcript_source: TranscriptSource::ApiAuto,
            ..artifact
        };
        store.record_video(&completed).await.unwrap();
    }
}
