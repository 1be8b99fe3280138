use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::error;
use uuid::Uuid;

use super::types::{AuditAction, AuditEvent, AuditFilter};

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Append-only audit log sink. `append_audit` from spec.md §4.2 is
/// `log`; `log_batch` backs the buffered auto-flush writer.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, event: AuditEvent) -> Result<()>;
    async fn log_batch(&self, events: Vec<AuditEvent>) -> Result<()>;
    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>>;

    /// Allocate the next per-process sequence number used to break ties
    /// between events sharing a timestamp.
    fn next_sequence(&self) -> u64;
}

/// Buffered SQLite-backed audit logger. Events are held in memory and
/// flushed in a batch either when the buffer fills or on a timer, so a
/// burst of per-request events (created, crawl_recorded, llm_call_recorded,
/// ...) costs one transaction instead of one write per event.
pub struct SqliteAuditLogger {
    pool: SqlitePool,
    buffer: Arc<Mutex<Vec<AuditEvent>>>,
    buffer_size: usize,
    flush_interval: Duration,
    sequence: Arc<AtomicU64>,
}

impl SqliteAuditLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, 100, Duration::from_secs(5))
    }

    pub fn with_config(pool: SqlitePool, buffer_size: usize, flush_interval: Duration) -> Self {
        let logger = Self {
            pool,
            buffer: Arc::new(Mutex::new(Vec::with_capacity(buffer_size))),
            buffer_size,
            flush_interval,
            sequence: Arc::new(AtomicU64::new(0)),
        };

        logger.start_auto_flush();
        logger
    }

    fn start_auto_flush(&self) {
        let buffer = Arc::clone(&self.buffer);
        let pool = self.pool.clone();
        let flush_interval = self.flush_interval;

        tokio::spawn(async move {
            let mut ticker = interval(flush_interval);
            loop {
                ticker.tick().await;
                let events = {
                    let mut buf = buffer.lock().await;
                    if buf.is_empty() {
                        continue;
                    }
                    buf.drain(..).collect::<Vec<_>>()
                };

                if !events.is_empty() {
                    if let Err(e) = Self::insert_batch(&pool, events).await {
                        error!(error = %e, "failed to flush audit log buffer");
                    }
                }
            }
        });
    }

    async fn insert_batch(pool: &SqlitePool, events: Vec<AuditEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO audit_events
                (id, timestamp, level, event_name, correlation_id, user_id, details, sequence)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.id.to_string())
            .bind(event.timestamp)
            .bind(serde_json::to_string(&event.level)?)
            .bind(event.event_name.as_str())
            .bind(event.correlation_id.to_string())
            .bind(event.user_id.map(|u| u.to_string()))
            .bind(serde_json::to_string(&event.details)?)
            .bind(event.sequence as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn flush_buffer(&self) -> Result<()> {
        let events = {
            let mut buffer = self.buffer.lock().await;
            buffer.drain(..).collect::<Vec<_>>()
        };

        Self::insert_batch(&self.pool, events).await
    }
}

#[async_trait]
impl AuditLogger for SqliteAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<()> {
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(event);
            buffer.len() >= self.buffer_size
        };

        if should_flush {
            self.flush_buffer().await?;
        }

        Ok(())
    }

    async fn log_batch(&self, events: Vec<AuditEvent>) -> Result<()> {
        Self::insert_batch(&self.pool, events).await
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>> {
        let mut query = String::from(
            "SELECT id, timestamp, level, event_name, correlation_id, user_id, details, sequence \
             FROM audit_events WHERE 1=1",
        );

        if filter.start_date.is_some() {
            query.push_str(" AND timestamp >= ?");
        }
        if filter.end_date.is_some() {
            query.push_str(" AND timestamp <= ?");
        }
        if filter.correlation_id.is_some() {
            query.push_str(" AND correlation_id = ?");
        }
        if filter.event_name.is_some() {
            query.push_str(" AND event_name = ?");
        }

        query.push_str(" ORDER BY timestamp DESC, sequence DESC");

        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }
        if filter.offset.is_some() {
            query.push_str(" OFFSET ?");
        }

        let mut sql_query = sqlx::query(&query);

        if let Some(start) = filter.start_date {
            sql_query = sql_query.bind(start);
        }
        if let Some(end) = filter.end_date {
            sql_query = sql_query.bind(end);
        }
        if let Some(correlation_id) = filter.correlation_id {
            sql_query = sql_query.bind(correlation_id.to_string());
        }
        if let Some(event_name) = filter.event_name {
            sql_query = sql_query.bind(event_name.as_str());
        }
        if let Some(limit) = filter.limit {
            sql_query = sql_query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            sql_query = sql_query.bind(offset);
        }

        let rows = sql_query.fetch_all(&self.pool).await?;

        let events = rows
            .into_iter()
            .filter_map(|row| {
                let event_name_str: String = row.try_get("event_name").ok()?;
                let event_name = AuditAction::from_str(&event_name_str)?;
                let level_str: String = row.try_get("level").ok()?;
                let level = serde_json::from_str(&level_str).ok()?;
                let id_str: String = row.try_get("id").ok()?;
                let correlation_id_str: String = row.try_get("correlation_id").ok()?;
                let user_id_str: Option<String> = row.try_get("user_id").ok()?;
                let details_str: String = row.try_get("details").ok()?;

                Some(AuditEvent {
                    id: Uuid::parse_str(&id_str).ok()?,
                    timestamp: row.try_get("timestamp").ok()?,
                    level,
                    event_name,
                    correlation_id: Uuid::parse_str(&correlation_id_str).ok()?,
                    user_id: user_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
                    details: serde_json::from_str(&details_str).ok()?,
                    sequence: row.try_get::<i64, _>("sequence").ok()? as u64,
                })
            })
            .collect();

        Ok(events)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }
}
