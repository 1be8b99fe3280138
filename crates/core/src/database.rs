//! Shared SQLite connection pool for summarizer services.
//!
//! The service is single-node/single-operator (SPEC_FULL.md §3), so the
//! durable state plane is a local SQLite file rather than a networked
//! database. Write-ahead logging is enabled on every new pool so concurrent
//! readers don't block the batch orchestrator's writers.

use crate::config::DatabaseConfig;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};
use tracing::info;

/// Shared database connection pool.
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Create a new pool, enabling WAL journaling on the first connection.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, SqlxError> {
        info!(
            max_connections = config.max_connections,
            "connecting to sqlite store"
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&pool)
            .await?;

        info!("database connection pool established");
        Ok(Self { pool })
    }

    /// Create a pool from the `SUMMARIZER_DATABASE_*` environment variables.
    pub async fn from_env() -> Result<Self, SqlxError> {
        let config = DatabaseConfig::default();
        Self::new(&config).await
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run pending migrations embedded in the binary.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Check if the pool can still serve a trivial query.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }
}

/// Pool statistics, surfaced through the health endpoint.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}
