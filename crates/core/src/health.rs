//! Health check system for summarizer services.
//!
//! Provides aggregated health monitoring for the service's dependencies:
//! the SQLite store and, when configured, the shared Redis lock/circuit
//! backend. Health checks run in parallel with a per-check timeout and
//! distinguish critical from non-critical components.
//!
//! ```rust,no_run
//! use summarizer_core::health::{HealthChecker, AggregatedHealth};
//!
//! async fn health_endpoint(checker: &HealthChecker) -> AggregatedHealth {
//!     checker.check_all().await
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Health status levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }
}

/// Health check result for a single component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub critical: bool,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: u64, critical: bool) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms,
            message: None,
            critical,
        }
    }

    pub fn unhealthy(
        name: impl Into<String>,
        latency_ms: u64,
        critical: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms,
            message: Some(message.into()),
            critical,
        }
    }
}

/// Aggregated health status for the entire service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub total_latency_ms: u64,
}

impl AggregatedHealth {
    pub fn from_components(components: Vec<ComponentHealth>, total_latency_ms: u64) -> Self {
        let status = if components
            .iter()
            .any(|c| c.critical && c.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else if components.iter().any(|c| c.status != HealthStatus::Healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            components,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            total_latency_ms,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        self.status.http_status_code()
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }
}

/// Simple health response for the `/healthz` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleHealth {
    pub status: HealthStatus,
    pub version: String,
}

impl From<&AggregatedHealth> for SimpleHealth {
    fn from(health: &AggregatedHealth) -> Self {
        Self {
            status: health.status,
            version: health.version.clone(),
        }
    }
}

/// Trait for implementing a single component's health check.
#[async_trait::async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> ComponentHealth;
    fn name(&self) -> &str;
    fn is_critical(&self) -> bool;
}

/// SQLite store health checker. Critical: the request store backs every
/// operation the coordinator performs.
pub struct SqliteHealthCheck {
    pool: SqlitePool,
    name: String,
    critical: bool,
}

impl SqliteHealthCheck {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            name: "sqlite".to_string(),
            critical: true,
        }
    }

    pub fn with_name(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
            critical: true,
        }
    }
}

#[async_trait::async_trait]
impl HealthCheck for SqliteHealthCheck {
    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();

        let result = timeout(Duration::from_secs(2), async {
            sqlx::query("SELECT 1").fetch_one(&self.pool).await
        })
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                debug!(latency_ms, "sqlite health check passed");
                ComponentHealth::healthy(&self.name, latency_ms, self.critical)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "sqlite health check failed");
                ComponentHealth::unhealthy(
                    &self.name,
                    latency_ms,
                    self.critical,
                    format!("query failed: {}", e),
                )
            }
            Err(_) => {
                warn!("sqlite health check timed out");
                ComponentHealth::unhealthy(
                    &self.name,
                    2000,
                    self.critical,
                    "health check timed out after 2s",
                )
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_critical(&self) -> bool {
        self.critical
    }
}

/// Redis health checker for the optional shared lock/circuit backend.
/// Non-critical: its absence degrades to in-memory backends, it doesn't
/// take the service down.
pub struct RedisHealthCheck {
    client: redis::Client,
    name: String,
    critical: bool,
}

impl RedisHealthCheck {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            name: "redis".to_string(),
            critical: false,
        }
    }

    pub fn with_name(client: redis::Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            critical: false,
        }
    }

    pub fn set_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

#[async_trait::async_trait]
impl HealthCheck for RedisHealthCheck {
    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();

        let result = timeout(Duration::from_secs(2), async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        })
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) if response == "PONG" => {
                debug!(latency_ms, "redis health check passed");
                ComponentHealth::healthy(&self.name, latency_ms, self.critical)
            }
            Ok(Ok(response)) => {
                warn!(response = %response, "redis health check unexpected response");
                ComponentHealth::unhealthy(
                    &self.name,
                    latency_ms,
                    self.critical,
                    format!("unexpected response: {}", response),
                )
            }
            Ok(Err(e)) => {
                warn!(error = %e, "redis health check failed");
                ComponentHealth::unhealthy(
                    &self.name,
                    latency_ms,
                    self.critical,
                    format!("PING failed: {}", e),
                )
            }
            Err(_) => {
                warn!("redis health check timed out");
                ComponentHealth::unhealthy(
                    &self.name,
                    2000,
                    self.critical,
                    "health check timed out after 2s",
                )
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_critical(&self) -> bool {
        self.critical
    }
}

/// Coordinates all component health checks.
pub struct HealthChecker {
    checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn add_check(mut self, check: impl HealthCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn with_sqlite(self, pool: SqlitePool) -> Self {
        self.add_check(SqliteHealthCheck::new(pool))
    }

    pub fn with_redis(self, client: redis::Client) -> Self {
        self.add_check(RedisHealthCheck::new(client))
    }

    pub async fn check_all(&self) -> AggregatedHealth {
        let start = Instant::now();

        let futures: Vec<_> = self.checks.iter().map(|check| check.check()).collect();
        let components = futures::future::join_all(futures).await;

        let total_latency_ms = start.elapsed().as_millis() as u64;

        AggregatedHealth::from_components(components, total_latency_ms)
    }

    pub async fn check_simple(&self) -> SimpleHealth {
        let health = self.check_all().await;
        SimpleHealth::from(&health)
    }

    pub async fn check_ready(&self) -> AggregatedHealth {
        self.check_all().await
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
