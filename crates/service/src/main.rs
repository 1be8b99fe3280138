//! Process entrypoint: loads configuration, wires every collaborator the
//! `PipelineCoordinator` composes, and serves the health/metrics surface.
//! Submitting and polling summaries is a library call
//! (`summarizer::PipelineCoordinator`), not something this binary exposes
//! over HTTP itself — that's left to whatever out-of-scope transport
//! embeds it.

mod config;
mod health;
mod middleware;
mod server;

use std::sync::Arc;
use std::time::Duration;

use summarizer::coordinator::{CoordinatorConfig, PipelineCoordinator};
use summarizer::extractor::quality::QualityGateConfig;
use summarizer::extractor::scraper::HttpScraperClient;
use summarizer::extractor::youtube::{HttpTranscriptApi, StorageBudgetConfig, SubprocessVideoDownloader};
use summarizer::extractor::{ContentExtractor, ExtractorConfig, SCRAPER_SERVICE, VIDEO_SERVICE};
use summarizer::llm::OpenAiCompatibleClient;
use summarizer::lock::{InMemoryLockBackend, LockManager, RedisLockBackend};
use summarizer::rate_limit::RateLimitManager;
use summarizer::store::{RequestStore, SqliteRequestStore};
use summarizer_core::{
    load_dotenv, CircuitBreaker, CircuitBreakerConfig, ConfigLoader, DatabaseConfig, DatabasePool,
    HealthChecker, LogFormat, RedisConfig, ServiceConfig, SqliteAuditLogger,
};
use tracing::info;

use crate::config::LlmEnvConfig;
use crate::server::Server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let service_config = ServiceConfig::from_env().map_err(anyhow::Error::from)?;
    service_config.validate().map_err(anyhow::Error::from)?;

    match service_config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        ).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        ).init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting summarizer service");

    let db_config = DatabaseConfig::from_env().map_err(anyhow::Error::from)?;
    db_config.validate().map_err(anyhow::Error::from)?;
    let db_pool = DatabasePool::new(&db_config).await?;
    db_pool.migrate().await?;
    info!("database migrations applied");

    let redis_config = RedisConfig::from_env().map_err(anyhow::Error::from)?;
    redis_config.validate().map_err(anyhow::Error::from)?;

    let lock_manager = Arc::new(build_lock_manager(&redis_config).await?);

    let rate_limiter = Arc::new(RateLimitManager::new());
    rate_limiter.register_service(SCRAPER_SERVICE, 10, Duration::from_secs(1)).await;
    rate_limiter.register_service(VIDEO_SERVICE, 5, Duration::from_secs(1)).await;

    let llm_env = LlmEnvConfig::from_env();
    for provider in llm_env.provider_names() {
        rate_limiter.register_service(format!("llm:{provider}"), 20, Duration::from_secs(1)).await;
    }

    let extractor = Arc::new(build_extractor(rate_limiter.clone()));
    let llm_client = Arc::new(OpenAiCompatibleClient::new(llm_env.providers.clone(), Duration::from_secs(120), rate_limiter.clone()));

    let store: Arc<dyn RequestStore> = Arc::new(SqliteRequestStore::new(db_pool.pool().clone()));
    let audit = Arc::new(SqliteAuditLogger::new(db_pool.pool().clone()));

    let coordinator_config = CoordinatorConfig::new(llm_env.cascade_config());
    let coordinator = Arc::new(PipelineCoordinator::new(
        store,
        lock_manager,
        extractor,
        llm_client,
        audit,
        coordinator_config,
    ));

    let mut health_checker = HealthChecker::new().with_sqlite(db_pool.pool().clone());
    if let Some(redis_url) = &redis_config.url {
        if let Ok(client) = redis::Client::open(redis_url.as_str()) {
            health_checker = health_checker.with_redis(client);
        }
    }
    let health_checker = Arc::new(health_checker);

    let server = Server::new(service_config, coordinator, health_checker);
    server.run().await
}

async fn build_lock_manager(redis_config: &RedisConfig) -> anyhow::Result<LockManager> {
    match &redis_config.url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            match client.get_connection_manager().await {
                Ok(conn) => {
                    info!("using redis-backed dedupe lock");
                    Ok(LockManager::with_fallback(
                        Arc::new(RedisLockBackend::new(conn)),
                        Arc::new(InMemoryLockBackend::new()),
                        redis_config.required,
                    ))
                }
                Err(e) if redis_config.required => {
                    Err(anyhow::anyhow!("redis dedupe lock required but unreachable: {e}"))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "redis unreachable at startup, falling back to in-memory dedupe lock");
                    Ok(LockManager::new(Arc::new(InMemoryLockBackend::new())))
                }
            }
        }
        None => {
            info!("SUMMARIZER_REDIS_URL not set, using in-memory dedupe lock");
            Ok(LockManager::new(Arc::new(InMemoryLockBackend::new())))
        }
    }
}

fn build_extractor(rate_limiter: Arc<RateLimitManager>) -> ContentExtractor {
    let http_client = reqwest::Client::new();
    let scraper_endpoint = std::env::var("SUMMARIZER_SCRAPER_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:9001/scrape".to_string());
    let transcript_endpoint = std::env::var("SUMMARIZER_TRANSCRIPT_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:9002/transcript".to_string());
    let downloader_binary =
        std::env::var("SUMMARIZER_VIDEO_DOWNLOADER_BIN").unwrap_or_else(|_| "yt-dlp".to_string());
    let storage_root = std::env::var("SUMMARIZER_STORAGE_ROOT").unwrap_or_else(|_| "./storage".to_string());

    ContentExtractor::new(
        Arc::new(HttpScraperClient::new(http_client.clone(), scraper_endpoint)),
        http_client,
        Arc::new(HttpTranscriptApi::new(reqwest::Client::new(), transcript_endpoint)),
        Arc::new(SubprocessVideoDownloader::new(downloader_binary)),
        Arc::new(CircuitBreaker::new(SCRAPER_SERVICE, CircuitBreakerConfig::content_extractor())),
        Arc::new(CircuitBreaker::new(VIDEO_SERVICE, CircuitBreakerConfig::video_api())),
        rate_limiter,
        ExtractorConfig {
            scrape_timeout: Duration::from_secs(30),
            salvage_timeout: Duration::from_secs(15),
            quality_gate: QualityGateConfig::default(),
            preferred_video_quality: "720p".to_string(),
            preferred_transcript_languages: vec!["en".to_string()],
            storage_budget: StorageBudgetConfig {
                max_storage_gb: 50.0,
                cleanup_trigger_pct: 0.85,
                retention_days: 7,
            },
            storage_root: storage_root.into(),
        },
    )
}
