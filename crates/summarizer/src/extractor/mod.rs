//! Content extraction (C4, spec.md §4.4): routes a canonical URL to either
//! the web path (scraper, with a direct-HTML salvage fallback, gated by a
//! quality check) or the YouTube path (transcript API, video/subtitle
//! download, VTT fallback), producing the artifact the chunker/LLM stage
//! consumes.
//!
//! Staged persistence (spec.md §4.4.2): the concurrency permit that gates a
//! single extraction is released as soon as the network/process work is
//! done, before the (comparatively slow) database write — so a crawl result
//! never holds a scheduling slot hostage while it's being persisted.

pub mod quality;
pub mod salvage;
pub mod scraper;
pub mod youtube;

use std::sync::Arc;
use std::time::{Duration, Instant};

use summarizer_core::{retry_with_backoff, CircuitBreaker, CircuitBreakerError, RetryPolicy};

use crate::error::{ExtractionErrorKind, SummarizerError};
use crate::models::{CrawlResult, CrawlSource, CrawlStatus, TranscriptSource, VideoArtifact, VideoArtifactStatus};
use crate::rate_limit::RateLimitManager;

use quality::QualityGateConfig;
use scraper::{ScraperClient, ScraperOptions};
use youtube::{DownloadOptions, StorageBudgetConfig, TranscriptApi, VideoDownloader};

pub const SCRAPER_SERVICE: &str = "scraper";
pub const VIDEO_SERVICE: &str = "video_api";

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub scrape_timeout: Duration,
    pub salvage_timeout: Duration,
    pub quality_gate: QualityGateConfig,
    pub preferred_video_quality: String,
    pub preferred_transcript_languages: Vec<String>,
    pub storage_budget: StorageBudgetConfig,
    pub storage_root: std::path::PathBuf,
}

pub struct ContentExtractor {
    scraper: Arc<dyn ScraperClient>,
    salvage_client: reqwest::Client,
    transcript_api: Arc<dyn TranscriptApi>,
    video_downloader: Arc<dyn VideoDownloader>,
    scraper_breaker: Arc<CircuitBreaker>,
    video_breaker: Arc<CircuitBreaker>,
    rate_limiter: Arc<RateLimitManager>,
    config: ExtractorConfig,
}

impl ContentExtractor {
    pub fn new(
        scraper: Arc<dyn ScraperClient>,
        salvage_client: reqwest::Client,
        transcript_api: Arc<dyn TranscriptApi>,
        video_downloader: Arc<dyn VideoDownloader>,
        scraper_breaker: Arc<CircuitBreaker>,
        video_breaker: Arc<CircuitBreaker>,
        rate_limiter: Arc<RateLimitManager>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            scraper,
            salvage_client,
            transcript_api,
            video_downloader,
            scraper_breaker,
            video_breaker,
            rate_limiter,
            config,
        }
    }

    /// Web path (spec.md §4.4, "web URL"): scrape, quality-gate, fall back
    /// to a direct-HTML salvage fetch if the scraper's output doesn't clear
    /// the gate, surface the final error otherwise.
    pub async fn extract_web(&self, url: &str) -> Result<CrawlResult, SummarizerError> {
        let started = Instant::now();
        self.rate_limiter.acquire(SCRAPER_SERVICE).await;

        let scrape_attempt = self
            .scraper_breaker
            .call(self.scraper.scrape(url, &ScraperOptions::default(), self.config.scrape_timeout))
            .await;

        let scrape_outcome = match scrape_attempt {
            Ok(response) => quality::check(&response.markdown, &self.config.quality_gate).map(|_| response),
            Err(breaker_err) => Err(breaker_err_to_summarizer(breaker_err)),
        };

        match scrape_outcome {
            Ok(response) => Ok(CrawlResult {
                request_id: uuid::Uuid::nil(),
                source_url: url.to_string(),
                http_status: Some(200),
                status: CrawlStatus::Ok,
                markdown: response.markdown,
                html: response.html,
                structured: response.structured,
                metadata: response.metadata,
                links: response.links,
                latency_ms: started.elapsed().as_millis() as u64,
                error_text: None,
                raw_payload: None,
                source: CrawlSource::Scraper,
                created_at: chrono::Utc::now(),
            }),
            Err(scrape_err) => self.extract_web_via_salvage(url, started, scrape_err).await,
        }
    }

    async fn extract_web_via_salvage(
        &self,
        url: &str,
        started: Instant,
        scrape_err: SummarizerError,
    ) -> Result<CrawlResult, SummarizerError> {
        if !matches!(
            scrape_err,
            SummarizerError::Extraction {
                kind: ExtractionErrorKind::QualityBelowThreshold | ExtractionErrorKind::NetworkTimeout | ExtractionErrorKind::RateLimited,
                ..
            }
        ) {
            return Err(scrape_err);
        }

        let text = salvage::fetch(&self.salvage_client, url, self.config.salvage_timeout).await?;
        quality::check(&text, &self.config.quality_gate)?;

        Ok(CrawlResult {
            request_id: uuid::Uuid::nil(),
            source_url: url.to_string(),
            http_status: Some(200),
            status: CrawlStatus::Ok,
            markdown: text,
            html: None,
            structured: None,
            metadata: serde_json::json!({}),
            links: Vec::new(),
            latency_ms: started.elapsed().as_millis() as u64,
            error_text: Some(format!("scraper fallback engaged: {scrape_err}")),
            raw_payload: None,
            source: CrawlSource::Salvage,
            created_at: chrono::Utc::now(),
        })
    }

    /// YouTube path (spec.md §4.4, "YouTube URL"): transcript API with
    /// retry, falling back to a downloaded subtitle file parsed as plain
    /// text if the API yields nothing. Returns the artifact plus the text
    /// (metadata header prepended) to feed the LLM stage.
    pub async fn extract_youtube(&self, video_id: &str) -> Result<(VideoArtifact, String), SummarizerError> {
        self.rate_limiter.acquire(VIDEO_SERVICE).await;

        let transcript_policy = RetryPolicy::new(2, 1000, 1000, false);
        let transcript_api = self.transcript_api.clone();
        let preferred_languages = self.config.preferred_transcript_languages.clone();
        let video_id_owned = video_id.to_string();

        let transcript = retry_with_backoff(
            || {
                let transcript_api = transcript_api.clone();
                let preferred_languages = preferred_languages.clone();
                let video_id = video_id_owned.clone();
                async move { transcript_api.fetch_transcript(&video_id, &preferred_languages).await }
            },
            transcript_policy,
            |err: &SummarizerError| err.is_retryable(),
        )
        .await?;

        let download_options = DownloadOptions {
            preferred_quality: self.config.preferred_video_quality.clone(),
            subtitle_languages: self.config.preferred_transcript_languages.clone(),
            dest_dir: self.config.storage_root.clone(),
        };

        let downloaded = self
            .video_breaker
            .call(self.video_downloader.download(video_id, &download_options))
            .await
            .map_err(breaker_err_to_summarizer)?;

        let (transcript_text, transcript_source, language, auto_generated) = match transcript {
            Some(result) => (result.text, result.source, result.language, result.auto_generated),
            None => match &downloaded.subtitle_path {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(path).await.unwrap_or_default();
                    (youtube::parse_vtt(&raw), TranscriptSource::VttFallback, None, true)
                }
                None => (String::new(), TranscriptSource::None, None, false),
            },
        };

        if let Err(budget_err) = youtube::enforce_storage_budget(&self.config.storage_root, &self.config.storage_budget) {
            tracing::warn!(error = %budget_err, "storage budget enforcement failed");
        }

        let header = youtube::build_metadata_header(
            downloaded.title.as_deref().unwrap_or("untitled"),
            downloaded.channel.as_deref().unwrap_or("unknown channel"),
            downloaded.duration_seconds,
            downloaded.resolution.as_deref(),
        );

        let artifact = VideoArtifact {
            request_id: uuid::Uuid::nil(),
            video_id: video_id.to_string(),
            status: VideoArtifactStatus::Completed,
            video_path: downloaded.video_path.map(|p| p.to_string_lossy().to_string()),
            subtitle_path: downloaded.subtitle_path.map(|p| p.to_string_lossy().to_string()),
            metadata_path: downloaded.metadata_path.map(|p| p.to_string_lossy().to_string()),
            thumbnail_path: downloaded.thumbnail_path.map(|p| p.to_string_lossy().to_string()),
            duration_seconds: downloaded.duration_seconds,
            resolution: downloaded.resolution,
            transcript_text: if transcript_text.trim().is_empty() { None } else { Some(transcript_text.clone()) },
            transcript_source,
            subtitle_language: language,
            auto_generated,
            created_at: chrono::Utc::now(),
        };

        if !artifact.satisfies_transcript_invariant() {
            return Err(SummarizerError::extraction(
                ExtractionErrorKind::TranscriptsDisabled,
                "no transcript available from API or subtitle fallback",
            ));
        }

        let content_for_llm = format!("{header}\n\n{transcript_text}");
        Ok((artifact, content_for_llm))
    }
}

fn breaker_err_to_summarizer(err: CircuitBreakerError<SummarizerError>) -> SummarizerError {
    match err {
        CircuitBreakerError::CallFailed(inner) => inner,
        other => SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, other.to_string()),
    }
}
