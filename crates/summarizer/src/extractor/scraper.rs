//! Scraper RPC client (spec.md §6): an external service that accepts a URL
//! plus format options and returns markdown, optional html/structured
//! payloads, metadata, links, and an error envelope. The wire protocol
//! belongs to the vendor; this module only depends on the fields spec.md §6
//! names.
//!
//! Grounded in the teacher's `TMDbClient`/aggregator client shape
//! (`reqwest::Client` held by value, one GET/POST per call, JSON body
//! parsed into a typed response) from `crates/ingestion/src/aggregator/`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExtractionErrorKind, SummarizerError};

#[derive(Debug, Clone, Serialize)]
pub struct ScraperOptions {
    pub markdown: bool,
    pub html: bool,
    pub structured: bool,
    pub screenshot: bool,
    pub mobile: bool,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            markdown: true,
            html: false,
            structured: false,
            screenshot: false,
            mobile: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperResponse {
    pub markdown: String,
    pub html: Option<String>,
    pub structured: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub links: Vec<String>,
    pub error: Option<ScraperErrorEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperErrorEnvelope {
    pub code: String,
    pub message: String,
}

#[async_trait]
pub trait ScraperClient: Send + Sync {
    async fn scrape(
        &self,
        url: &str,
        options: &ScraperOptions,
        timeout: Duration,
    ) -> Result<ScraperResponse, SummarizerError>;
}

pub struct HttpScraperClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpScraperClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ScraperClient for HttpScraperClient {
    async fn scrape(
        &self,
        url: &str,
        options: &ScraperOptions,
        timeout: Duration,
    ) -> Result<ScraperResponse, SummarizerError> {
        #[derive(Serialize)]
        struct Payload<'a> {
            url: &'a str,
            #[serde(flatten)]
            options: &'a ScraperOptions,
        }

        let request = self
            .client
            .post(&self.endpoint)
            .json(&Payload { url, options })
            .timeout(timeout);

        let response = request.send().await.map_err(map_reqwest_error)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SummarizerError::extraction(
                ExtractionErrorKind::RateLimited,
                "scraper returned 429",
            ));
        }
        if !response.status().is_success() {
            return Err(SummarizerError::extraction(
                ExtractionErrorKind::NetworkTimeout,
                format!("scraper returned status {}", response.status()),
            ));
        }

        let parsed: ScraperResponse = response.json().await.map_err(|e| {
            SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, format!("malformed scraper response: {e}"))
        })?;

        if let Some(envelope) = &parsed.error {
            return Err(map_vendor_error(envelope));
        }

        Ok(parsed)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SummarizerError {
    if e.is_timeout() {
        SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, e.to_string())
    } else {
        SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, e.to_string())
    }
}

fn map_vendor_error(envelope: &ScraperErrorEnvelope) -> SummarizerError {
    let kind = match envelope.code.as_str() {
        "age_restricted" => ExtractionErrorKind::AgeRestricted,
        "geo_blocked" => ExtractionErrorKind::GeoBlocked,
        "private_or_removed" => ExtractionErrorKind::PrivateOrRemoved,
        "members_only" => ExtractionErrorKind::MembersOnly,
        "scheduled_premiere" => ExtractionErrorKind::ScheduledPremiere,
        "rate_limited" => ExtractionErrorKind::RateLimited,
        "storage_full" => ExtractionErrorKind::StorageFull,
        _ => ExtractionErrorKind::NetworkTimeout,
    };
    SummarizerError::extraction(kind, envelope.message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeScraperClient {
        response: ScraperResponse,
    }

    #[async_trait]
    impl ScraperClient for FakeScraperClient {
        async fn scrape(
            &self,
            _url: &str,
            _options: &ScraperOptions,
            _timeout: Duration,
        ) -> Result<ScraperResponse, SummarizerError> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_fake_client_returns_configured_response() {
        let fake = FakeScraperClient {
            response: ScraperResponse {
                markdown: "# Title\n\nBody text.".to_string(),
                html: None,
                structured: None,
                metadata: serde_json::json!({"title": "Title"}),
                links: vec!["https://example.com/b".to_string()],
                error: None,
            },
        };

        let result = fake
            .scrape("https://example.com/a", &ScraperOptions::default(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.markdown.contains("Body text."));
        assert_eq!(result.links.len(), 1);
    }

    #[test]
    fn test_map_vendor_error_known_code() {
        let envelope = ScraperErrorEnvelope {
            code: "age_restricted".to_string(),
            message: "blocked".to_string(),
        };
        let err = map_vendor_error(&envelope);
        assert_eq!(err.category(), "extraction_age_restricted");
    }

    #[test]
    fn test_map_vendor_error_unknown_code_falls_back_to_network_timeout() {
        let envelope = ScraperErrorEnvelope {
            code: "something_weird".to_string(),
            message: "?".to_string(),
        };
        let err = map_vendor_error(&envelope);
        assert_eq!(err.category(), "extraction_network_timeout");
    }
}
