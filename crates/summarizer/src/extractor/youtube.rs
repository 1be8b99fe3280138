//! YouTube extraction path (spec.md §4.4 "YouTube URL"). Transcript API with
//! retry, a sub-process video download dispatched off the scheduling loop,
//! VTT fallback parsing, metadata header construction, and storage-budget
//! cleanup.
//!
//! The transcript API and the downloader binary are vendor-specific, so both
//! are traits here; `SubprocessVideoDownloader` is the one concrete
//! implementation, grounded in spec.md §5's explicit instruction that
//! blocking sub-process work must be dispatched to a worker thread
//! (`tokio::task::spawn_blocking`) rather than run on the cooperative loop.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::{ExtractionErrorKind, SummarizerError};
use crate::models::TranscriptSource;

#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    pub source: TranscriptSource,
    pub language: Option<String>,
    pub auto_generated: bool,
}

#[async_trait]
pub trait TranscriptApi: Send + Sync {
    /// Returns `None` when no transcript is available at all (not an
    /// error); `Err` for a transient failure worth retrying.
    async fn fetch_transcript(
        &self,
        video_id: &str,
        preferred_languages: &[String],
    ) -> Result<Option<TranscriptResult>, SummarizerError>;
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub preferred_quality: String,
    pub subtitle_languages: Vec<String>,
    pub dest_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadedFiles {
    pub video_path: Option<PathBuf>,
    pub subtitle_path: Option<PathBuf>,
    pub metadata_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub duration_seconds: Option<u64>,
    pub resolution: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
}

#[async_trait]
pub trait VideoDownloader: Send + Sync {
    async fn download(
        &self,
        video_id: &str,
        options: &DownloadOptions,
    ) -> Result<DownloadedFiles, SummarizerError>;
}

/// Downloads via an external binary (e.g. a yt-dlp-compatible tool),
/// dispatched to a blocking-capable worker thread so the process wait
/// never blocks the async scheduler.
pub struct SubprocessVideoDownloader {
    binary_path: String,
}

impl SubprocessVideoDownloader {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl VideoDownloader for SubprocessVideoDownloader {
    async fn download(
        &self,
        video_id: &str,
        options: &DownloadOptions,
    ) -> Result<DownloadedFiles, SummarizerError> {
        let binary_path = self.binary_path.clone();
        let video_id = video_id.to_string();
        let options = options.clone();

        let result = tokio::task::spawn_blocking(move || run_downloader(&binary_path, &video_id, &options))
            .await
            .map_err(|e| SummarizerError::internal(format!("downloader task panicked: {e}"), None))?;

        result
    }
}

/// Transcript API client over a vendor HTTP endpoint, grounded in
/// `HttpScraperClient`'s shape: one `reqwest::Client` held by value, one
/// POST per call, a typed JSON response, 404 mapped to "no transcript"
/// rather than an error.
pub struct HttpTranscriptApi {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriptApi {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct TranscriptApiResponse {
    text: String,
    language: Option<String>,
    auto_generated: bool,
}

#[async_trait]
impl TranscriptApi for HttpTranscriptApi {
    async fn fetch_transcript(
        &self,
        video_id: &str,
        preferred_languages: &[String],
    ) -> Result<Option<TranscriptResult>, SummarizerError> {
        #[derive(serde::Serialize)]
        struct Query<'a> {
            video_id: &'a str,
            languages: &'a [String],
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&Query { video_id, languages: preferred_languages })
            .send()
            .await
            .map_err(|e| SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SummarizerError::extraction(ExtractionErrorKind::RateLimited, "transcript API returned 429"));
        }
        if !response.status().is_success() {
            return Err(SummarizerError::extraction(
                ExtractionErrorKind::NetworkTimeout,
                format!("transcript API returned status {}", response.status()),
            ));
        }

        let parsed: TranscriptApiResponse = response.json().await.map_err(|e| {
            SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, format!("malformed transcript response: {e}"))
        })?;

        Ok(Some(TranscriptResult {
            text: parsed.text,
            source: if parsed.auto_generated { TranscriptSource::ApiAuto } else { TranscriptSource::ApiManual },
            language: parsed.language,
            auto_generated: parsed.auto_generated,
        }))
    }
}

fn run_downloader(
    binary_path: &str,
    video_id: &str,
    options: &DownloadOptions,
) -> Result<DownloadedFiles, SummarizerError> {
    let url = format!("https://www.youtube.com/watch?v={video_id}");
    let output = Command::new(binary_path)
        .arg(&url)
        .arg("--format")
        .arg(format!("best[height<={}]", resolution_to_height(&options.preferred_quality)))
        .arg("--write-subs")
        .arg("--write-auto-subs")
        .arg("--sub-langs")
        .arg(options.subtitle_languages.join(","))
        .arg("--write-thumbnail")
        .arg("--write-info-json")
        .arg("--output")
        .arg(options.dest_dir.join(format!("{video_id}.%(ext)s")))
        .output()
        .map_err(|e| SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, format!("failed to spawn downloader: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify_downloader_failure(&stderr));
    }

    Ok(DownloadedFiles {
        video_path: Some(options.dest_dir.join(format!("{video_id}.mp4"))),
        subtitle_path: Some(options.dest_dir.join(format!("{video_id}.vtt"))),
        metadata_path: Some(options.dest_dir.join(format!("{video_id}.info.json"))),
        thumbnail_path: Some(options.dest_dir.join(format!("{video_id}.jpg"))),
        duration_seconds: None,
        resolution: Some(options.preferred_quality.clone()),
        title: None,
        channel: None,
    })
}

fn resolution_to_height(preferred_quality: &str) -> &str {
    match preferred_quality {
        "2160p" => "2160",
        "1440p" => "1440",
        "1080p" => "1080",
        "720p" => "720",
        "480p" => "480",
        other => other.trim_end_matches('p'),
    }
}

fn classify_downloader_failure(stderr: &str) -> SummarizerError {
    let lower = stderr.to_ascii_lowercase();
    let kind = if lower.contains("age") && lower.contains("restrict") {
        ExtractionErrorKind::AgeRestricted
    } else if lower.contains("not available") && lower.contains("country") {
        ExtractionErrorKind::GeoBlocked
    } else if lower.contains("private") || lower.contains("removed") || lower.contains("unavailable") {
        ExtractionErrorKind::PrivateOrRemoved
    } else if lower.contains("members-only") || lower.contains("members only") {
        ExtractionErrorKind::MembersOnly
    } else if lower.contains("premiere") {
        ExtractionErrorKind::ScheduledPremiere
    } else if lower.contains("429") || lower.contains("rate limit") {
        ExtractionErrorKind::RateLimited
    } else {
        ExtractionErrorKind::NetworkTimeout
    };
    SummarizerError::extraction(kind, stderr.trim().to_string())
}

static VTT_CUE_TIMING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}[.,]\d{3} --> \d{2}:\d{2}:\d{2}[.,]\d{3}.*$").unwrap());
static VTT_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Strip cue-timing lines and markup from a `.vtt`/`.srt` file's text,
/// leaving plain spoken-word transcript text in reading order.
pub fn parse_vtt(raw: &str) -> String {
    let mut lines_out: Vec<String> = Vec::new();
    let mut last_line: Option<String> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed == "WEBVTT"
            || trimmed.chars().all(|c| c.is_ascii_digit())
            || VTT_CUE_TIMING_RE.is_match(trimmed)
            || trimmed.starts_with("NOTE")
        {
            continue;
        }
        let cleaned = VTT_TAG_RE.replace_all(trimmed, "").to_string();
        if cleaned.is_empty() {
            continue;
        }
        // Auto-generated subtitles often repeat the previous line verbatim
        // across adjacent cues; skip exact repeats to avoid a stuttering
        // transcript.
        if last_line.as_deref() == Some(cleaned.as_str()) {
            continue;
        }
        last_line = Some(cleaned.clone());
        lines_out.push(cleaned);
    }

    lines_out.join(" ")
}

/// `Title | Channel | Duration | Resolution` header prepended to transcript
/// text passed to the LLM stage (spec.md §4.4 step 4).
pub fn build_metadata_header(
    title: &str,
    channel: &str,
    duration_seconds: Option<u64>,
    resolution: Option<&str>,
) -> String {
    let duration = duration_seconds
        .map(format_duration)
        .unwrap_or_else(|| "unknown".to_string());
    let resolution = resolution.unwrap_or("unknown");
    format!("{title} | {channel} | {duration} | {resolution}")
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[derive(Debug, Clone)]
pub struct StorageBudgetConfig {
    pub max_storage_gb: f64,
    pub cleanup_trigger_pct: f64,
    pub retention_days: u32,
}

/// Scan `storage_root` and delete oldest eligible files older than
/// `retention_days` until usage is back under the trigger threshold
/// (spec.md §4.4 step 5). Directories and errors reading individual entries
/// are skipped rather than aborting the whole sweep.
pub fn enforce_storage_budget(storage_root: &Path, config: &StorageBudgetConfig) -> Result<u64, SummarizerError> {
    let max_bytes = (config.max_storage_gb * 1024.0 * 1024.0 * 1024.0) as u64;
    let trigger_bytes = (max_bytes as f64 * config.cleanup_trigger_pct) as u64;

    let mut entries: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
    let mut total: u64 = 0;

    let read_dir = std::fs::read_dir(storage_root)
        .map_err(|e| SummarizerError::extraction(ExtractionErrorKind::StorageFull, format!("cannot read storage root: {e}")))?;

    for entry in read_dir.flatten() {
        let Ok(metadata) = entry.metadata() else { continue };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else { continue };
        total += metadata.len();
        entries.push((entry.path(), metadata.len(), modified));
    }

    if total <= trigger_bytes {
        return Ok(total);
    }

    entries.sort_by_key(|(_, _, modified)| *modified);
    let retention = Duration::from_secs(config.retention_days as u64 * 86_400);
    let now = std::time::SystemTime::now();
    let mut freed = 0u64;

    for (path, size, modified) in entries {
        if total - freed <= trigger_bytes {
            break;
        }
        let age = now.duration_since(modified).unwrap_or_default();
        if age < retention {
            continue;
        }
        if std::fs::remove_file(&path).is_ok() {
            freed += size;
        }
    }

    Ok(total.saturating_sub(freed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vtt_strips_cue_timing_and_markup() {
        let vtt = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\n<c>Hello</c> world\n\n2\n00:00:02.000 --> 00:00:04.000\nhow are you";
        let text = parse_vtt(vtt);
        assert_eq!(text, "Hello world how are you");
    }

    #[test]
    fn test_parse_vtt_dedupes_repeated_auto_caption_lines() {
        let vtt = "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nsame line\n\n00:00:02.000 --> 00:00:04.000\nsame line\n\n00:00:04.000 --> 00:00:06.000\nnew line";
        let text = parse_vtt(vtt);
        assert_eq!(text, "same line new line");
    }

    #[test]
    fn test_build_metadata_header_format() {
        let header = build_metadata_header("My Video", "My Channel", Some(3725), Some("1080p"));
        assert_eq!(header, "My Video | My Channel | 1:02:05 | 1080p");
    }

    #[test]
    fn test_build_metadata_header_short_duration() {
        let header = build_metadata_header("Short", "Chan", Some(90), Some("720p"));
        assert_eq!(header, "Short | Chan | 1:30 | 720p");
    }

    #[test]
    fn test_classify_downloader_failure_age_restricted() {
        let err = classify_downloader_failure("ERROR: Sign in to confirm your age, this video may be inappropriate for some users - age restricted content");
        assert_eq!(err.category(), "extraction_age_restricted");
    }

    #[test]
    fn test_storage_budget_noop_when_under_trigger() {
        let dir = std::env::temp_dir().join(format!("yt-budget-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.mp4"), b"small").unwrap();

        let config = StorageBudgetConfig {
            max_storage_gb: 10.0,
            cleanup_trigger_pct: 0.9,
            retention_days: 30,
        };
        let usage = enforce_storage_budget(&dir, &config).unwrap();
        assert!(usage > 0);
        assert!(dir.join("a.mp4").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
