//! URL Canonicalizer (C1, spec.md §4.1). Normalizes free text into a list of
//! canonical URLs plus content-addressed dedupe hashes, or a rejection.
//!
//! Grounded in the teacher's `PlatformNormalizer` pattern of small, ordered,
//! independently-testable normalization steps, and `validation.rs`'s
//! `Lazy<Regex>` constants compiled once rather than per call.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

use hex;

use crate::models::RequestKind;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_SCAN_CHARS: usize = 50_000;

static TRACKING_PREFIXES: &[&str] = &["utm_"];
static TRACKING_KEYS: &[&str] = &[
    "gclid", "fbclid", "yclid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src", "ref_url",
];

static URL_EXTRACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>\x22']+|(?:^|\s)www\.[^\s<>\x22']+").unwrap());

static YOUTUBE_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:www\.|m\.|music\.)?(?:youtube\.com|youtube-nocookie\.com|youtu\.be)$").unwrap()
});

static YOUTUBE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

static HOST_BANNED_CHARS: &[char] = &['<', '>', '"', '\'', '@'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    EmptyHost,
    DisallowedScheme(String),
    BannedHostCharacter,
    ControlCharacter,
    PrivateOrReservedHost(String),
    DangerousScheme,
    TooLong,
    Unparseable,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::EmptyHost => write!(f, "missing host"),
            RejectionReason::DisallowedScheme(s) => write!(f, "disallowed scheme '{s}'"),
            RejectionReason::BannedHostCharacter => write!(f, "host contains a banned character"),
            RejectionReason::ControlCharacter => write!(f, "url contains a control character"),
            RejectionReason::PrivateOrReservedHost(h) => {
                write!(f, "host '{h}' is private, loopback, link-local or reserved")
            }
            RejectionReason::DangerousScheme => write!(f, "url contains a dangerous scheme or script marker"),
            RejectionReason::TooLong => write!(f, "url exceeds {MAX_URL_LENGTH} characters"),
            RejectionReason::Unparseable => write!(f, "url could not be parsed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CanonicalUrl {
    pub normalized: String,
    pub dedupe_hash: String,
    pub kind: RequestKind,
}

/// Whether free-text extraction hit the scan cap before reaching the end.
#[derive(Debug, Clone, Default)]
pub struct CanonicalizeReport {
    pub urls: Vec<CanonicalUrl>,
    pub rejections: Vec<(String, RejectionReason)>,
    pub truncated: bool,
}

pub struct UrlCanonicalizer;

impl UrlCanonicalizer {
    pub fn new() -> Self {
        Self
    }

    /// Validate and normalize a single URL, applying the ordered rules in
    /// spec.md §4.1.
    pub fn canonicalize_one(&self, raw: &str) -> Result<CanonicalUrl, RejectionReason> {
        if raw.len() > MAX_URL_LENGTH {
            return Err(RejectionReason::TooLong);
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(RejectionReason::ControlCharacter);
        }

        let lower = raw.to_ascii_lowercase();
        if lower.contains("<script") || lower.starts_with("javascript:") || lower.starts_with("data:")
            || lower.starts_with("file:")
        {
            return Err(RejectionReason::DangerousScheme);
        }

        // Rule 1: default scheme.
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };

        let mut url = Url::parse(&with_scheme).map_err(|_| RejectionReason::Unparseable)?;

        // Rule 2: scheme allowlist.
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RejectionReason::DisallowedScheme(url.scheme().to_string()));
        }

        let host = url.host_str().ok_or(RejectionReason::EmptyHost)?.to_string();
        if host.chars().any(|c| HOST_BANNED_CHARS.contains(&c) || c == '\0') {
            return Err(RejectionReason::BannedHostCharacter);
        }
        if is_private_or_reserved_host(&host) {
            return Err(RejectionReason::PrivateOrReservedHost(host));
        }

        // Rule 4: lowercase scheme/host (url crate already lowercases scheme;
        // host needs an explicit pass since labels aren't normalized by the
        // parser for all inputs).
        let _ = url.set_host(Some(&host.to_ascii_lowercase()));

        // Rule 5: remove fragment.
        url.set_fragment(None);

        // Rules 6-7: strip tracking params, sort remaining lexicographically.
        let mut kept: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in url.query_pairs() {
            let key = k.to_string();
            if TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
                || TRACKING_KEYS.contains(&key.as_str())
            {
                continue;
            }
            kept.entry(key).or_default().push(v.to_string());
        }
        if kept.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs = url::form_urlencoded::Serializer::new(String::new());
            for (k, values) in &kept {
                for v in values {
                    pairs.append_pair(k, v);
                }
            }
            url.set_query(Some(&pairs.finish()));
        }

        // Rule 9: collapse trailing slash on non-root paths.
        let path = url.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            url.set_path(path.trim_end_matches('/'));
        }

        let normalized = url.to_string();
        if normalized.len() > MAX_URL_LENGTH {
            return Err(RejectionReason::TooLong);
        }

        let dedupe_hash = dedupe_hash(&normalized);
        let kind = if is_youtube_url(&url) {
            RequestKind::UrlVideo
        } else {
            RequestKind::UrlWeb
        };

        Ok(CanonicalUrl {
            normalized,
            dedupe_hash,
            kind,
        })
    }

    /// Extract URLs from free text, validating each strictly. Text beyond
    /// [`MAX_SCAN_CHARS`] is not scanned; `truncated` reports whether that
    /// happened rather than silently dropping the remainder.
    pub fn extract_and_canonicalize(&self, text: &str) -> CanonicalizeReport {
        let mut report = CanonicalizeReport::default();
        let scan_window: &str = if text.len() > MAX_SCAN_CHARS {
            report.truncated = true;
            &text[..MAX_SCAN_CHARS]
        } else {
            text
        };

        for m in URL_EXTRACT_RE.find_iter(scan_window) {
            let candidate = m.as_str().trim();
            match self.canonicalize_one(candidate) {
                Ok(url) => report.urls.push(url),
                Err(reason) => report.rejections.push((candidate.to_string(), reason)),
            }
        }
        report
    }

    /// YouTube video id, if `url` is a recognized YouTube URL form.
    pub fn youtube_video_id(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        extract_youtube_id(&parsed)
    }
}

impl Default for UrlCanonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn dedupe_hash(normalized_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_youtube_url(url: &Url) -> bool {
    extract_youtube_id(url).is_some()
}

fn extract_youtube_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if !YOUTUBE_HOST_RE.is_match(host) {
        return None;
    }

    if host.ends_with("youtu.be") {
        let id = url.path().trim_start_matches('/');
        return YOUTUBE_ID_RE.is_match(id).then(|| id.to_string());
    }

    let path = url.path();
    for prefix in ["/shorts/", "/live/", "/embed/", "/v/"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            let id = rest.split('/').next().unwrap_or("");
            if YOUTUBE_ID_RE.is_match(id) {
                return Some(id.to_string());
            }
        }
    }

    if path == "/watch" {
        if let Some(id) = url.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.to_string()) {
            if YOUTUBE_ID_RE.is_match(&id) {
                return Some(id);
            }
        }
    }

    None
}

fn is_private_or_reserved_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return is_private_or_reserved_ip(&ip);
    }
    false
}

fn is_private_or_reserved_ip(ip: &std::net::IpAddr) -> bool {
    use std::net::IpAddr;
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_default_scheme() {
        let c = UrlCanonicalizer::new();
        let result = c.canonicalize_one("example.com/a").unwrap();
        assert!(result.normalized.starts_with("https://"));
    }

    #[test]
    fn test_strips_tracking_params_and_sorts_remaining() {
        let c = UrlCanonicalizer::new();
        let a = c
            .canonicalize_one("https://example.com/a?utm_source=x&id=1")
            .unwrap();
        let b = c.canonicalize_one("https://example.com/a?id=1").unwrap();
        assert_eq!(a.normalized, b.normalized);
        assert_eq!(a.dedupe_hash, b.dedupe_hash);
    }

    #[test]
    fn test_differing_path_gives_different_hash() {
        let c = UrlCanonicalizer::new();
        let a = c.canonicalize_one("https://example.com/a").unwrap();
        let b = c.canonicalize_one("https://example.com/b").unwrap();
        assert_ne!(a.dedupe_hash, b.dedupe_hash);
    }

    #[test]
    fn test_rejects_private_ip() {
        let c = UrlCanonicalizer::new();
        assert!(matches!(
            c.canonicalize_one("http://10.0.0.1/admin"),
            Err(RejectionReason::PrivateOrReservedHost(_))
        ));
    }

    #[test]
    fn test_rejects_loopback_literal() {
        let c = UrlCanonicalizer::new();
        assert!(c.canonicalize_one("http://localhost/").is_err());
        assert!(c.canonicalize_one("http://127.0.0.1/").is_err());
    }

    #[test]
    fn test_rejects_javascript_scheme() {
        let c = UrlCanonicalizer::new();
        assert!(matches!(
            c.canonicalize_one("javascript:alert(1)"),
            Err(RejectionReason::DangerousScheme)
        ));
    }

    #[test]
    fn test_idempotent_normalization() {
        let c = UrlCanonicalizer::new();
        let once = c
            .canonicalize_one("HTTPS://Example.COM/a/?utm_source=x&z=2&a=1#frag")
            .unwrap();
        let twice = c.canonicalize_one(&once.normalized).unwrap();
        assert_eq!(once.normalized, twice.normalized);
    }

    #[test]
    fn test_collapses_trailing_slash() {
        let c = UrlCanonicalizer::new();
        let result = c.canonicalize_one("https://example.com/a/").unwrap();
        assert!(result.normalized.ends_with("/a"));
    }

    #[test]
    fn test_detects_youtube_watch_url() {
        let c = UrlCanonicalizer::new();
        let result = c
            .canonicalize_one("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .unwrap();
        assert_eq!(result.kind, RequestKind::UrlVideo);
    }

    #[test]
    fn test_detects_youtube_short_url() {
        let c = UrlCanonicalizer::new();
        let result = c.canonicalize_one("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(result.kind, RequestKind::UrlVideo);
    }

    #[test]
    fn test_detects_youtube_shorts_url() {
        let c = UrlCanonicalizer::new();
        let result = c
            .canonicalize_one("https://youtube.com/shorts/dQw4w9WgXcQ")
            .unwrap();
        assert_eq!(result.kind, RequestKind::UrlVideo);
    }

    #[test]
    fn test_non_youtube_host_is_web_kind() {
        let c = UrlCanonicalizer::new();
        let result = c.canonicalize_one("https://example.com/article").unwrap();
        assert_eq!(result.kind, RequestKind::UrlWeb);
    }

    #[test]
    fn test_extract_from_free_text() {
        let c = UrlCanonicalizer::new();
        let report = c.extract_and_canonicalize(
            "check this out https://example.com/a?utm_source=x and also http://10.0.0.1/admin",
        );
        assert_eq!(report.urls.len(), 1);
        assert_eq!(report.rejections.len(), 1);
        assert!(!report.truncated);
    }

    #[test]
    fn test_rejects_too_long_url() {
        let c = UrlCanonicalizer::new();
        let long_path = "a".repeat(MAX_URL_LENGTH);
        let url = format!("https://example.com/{long_path}");
        assert!(matches!(
            c.canonicalize_one(&url),
            Err(RejectionReason::TooLong)
        ));
    }
}
