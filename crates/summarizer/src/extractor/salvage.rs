//! Direct HTML salvage fallback (spec.md §4.4, web path step 2): used when
//! the scraper returns empty or sub-quality markdown. A bounded HTTP GET
//! plus a local, dependency-free boilerplate strip, since pulling in a
//! full headless-browser/readability crate for the fallback path alone
//! isn't worth the weight.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::error::{ExtractionErrorKind, SummarizerError};

static TAG_STRIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|nav|header|footer|aside|noscript|form)[^>]*>.*?</\1>").unwrap()
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub async fn fetch(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<String, SummarizerError> {
    let response = tokio::time::timeout(timeout, client.get(url).send())
        .await
        .map_err(|_| SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, "salvage GET timed out"))?
        .map_err(|e| SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, e.to_string()))?;

    if !response.status().is_success() {
        return Err(SummarizerError::extraction(
            ExtractionErrorKind::NetworkTimeout,
            format!("salvage GET returned status {}", response.status()),
        ));
    }

    let html = tokio::time::timeout(timeout, response.text())
        .await
        .map_err(|_| SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, "salvage body read timed out"))?
        .map_err(|e| SummarizerError::extraction(ExtractionErrorKind::NetworkTimeout, e.to_string()))?;

    Ok(strip_boilerplate(&html))
}

/// Strip script/style/nav/header/footer blocks, then all remaining tags,
/// collapsing whitespace left behind.
pub fn strip_boilerplate(html: &str) -> String {
    let without_blocks = TAG_STRIP_RE.replace_all(html, "");
    let without_tags = TAG_RE.replace_all(&without_blocks, "\n");
    let decoded = decode_basic_entities(&without_tags);
    let collapsed = WHITESPACE_RE.replace_all(&decoded, " ");
    let collapsed = BLANK_LINES_RE.replace_all(&collapsed, "\n\n");
    collapsed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn decode_basic_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
