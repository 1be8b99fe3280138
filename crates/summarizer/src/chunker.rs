//! Token-aware content segmentation (C5, spec.md §4.5). Splits long content
//! on paragraph boundaries so each chunk fits the primary model's window,
//! never cutting a sentence in half.
//!
//! Token counts are approximated by byte length (spec.md §5: "approximate by
//! byte length when an exact count is not critical") rather than running a
//! real tokenizer, avoiding materializing a second full copy of the body to
//! count it precisely.

use once_cell::sync::Lazy;
use regex::Regex;

/// Rough chars-per-token ratio for English prose; good enough for chunk
/// sizing, not for billing.
const CHARS_PER_TOKEN: usize = 4;

static SENTENCE_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?][\s]+").unwrap());

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub chunk_token_cap: usize,
    pub max_chunks: usize,
    pub primary_model_window_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_token_cap: 4_000,
            max_chunks: 12,
            primary_model_window_tokens: 120_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub metadata_header: Option<String>,
    pub approx_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPlan {
    /// Content fits the primary model window as a single call.
    Single,
    /// Split into the returned number of chunks plus one reduce call.
    Chunked { chunk_count: usize },
    /// Content is too large even chunked; route straight to the
    /// long-context model.
    LongContext,
}

pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Decide how `content` (combined with a fixed prompt overhead) should
    /// be routed, without doing the split yet.
    pub fn plan(&self, content: &str, prompt_overhead_tokens: usize) -> ChunkPlan {
        let content_tokens = estimate_tokens(content);
        let total = content_tokens + prompt_overhead_tokens;

        if total <= self.config.primary_model_window_tokens {
            return ChunkPlan::Single;
        }

        let max_coverable_tokens = self.config.chunk_token_cap * self.config.max_chunks;
        if content_tokens > max_coverable_tokens {
            return ChunkPlan::LongContext;
        }

        let chunk_count = content_tokens.div_ceil(self.config.chunk_token_cap).max(2);
        ChunkPlan::Chunked { chunk_count }
    }

    /// Split `content` into chunks on paragraph boundaries, falling back to
    /// sentence boundaries within an oversized paragraph. Never splits a
    /// sentence; preserves reading order; zero overlap.
    pub fn split(&self, content: &str, metadata_header: Option<&str>) -> Vec<Chunk> {
        let paragraphs: Vec<&str> = content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for paragraph in paragraphs {
            let paragraph_tokens = estimate_tokens(paragraph);

            if paragraph_tokens > self.config.chunk_token_cap {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                    current_tokens = 0;
                }
                for piece in split_oversized_paragraph(paragraph, self.config.chunk_token_cap) {
                    chunks.push(piece);
                }
                continue;
            }

            if current_tokens + paragraph_tokens > self.config.chunk_token_cap && !current.is_empty()
            {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            current_tokens += paragraph_tokens;
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        if chunks.is_empty() {
            chunks.push(content.to_string());
        }

        chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let approx_tokens = estimate_tokens(&text);
                Chunk {
                    index,
                    text,
                    metadata_header: metadata_header.map(str::to_string),
                    approx_tokens,
                }
            })
            .collect()
    }
}

/// Split a single paragraph that alone exceeds the chunk cap, on sentence
/// boundaries only.
fn split_oversized_paragraph(paragraph: &str, token_cap: usize) -> Vec<String> {
    let mut sentences: Vec<&str> = Vec::new();
    let mut last_end = 0;
    for m in SENTENCE_BOUNDARY_RE.find_iter(paragraph) {
        sentences.push(&paragraph[last_end..m.end()]);
        last_end = m.end();
    }
    if last_end < paragraph.len() {
        sentences.push(&paragraph[last_end..]);
    }
    if sentences.is_empty() {
        sentences.push(paragraph);
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for sentence in sentences {
        let sentence_tokens = estimate_tokens(sentence);
        if current_tokens + sentence_tokens > token_cap && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push_str(sentence);
        current_tokens += sentence_tokens;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
