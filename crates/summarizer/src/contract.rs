//! Summary contract (C7, spec.md §4.7): repair then validate a parsed
//! payload against the fixed field table, collecting every violation
//! instead of stopping at the first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::{Entities, SummaryPayload};

static SENTENCE_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s").unwrap());
static TAG_CHARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Coerce numeric fields an LLM returned as JSON strings (e.g.
/// `"estimated_reading_time_min": "4"`) back into JSON numbers, in place,
/// before the payload is deserialized into its typed form. Must run before
/// `serde_json::from_value` or a stringified number fails deserialization
/// outright and `repair`/`validate` never see the payload at all.
pub fn coerce_stringified_numbers(value: &mut serde_json::Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if let Some(v) = obj.get_mut("estimated_reading_time_min") {
        coerce_number_in_place(v);
    }
    if let Some(readability) = obj.get_mut("readability").and_then(|r| r.as_object_mut()) {
        if let Some(v) = readability.get_mut("score") {
            coerce_number_in_place(v);
        }
    }
}

fn coerce_number_in_place(value: &mut serde_json::Value) {
    if let serde_json::Value::String(s) = value {
        if let Ok(n) = s.trim().parse::<f64>() {
            if let Some(num) = serde_json::Number::from_f64(n) {
                *value = serde_json::Value::Number(num);
            }
        }
    }
}

/// Trim, canonicalize tags, dedupe arrays, truncate overlong strings at a
/// sentence boundary, fill missing optional fields. Applied once, before
/// validation, never changing a payload that's already conformant.
pub fn repair(payload: &mut SummaryPayload) {
    payload.summary_250 = truncate_at_sentence_boundary(payload.summary_250.trim(), 250);
    payload.summary_1000 = truncate_at_sentence_boundary(payload.summary_1000.trim(), 1000);
    payload.tldr = payload.tldr.trim().to_string();

    payload.key_ideas = dedupe_preserve_order(payload.key_ideas.iter().map(|s| s.trim().to_string()));
    payload.topic_tags = dedupe_preserve_order(payload.topic_tags.iter().map(|t| canonicalize_tag(t)));
    payload.seo_keywords = dedupe_preserve_order(payload.seo_keywords.iter().map(|s| s.trim().to_lowercase()));
    payload.answered_questions = dedupe_preserve_order(payload.answered_questions.iter().map(|s| s.trim().to_string()));

    payload.entities.people = dedupe_case_insensitive(&payload.entities.people);
    payload.entities.organizations = dedupe_case_insensitive(&payload.entities.organizations);
    payload.entities.locations = dedupe_case_insensitive(&payload.entities.locations);

    if payload.estimated_reading_time_min < 1 {
        payload.estimated_reading_time_min = 1;
    }
}

fn canonicalize_tag(raw: &str) -> String {
    let stripped = raw.trim().trim_start_matches('#').to_lowercase();
    let cleaned = TAG_CHARS_RE.replace_all(&stripped, "").to_string();
    format!("#{cleaned}")
}

fn dedupe_preserve_order<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

fn dedupe_case_insensitive(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.to_lowercase()) {
            out.push(item.clone());
        }
    }
    out
}

/// Truncate `text` to at most `max_chars`, cutting at the last sentence
/// boundary at or before the limit; never mid-word. Falls back to the last
/// whitespace boundary if no sentence boundary exists within the budget.
fn truncate_at_sentence_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();

    let last_boundary = SENTENCE_BOUNDARY_RE
        .find_iter(&truncated)
        .last()
        .map(|m| m.end());

    match last_boundary {
        Some(end) => truncated[..end].trim_end().to_string(),
        None => match truncated.rfind(char::is_whitespace) {
            Some(idx) => truncated[..idx].trim_end().to_string(),
            None => truncated,
        },
    }
}

/// Validate every field, returning every violation (never short-circuits).
pub fn validate(payload: &SummaryPayload) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if payload.summary_250.chars().count() > 250 {
        errors.push(FieldError::new("summary_250", "exceeds 250 characters"));
    }
    if payload.summary_250.trim().is_empty() {
        errors.push(FieldError::new("summary_250", "must not be empty"));
    }

    if payload.summary_1000.chars().count() > 1000 {
        errors.push(FieldError::new("summary_1000", "exceeds 1000 characters"));
    }
    if !payload.summary_1000.trim().is_empty() && payload.summary_1000.trim() == payload.summary_250.trim() {
        errors.push(FieldError::new("summary_1000", "must not reuse summary_250 verbatim"));
    }

    if payload.tldr.trim().is_empty() {
        errors.push(FieldError::new("tldr", "must not be empty"));
    }
    let tldr_trimmed = payload.tldr.trim();
    if tldr_trimmed == payload.summary_250.trim() || tldr_trimmed == payload.summary_1000.trim() {
        errors.push(FieldError::new("tldr", "must not duplicate either summary"));
    }

    validate_bounded_word_list(&payload.key_ideas, "key_ideas", 3, 8, 3, 10, &mut errors);

    if payload.topic_tags.len() < 3 || payload.topic_tags.len() > 10 {
        errors.push(FieldError::new("topic_tags", format!("must have 3-10 entries, got {}", payload.topic_tags.len())));
    }
    for tag in &payload.topic_tags {
        if !tag.starts_with('#') {
            errors.push(FieldError::new("topic_tags", format!("'{tag}' must start with '#'")));
        }
        if tag.chars().any(|c| c.is_uppercase()) {
            errors.push(FieldError::new("topic_tags", format!("'{tag}' must be lowercase")));
        }
        if tag.len() > 1 && tag[1..].chars().any(|c| !c.is_alphanumeric() && c != '_') {
            errors.push(FieldError::new("topic_tags", format!("'{tag}' must contain no punctuation beyond the leading '#'")));
        }
    }
    if has_case_insensitive_duplicates(&payload.topic_tags) {
        errors.push(FieldError::new("topic_tags", "must be deduped"));
    }

    validate_entities(&payload.entities, &mut errors);

    if payload.estimated_reading_time_min < 1 {
        errors.push(FieldError::new("estimated_reading_time_min", "must be >= 1"));
    }

    for (idx, stat) in payload.key_stats.iter().enumerate() {
        if stat.label.trim().is_empty() {
            errors.push(FieldError::new(format!("key_stats[{idx}].label"), "must not be empty"));
        }
        if stat.value.trim().is_empty() {
            errors.push(FieldError::new(format!("key_stats[{idx}].value"), "must not be empty"));
        }
    }

    if payload.readability.method.trim().is_empty() {
        errors.push(FieldError::new("readability.method", "must not be empty"));
    }
    if payload.readability.level.trim().is_empty() {
        errors.push(FieldError::new("readability.level", "must not be empty"));
    }

    if payload.seo_keywords.len() < 3 || payload.seo_keywords.len() > 10 {
        errors.push(FieldError::new("seo_keywords", format!("must have 3-10 entries, got {}", payload.seo_keywords.len())));
    }
    if has_case_insensitive_duplicates(&payload.seo_keywords) {
        errors.push(FieldError::new("seo_keywords", "must be deduped"));
    }

    errors
}

fn validate_bounded_word_list(
    items: &[String],
    field: &str,
    min_count: usize,
    max_count: usize,
    min_words: usize,
    max_words: usize,
    errors: &mut Vec<FieldError>,
) {
    if items.len() < min_count || items.len() > max_count {
        errors.push(FieldError::new(field, format!("must have {min_count}-{max_count} entries, got {}", items.len())));
    }
    for (idx, item) in items.iter().enumerate() {
        let word_count = item.split_whitespace().count();
        if word_count < min_words || word_count > max_words {
            errors.push(FieldError::new(
                format!("{field}[{idx}]"),
                format!("must be {min_words}-{max_words} words, got {word_count}"),
            ));
        }
    }
    if has_case_insensitive_duplicates(items) {
        errors.push(FieldError::new(field, "must be deduped"));
    }
}

fn validate_entities(entities: &Entities, errors: &mut Vec<FieldError>) {
    for (field, list) in [
        ("entities.people", &entities.people),
        ("entities.organizations", &entities.organizations),
        ("entities.locations", &entities.locations),
    ] {
        if has_case_insensitive_duplicates(list) {
            errors.push(FieldError::new(field, "must be deduped case-insensitively"));
        }
    }
}

fn has_case_insensitive_duplicates(items: &[String]) -> bool {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.to_lowercase()) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KeyStat, Readability};

    fn valid_payload() -> SummaryPayload {
        SummaryPayload {
            summary_250: "A short summary of the article.".to_string(),
            summary_1000: "A much longer summary that restates the article in more detail across several sentences.".to_string(),
            tldr: "In short, the article covers a specific topic in depth.".to_string(),
            key_ideas: vec!["first key idea here".to_string(), "second distinct idea".to_string(), "a third point worth noting".to_string()],
            topic_tags: vec!["#news".to_string(), "#technology".to_string(), "#analysis".to_string()],
            entities: Entities {
                people: vec!["Jane Doe".to_string()],
                organizations: vec!["Acme Corp".to_string()],
                locations: vec!["Springfield".to_string()],
            },
            estimated_reading_time_min: 4,
            key_stats: vec![KeyStat {
                label: "Revenue".to_string(),
                value: "1.2M".to_string(),
                unit: Some("USD".to_string()),
                source_excerpt: None,
            }],
            answered_questions: vec!["What happened?".to_string()],
            readability: Readability {
                method: "flesch_kincaid".to_string(),
                score: 62.0,
                level: "standard".to_string(),
            },
            seo_keywords: vec!["news".to_string(), "technology".to_string(), "analysis".to_string()],
        }
    }

    #[test]
    fn test_valid_payload_passes() {
        assert!(validate(&valid_payload()).is_empty());
    }

    #[test]
    fn test_summary_250_too_long_is_reported() {
        let mut payload = valid_payload();
        payload.summary_250 = "x".repeat(300);
        let errors = validate(&payload);
        assert!(errors.iter().any(|e| e.field == "summary_250"));
    }

    #[test]
    fn test_summary_1000_reusing_summary_250_is_reported() {
        let mut payload = valid_payload();
        payload.summary_1000 = payload.summary_250.clone();
        let errors = validate(&payload);
        assert!(errors.iter().any(|e| e.field == "summary_1000"));
    }

    #[test]
    fn test_collects_multiple_errors_without_short_circuiting() {
        let mut payload = valid_payload();
        payload.summary_250 = "x".repeat(300);
        payload.topic_tags = vec!["#one".to_string()];
        let errors = validate(&payload);
        assert!(errors.iter().any(|e| e.field == "summary_250"));
        assert!(errors.iter().any(|e| e.field == "topic_tags"));
    }

    #[test]
    fn test_repair_canonicalizes_tags() {
        let mut payload = valid_payload();
        payload.topic_tags = vec!["News!".to_string(), "#News".to_string(), "TECH".to_string()];
        repair(&mut payload);
        assert_eq!(payload.topic_tags, vec!["#news".to_string(), "#tech".to_string()]);
    }

    #[test]
    fn test_repair_truncates_at_sentence_boundary() {
        let mut payload = valid_payload();
        let sentence = "This is a complete sentence that ends cleanly. ";
        payload.summary_250 = sentence.repeat(10);
        repair(&mut payload);
        assert!(payload.summary_250.chars().count() <= 250);
        assert!(payload.summary_250.ends_with('.'));
    }

    #[test]
    fn test_repair_dedupes_key_ideas() {
        let mut payload = valid_payload();
        payload.key_ideas = vec!["same idea here".to_string(), "same idea here".to_string(), "different one now".to_string()];
        repair(&mut payload);
        assert_eq!(payload.key_ideas.len(), 2);
    }

    #[test]
    fn test_coerce_stringified_numbers_converts_strings_in_place() {
        let mut value = serde_json::json!({
            "estimated_reading_time_min": "4",
            "readability": { "score": "62.5", "method": "flesch_kincaid", "level": "standard" },
        });
        coerce_stringified_numbers(&mut value);
        assert_eq!(value["estimated_reading_time_min"], serde_json::json!(4.0));
        assert_eq!(value["readability"]["score"], serde_json::json!(62.5));
    }

    #[test]
    fn test_coerce_stringified_numbers_leaves_real_numbers_alone() {
        let mut value = serde_json::json!({
            "estimated_reading_time_min": 4,
            "readability": { "score": 62.5 },
        });
        coerce_stringified_numbers(&mut value);
        assert_eq!(value["estimated_reading_time_min"], serde_json::json!(4));
        assert_eq!(value["readability"]["score"], serde_json::json!(62.5));
    }

    #[test]
    fn test_repair_dedupes_entities_case_insensitively() {
        let mut payload = valid_payload();
        payload.entities.people = vec!["Jane Doe".to_string(), "jane doe".to_string()];
        repair(&mut payload);
        assert_eq!(payload.entities.people.len(), 1);
    }
}
