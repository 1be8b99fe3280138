//! Quality gate (C4.4.1, spec.md §4.4.1). Rejects extractor output that is
//! too short, too symbol-heavy, or mostly boilerplate to be worth
//! summarizing.

use crate::error::{ExtractionErrorKind, SummarizerError};

#[derive(Debug, Clone)]
pub struct QualityGateConfig {
    pub min_word_count: usize,
    pub max_non_alphanumeric_ratio: f64,
    pub min_unique_token_ratio: f64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_word_count: 50,
            max_non_alphanumeric_ratio: 0.4,
            min_unique_token_ratio: 0.2,
        }
    }
}

/// `Ok(())` if `text` clears the gate; otherwise the specific reason,
/// wrapped as `ExtractionErrorKind::QualityBelowThreshold`.
pub fn check(text: &str, config: &QualityGateConfig) -> Result<(), SummarizerError> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < config.min_word_count {
        return Err(SummarizerError::extraction(
            ExtractionErrorKind::QualityBelowThreshold,
            format!(
                "word count {} below minimum {}",
                words.len(),
                config.min_word_count
            ),
        ));
    }

    let total_chars = text.chars().count().max(1);
    let non_alphanumeric = text.chars().filter(|c| !c.is_alphanumeric() && !c.is_whitespace()).count();
    let ratio = non_alphanumeric as f64 / total_chars as f64;
    if ratio > config.max_non_alphanumeric_ratio {
        return Err(SummarizerError::extraction(
            ExtractionErrorKind::QualityBelowThreshold,
            format!("non-alphanumeric ratio {ratio:.2} exceeds threshold"),
        ));
    }

    let unique_ratio = unique_token_ratio(&words);
    if unique_ratio < config.min_unique_token_ratio {
        return Err(SummarizerError::extraction(
            ExtractionErrorKind::QualityBelowThreshold,
            format!("unique token ratio {unique_ratio:.2} suggests boilerplate/navigation content"),
        ));
    }

    Ok(())
}

fn unique_token_ratio(words: &[&str]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let mut seen = std::collections::HashSet::new();
    for word in words {
        seen.insert(word.to_ascii_lowercase());
    }
    seen.len() as f64 / words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_for_reasonable_prose() {
        let sentence = "The researchers studied climate patterns across several continents gathering \
            decades of rainfall temperature and wind measurements to build a clearer picture of how \
            regional weather systems interact with broader atmospheric circulation over time";
        let text = format!("{sentence}. {sentence}, revisited with fresh instruments and longer records.");
        assert!(check(&text, &QualityGateConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_too_short() {
        let text = "too short";
        let err = check(text, &QualityGateConfig::default()).unwrap_err();
        assert_eq!(err.category(), "extraction_quality_below_threshold");
    }

    #[test]
    fn test_rejects_mostly_symbols() {
        let text = "#$%^&*()_+ ".repeat(60);
        assert!(check(&text, &QualityGateConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_repetitive_navigation_like_text() {
        let text = "home home home home home home home ".repeat(20);
        assert!(check(&text, &QualityGateConfig::default()).is_err());
    }
}
