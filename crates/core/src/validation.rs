//! Generic validation primitives shared across crates.
//!
//! Domain-specific field rules (the summary contract's topic tags, key
//! stats, etc.) live in `summarizer::contract`, built on the same
//! `Lazy<Regex>` + `validate_*` idiom as this module, not on top of it —
//! the rules don't overlap.

use crate::error::CoreError;

/// Validate a string's length falls within `[min, max]` (inclusive).
///
/// # Examples
///
/// ```
/// use summarizer_core::validation::validate_string_length;
///
/// assert!(validate_string_length("hello", "field", Some(1), Some(10)).is_ok());
/// assert!(validate_string_length("hi", "field", Some(5), None).is_err());
/// ```
pub fn validate_string_length(
    value: &str,
    field: &str,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(), CoreError> {
    let len = value.chars().count();

    if let Some(min_len) = min {
        if len < min_len {
            return Err(CoreError::validation_field(
                format!(
                    "field '{}' must be at least {} characters, got {}",
                    field, min_len, len
                ),
                field,
            ));
        }
    }

    if let Some(max_len) = max {
        if len > max_len {
            return Err(CoreError::validation_field(
                format!(
                    "field '{}' must be at most {} characters, got {}",
                    field, max_len, len
                ),
                field,
            ));
        }
    }

    Ok(())
}

/// Validate a slice is not empty.
pub fn validate_not_empty<T>(values: &[T], field: &str) -> Result<(), CoreError> {
    if values.is_empty() {
        Err(CoreError::validation_field(
            format!("field '{}' must not be empty", field),
            field,
        ))
    } else {
        Ok(())
    }
}

/// Validate a numeric value falls within `[min, max]` (inclusive).
pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    value: T,
    field: &str,
    min: T,
    max: T,
) -> Result<(), CoreError> {
    if value < min || value > max {
        Err(CoreError::validation_field(
            format!(
                "field '{}' must be between {} and {}, got {}",
                field, min, max, value
            ),
            field,
        ))
    } else {
        Ok(())
    }
}
