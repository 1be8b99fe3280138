//! Shared error type for ambient infrastructure concerns.
//!
//! Domain-level errors (extraction, LLM, contract validation) live in the
//! `summarizer` crate and carry their own taxonomy; this type only covers
//! the cross-cutting concerns owned by this crate: configuration, retry,
//! resilience, persistence plumbing, and audit logging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },

    #[error("validation error: {message}")]
    Validation { message: String, field: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("circuit breaker open for service '{0}'")]
    CircuitOpen(String),

    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn configuration(message: impl Into<String>, key: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: key.map(|s| s.to_string()),
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.into(),
        }
    }

    /// Whether this error represents a transient condition worth retrying.
    ///
    /// Mirrors the predicate shape `retry_with_backoff` expects: a plain
    /// function from `&E` to `bool`, not a method baked into the retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Network { .. } | CoreError::Database(_) | CoreError::Redis(_)
        )
    }
}
