//! Shared configuration loader for summarizer services.
//!
//! Provides a unified configuration loading system with environment variable
//! parsing, validation, and `.env` file support. All configuration uses the
//! `SUMMARIZER_` prefix for environment variables.
//!
//! # Example
//!
//! ```no_run
//! use summarizer_core::config::{ConfigLoader, DatabaseConfig, RedisConfig, ServiceConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! dotenvy::dotenv().ok();
//!
//! let db_config = DatabaseConfig::from_env()?;
//! db_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::CoreError;
use std::time::Duration;

/// Configuration loader trait.
///
/// Standardizes loading configuration from environment variables and
/// validating the resulting values.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything optional.
    fn from_env() -> Result<Self, CoreError>;

    /// Validate configuration values (ranges, required combinations).
    fn validate(&self) -> Result<(), CoreError>;
}

/// Database configuration.
///
/// The store is a local SQLite file (see SPEC_FULL.md §3) rather than a
/// networked database, matching the single-node/single-operator framing.
///
/// # Environment Variables
///
/// - `SUMMARIZER_DATABASE_URL` (optional): SQLite connection URL (default: `sqlite://summarizer.db`)
/// - `SUMMARIZER_DATABASE_MAX_CONNECTIONS` (optional, default 10)
/// - `SUMMARIZER_DATABASE_CONNECT_TIMEOUT` (optional, seconds, default 30)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://summarizer.db".to_string(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ConfigLoader for DatabaseConfig {
    fn from_env() -> Result<Self, CoreError> {
        let url = std::env::var("SUMMARIZER_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| DatabaseConfig::default().url);

        let max_connections = parse_env_var(
            "SUMMARIZER_DATABASE_MAX_CONNECTIONS",
            DatabaseConfig::default().max_connections,
        )?;

        let connect_timeout_secs = parse_env_var("SUMMARIZER_DATABASE_CONNECT_TIMEOUT", 30u64)?;

        Ok(Self {
            url,
            max_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.url.is_empty() {
            return Err(CoreError::configuration(
                "database url must not be empty",
                Some("SUMMARIZER_DATABASE_URL"),
            ));
        }
        if self.max_connections == 0 {
            return Err(CoreError::configuration(
                "max_connections must be greater than 0",
                Some("SUMMARIZER_DATABASE_MAX_CONNECTIONS"),
            ));
        }
        if self.connect_timeout.as_secs() == 0 {
            return Err(CoreError::configuration(
                "connect_timeout must be greater than 0 seconds",
                Some("SUMMARIZER_DATABASE_CONNECT_TIMEOUT"),
            ));
        }
        Ok(())
    }
}

/// Redis configuration, used only by the shared idempotency/lock backend
/// and the circuit breaker's optional crash-survivable persistence. Both
/// are optional; absence of `SUMMARIZER_REDIS_URL` means the process falls
/// back to in-memory backends.
///
/// # Environment Variables
///
/// - `SUMMARIZER_REDIS_URL` (optional)
/// - `SUMMARIZER_REDIS_REQUIRED` (optional, default false): fail loud instead
///   of falling back when the shared backend cannot be reached.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub required: bool,
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            required: false,
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl ConfigLoader for RedisConfig {
    fn from_env() -> Result<Self, CoreError> {
        let url = std::env::var("SUMMARIZER_REDIS_URL").ok();
        let required = parse_env_var("SUMMARIZER_REDIS_REQUIRED", false)?;
        let connection_timeout_secs =
            parse_env_var("SUMMARIZER_REDIS_CONNECTION_TIMEOUT", 10u64)?;

        Ok(Self {
            url,
            required,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.required && self.url.is_none() {
            return Err(CoreError::configuration(
                "SUMMARIZER_REDIS_URL must be set when SUMMARIZER_REDIS_REQUIRED=true",
                Some("SUMMARIZER_REDIS_URL"),
            ));
        }
        Ok(())
    }
}

/// Service-process configuration: bind address for the health/metrics
/// surface and logging format. Not the summarization submission surface,
/// which is a library API (see SPEC_FULL.md §6).
///
/// # Environment Variables
///
/// - `SUMMARIZER_SERVICE_HOST` (default `0.0.0.0`)
/// - `SUMMARIZER_SERVICE_PORT` (default `8080`)
/// - `SUMMARIZER_LOG_FORMAT` (`json` | `pretty`, default `json`)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_format: LogFormat::Json,
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, CoreError> {
        let host = std::env::var("SUMMARIZER_SERVICE_HOST")
            .unwrap_or_else(|_| ServiceConfig::default().host);
        let port = parse_env_var("SUMMARIZER_SERVICE_PORT", ServiceConfig::default().port)?;
        let log_format = match std::env::var("SUMMARIZER_LOG_FORMAT")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Ok(Self {
            host,
            port,
            log_format,
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.port == 0 {
            return Err(CoreError::configuration(
                "port must be greater than 0",
                Some("SUMMARIZER_SERVICE_PORT"),
            ));
        }
        Ok(())
    }
}

/// Parse an environment variable with a typed default.
fn parse_env_var<T>(key: &str, default: T) -> Result<T, CoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| CoreError::configuration(format!("failed to parse {}: {}", key, e), Some(key)))
        })
        .unwrap_or(Ok(default))
}

/// Load a `.env` file if present. Never errors if one is missing.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://summarizer.db");
        assert_eq!(config.max_connections, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_config_rejects_zero_connections() {
        let mut config = DatabaseConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_config_optional_by_default() {
        let config = RedisConfig::default();
        assert!(config.url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_config_required_without_url_fails() {
        let config = RedisConfig {
            url: None,
            required: true,
            connection_timeout: Duration::from_secs(10),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_service_config_rejects_zero_port() {
        let mut config = ServiceConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());
    }
}
