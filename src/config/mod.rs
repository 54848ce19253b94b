//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading for the binary ([`Config`])
//! - Analysis parameters for the engine ([`EngineConfig`])
//! - Secure API key storage via [`SecretString`]
//!
//! # Example
//!
//! ```
//! use retention_reasoning::config::{Config, EngineConfig, SecretString};
//!
//! let config = Config {
//!     api_key: SecretString::new("sk-ant-example-key"),
//!     model: "claude-sonnet-4-20250514".to_string(),
//!     request_timeout_ms: 30_000,
//!     max_retries: 3,
//!     log_level: "info".to_string(),
//! };
//!
//! // API key is protected from accidental logging
//! let debug = format!("{config:?}");
//! assert!(debug.contains("<REDACTED>"));
//!
//! let engine = EngineConfig::default();
//! assert!((engine.alpha - 0.05).abs() < f64::EPSILON);
//! ```

mod secret;

pub use secret::SecretString;

use crate::error::ConfigError;

/// Default Anthropic model.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default LLM request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default maximum retry attempts for transient API errors.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Minimum accepted request timeout.
pub const MIN_TIMEOUT_MS: u64 = 1_000;

/// Maximum accepted request timeout.
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// Binary-level configuration.
///
/// Use [`Config::from_env`] to load configuration from environment variables.
/// The `api_key` field uses [`SecretString`] to prevent accidental logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Anthropic API key (protected from logging via [`SecretString`]).
    pub api_key: SecretString,
    /// Anthropic model to use.
    pub model: String,
    /// LLM request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum retry attempts for transient API errors.
    pub max_retries: u32,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `ANTHROPIC_API_KEY`
    ///
    /// Optional (with defaults):
    /// - `ANTHROPIC_MODEL` (default: `claude-sonnet-4-20250514`)
    /// - `REQUEST_TIMEOUT_MS` (default: `30000`)
    /// - `MAX_RETRIES` (default: `3`)
    /// - `LOG_LEVEL` (default: `info`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `ANTHROPIC_API_KEY` is missing or any
    /// numeric value fails to parse or falls outside its accepted range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "ANTHROPIC_API_KEY".to_string(),
            })?;

        let model =
            std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let request_timeout_ms = parse_env_u64("REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&request_timeout_ms) {
            return Err(ConfigError::InvalidValue {
                var: "REQUEST_TIMEOUT_MS".to_string(),
                reason: format!("must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"),
            });
        }

        let max_retries = u32::try_from(parse_env_u64("MAX_RETRIES", u64::from(DEFAULT_MAX_RETRIES))?)
            .map_err(|_| ConfigError::InvalidValue {
                var: "MAX_RETRIES".to_string(),
                reason: "too large".to_string(),
            })?;

        let log_level =
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            api_key,
            model,
            request_timeout_ms,
            max_retries,
            log_level,
        })
    }
}

fn parse_env_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            reason: format!("must be a positive integer, got {raw}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Analysis parameters for the reasoning engine.
///
/// These knobs govern the statistical kernel and the pipeline stages. The
/// defaults match the engine's documented semantics; callers override them
/// through the builder methods.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Significance threshold for all statistical tests.
    pub alpha: f64,
    /// Corrective re-prompts allowed after a schema-invalid LLM response.
    pub schema_retry_budget: u32,
    /// Minimum usable hypotheses after filtering; fewer fails the session.
    pub min_valid_hypotheses: usize,
    /// Maximum hypotheses kept from the generator.
    pub max_hypotheses: usize,
    /// Absolute correlation above which a column joins the confounder scan.
    pub correlation_threshold: f64,
    /// Soft wall-clock budget per statistical test, in milliseconds.
    pub test_budget_ms: u64,
    /// Minimum rows per treatment arm for propensity matching.
    pub min_rows_per_arm: usize,
    /// Minimum sample size for regression adjustment.
    pub min_rows_regression: usize,
    /// Matched-neighbor count for propensity matching.
    pub match_neighbors: usize,
}

impl EngineConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the significance threshold.
    #[must_use]
    pub const fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the schema retry budget.
    #[must_use]
    pub const fn with_schema_retry_budget(mut self, budget: u32) -> Self {
        self.schema_retry_budget = budget;
        self
    }

    /// Set the per-test wall-clock budget.
    #[must_use]
    pub const fn with_test_budget_ms(mut self, budget_ms: u64) -> Self {
        self.test_budget_ms = budget_ms;
        self
    }

    /// Set the correlation threshold for the confounder scan.
    #[must_use]
    pub const fn with_correlation_threshold(mut self, threshold: f64) -> Self {
        self.correlation_threshold = threshold;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            schema_retry_budget: 2,
            min_valid_hypotheses: 2,
            max_hypotheses: 10,
            correlation_threshold: 0.3,
            test_budget_ms: 10_000,
            min_rows_per_arm: 30,
            min_rows_regression: 50,
            match_neighbors: 5,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.alpha, 0.05);
        assert_eq!(config.schema_retry_budget, 2);
        assert_eq!(config.min_valid_hypotheses, 2);
        assert_eq!(config.max_hypotheses, 10);
        assert_eq!(config.correlation_threshold, 0.3);
        assert_eq!(config.test_budget_ms, 10_000);
        assert_eq!(config.min_rows_per_arm, 30);
        assert_eq!(config.min_rows_regression, 50);
        assert_eq!(config.match_neighbors, 5);
    }

    #[test]
    fn test_engine_config_builder_chain() {
        let config = EngineConfig::new()
            .with_alpha(0.01)
            .with_schema_retry_budget(4)
            .with_test_budget_ms(2_000)
            .with_correlation_threshold(0.5);
        assert_eq!(config.alpha, 0.01);
        assert_eq!(config.schema_retry_budget, 4);
        assert_eq!(config.test_budget_ms, 2_000);
        assert_eq!(config.correlation_threshold, 0.5);
    }

    #[test]
    fn test_config_debug_redacts_api_key() {
        let config = Config {
            api_key: SecretString::new("sk-ant-secret"),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("<REDACTED>"));
        assert!(!debug.contains("sk-ant-secret"));
    }

    #[test]
    fn test_parse_env_u64_default_when_unset() {
        let value = parse_env_u64("RETENTION_REASONING_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
