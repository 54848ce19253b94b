//! Error types for the retention reasoning engine.
//!
//! This module defines a hierarchical error system:
//! - [`EngineError`]: Top-level application errors
//! - [`LlmError`]: Anthropic API specific errors
//! - [`DataQualityError`]: Fatal dataset problems detected before analysis
//! - [`StageError`]: Pipeline stage execution errors
//! - [`SessionError`]: Session invariant violations
//! - [`ConfigError`]: Configuration errors
//!
//! All errors implement `Send + Sync` for async compatibility.
//!
//! Data-dependent problems inside a statistical test never surface here:
//! the kernel records them as warnings on the test result instead.

use thiserror::Error;

/// Top-level engine error.
///
/// This is the main error type returned by public API functions.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Anthropic API error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Fatal data-quality error.
    #[error("Data quality error: {0}")]
    DataQuality(#[from] DataQualityError),

    /// Pipeline stage error.
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Session invariant violation.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Anthropic API errors.
///
/// These errors represent failures when communicating with the Anthropic API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Authentication failed due to invalid API key.
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Request was rate limited.
    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// The requested model is overloaded.
    #[error("Model overloaded: {model}")]
    ModelOverloaded {
        /// The model that is overloaded.
        model: String,
    },

    /// Request timed out.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Invalid request parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what's invalid.
        message: String,
    },

    /// Network communication error.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// Unexpected response from the API.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what was unexpected.
        message: String,
    },
}

impl LlmError {
    /// Returns true if this error is retryable.
    ///
    /// Rate limiting, model overload, timeout, and network errors are
    /// retryable. Authentication and invalid request errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ModelOverloaded { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }
}

/// Fatal dataset problems.
///
/// These are detected by the profiler before any hypothesis generation and
/// fail the session immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataQualityError {
    /// The dataset has no rows.
    #[error("Dataset is empty")]
    EmptyTable,

    /// The outcome column named by the opportunity is absent.
    #[error("Outcome column not found: {column}")]
    MissingOutcome {
        /// The missing outcome column name.
        column: String,
    },

    /// The outcome column has only one unique value.
    #[error("Outcome column is degenerate (single unique value): {column}")]
    DegenerateOutcome {
        /// The degenerate outcome column name.
        column: String,
    },

    /// A catalog column is absent from the dataset.
    #[error("Column not found in dataset: {column}")]
    MissingColumn {
        /// The missing column name.
        column: String,
    },

    /// A column's length disagrees with the table's row count.
    #[error("Column length mismatch for {column}: expected {expected}, got {actual}")]
    ColumnLengthMismatch {
        /// The offending column name.
        column: String,
        /// Expected row count.
        expected: usize,
        /// Actual row count.
        actual: usize,
    },
}

/// Pipeline stage execution errors.
///
/// Thrown by the generator and analyzer on schema failures, and by any stage
/// on internal invariant violations. The orchestrator catches these, records
/// the message on the session, and transitions it to `failed`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageError {
    /// LLM output failed schema validation after all retries.
    #[error("Schema validation failed after {attempts} attempts: {message}")]
    SchemaViolation {
        /// Number of attempts made (including the initial one).
        attempts: u32,
        /// The last validation error.
        message: String,
    },

    /// The generator produced fewer than the required number of usable
    /// hypotheses.
    #[error("Insufficient hypotheses: fewer than {required} usable (found {found})")]
    InsufficientHypotheses {
        /// Usable hypotheses found after filtering.
        found: usize,
        /// Minimum required.
        required: usize,
    },

    /// JSON parsing failed.
    #[error("JSON parsing failed: {message}")]
    JsonParseFailed {
        /// Description of the parsing error.
        message: String,
    },

    /// Missing required field in an LLM response.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// Invalid value for a field.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// API is unavailable.
    #[error("API unavailable: {message}")]
    ApiUnavailable {
        /// Description of why the API is unavailable.
        message: String,
    },

    /// Stage exceeded its time budget.
    #[error("Stage timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },
}

/// Session invariant violations.
///
/// These indicate programming errors in stage code, not data problems.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A validation verdict was recorded twice for the same hypothesis.
    #[error("Verdict already recorded for hypothesis {hypothesis_id}")]
    VerdictAlreadyRecorded {
        /// The hypothesis whose verdict was already set.
        hypothesis_id: String,
    },

    /// A mutation was attempted on a session in a terminal status.
    #[error("Session is terminal ({status}) and cannot be mutated")]
    Terminal {
        /// The terminal status.
        status: String,
    },

    /// A hypothesis id was not found on the session.
    #[error("Hypothesis not found: {hypothesis_id}")]
    HypothesisNotFound {
        /// The unknown hypothesis id.
        hypothesis_id: String,
    },
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required configuration is missing.
    #[error("Missing required: {var}")]
    MissingRequired {
        /// The missing variable name.
        var: String,
    },

    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}
