//! Error types for the rageval core.
//!
//! Uses `thiserror` for public API error types. Configuration errors are fatal
//! and surface before any scoring starts; scorer and per-record errors are
//! recovered locally and recorded as data on the result structure.

use std::path::PathBuf;

/// Top-level error type for the rageval core library.
#[derive(Debug, thiserror::Error)]
pub enum RagEvalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scorer error: {0}")]
    Scorer(#[from] ScorerError),

    #[error("Judge error: {0}")]
    Judge(#[from] JudgeError),

    #[error("Result store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while building the metric registry or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown metric: {name}")]
    UnknownMetric { name: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Errors from a single scorer invocation. Never fatal to a batch.
#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("Precondition failed for '{metric}': {reason}")]
    Precondition { metric: String, reason: String },

    #[error("Scorer '{metric}' timed out after {timeout_ms}ms")]
    Timeout { metric: String, timeout_ms: u64 },

    #[error("Judge call failed: {0}")]
    Judge(#[from] JudgeError),

    #[error("Malformed judge response: {message}")]
    MalformedResponse { message: String },

    #[error("Embedding failed: {message}")]
    Embedding { message: String },

    #[error("Scorer task aborted: {message}")]
    Aborted { message: String },
}

/// Errors from LLM judge interactions.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from loading or saving a result store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read results from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write results to {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Results file {path} is not valid: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// A type alias for results using the top-level `RagEvalError`.
pub type Result<T> = std::result::Result<T, RagEvalError>;
