//! Errors raised while validating a run before any work starts.

use thiserror::Error;

/// Invalid run configuration. Always fatal, always raised before any
/// network call or filesystem change.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("concurrency must be between 1 and {max}, got {value}")]
    Concurrency { value: usize, max: usize },

    #[error("unknown strategy '{0}' (expected reset, pull, fetch, rebase, clone or skip)")]
    UnknownStrategy(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{field} must not be empty")]
    Missing { field: &'static str },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
