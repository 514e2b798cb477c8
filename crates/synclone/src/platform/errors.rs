use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when interacting with a code platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// API error from the platform.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited {
        reset_at: DateTime<Utc>,
        retry_after: Option<Duration>,
    },

    /// Authentication required or failed.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Resource not found (org, group, etc.).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Invalid client configuration (bad host, missing token, etc.).
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Unexpected/internal error, including undecodable responses.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Rate limited with a one minute reset window.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        let wait = retry_after.unwrap_or(Duration::from_secs(60));
        let reset_at = Utc::now()
            + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::minutes(1));
        Self::RateLimited {
            reset_at,
            retry_after,
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Rate limits, network failures and 5xx responses are transient.
    /// Authentication, missing resources and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth { .. } | Self::NotFound { .. } | Self::Config { .. } | Self::Internal { .. } => {
                false
            }
        }
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Truncate an API error body so log lines stay readable.
pub(crate) fn truncate_message(message: &str) -> String {
    let message = message.trim();
    if message.chars().count() > 200 {
        let truncated: String = message.chars().take(197).collect();
        format!("{truncated}...")
    } else {
        message.to_string()
    }
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
