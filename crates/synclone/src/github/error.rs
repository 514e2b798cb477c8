//! Error types for GitHub API operations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;
use crate::platform::PlatformError;

/// Errors that can occur when interacting with the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited {
        reset_at: DateTime<Utc>,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Organization not found: {0}")]
    OrgNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GitHubError> for PlatformError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Http(e) => PlatformError::network(e.to_string()),
            GitHubError::Json(e) => PlatformError::internal(format!("JSON parse error: {e}")),
            GitHubError::Api { status, message } => PlatformError::api(status, message),
            GitHubError::RateLimited {
                reset_at,
                retry_after,
            } => PlatformError::RateLimited {
                reset_at,
                retry_after,
            },
            GitHubError::Auth(message) => PlatformError::auth(message),
            GitHubError::OrgNotFound(org) => {
                PlatformError::not_found(format!("organization: {org}"))
            }
            GitHubError::Config(message) => PlatformError::config(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_platform_error() {
        let err: PlatformError = GitHubError::OrgNotFound("acme".to_string()).into();
        assert!(matches!(err, PlatformError::NotFound { ref resource } if resource.contains("acme")));

        let err: PlatformError = GitHubError::Auth("Bad credentials".to_string()).into();
        assert!(matches!(err, PlatformError::Auth { .. }));

        let err: PlatformError =
            GitHubError::Http(HttpError::Transport("connection refused".to_string())).into();
        assert!(err.is_retryable());

        let err: PlatformError = GitHubError::RateLimited {
            reset_at: Utc::now(),
            retry_after: None,
        }
        .into();
        assert!(err.is_rate_limited());
    }
}
