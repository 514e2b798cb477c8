//! Error types for GitLab API operations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;
use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited {
        reset_at: DateTime<Utc>,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GitLabError> for PlatformError {
    fn from(err: GitLabError) -> Self {
        match err {
            GitLabError::Http(e) => PlatformError::network(e.to_string()),
            GitLabError::Json(e) => PlatformError::internal(format!("JSON parse error: {e}")),
            GitLabError::Api { status, message } => PlatformError::api(status, message),
            GitLabError::RateLimited {
                reset_at,
                retry_after,
            } => PlatformError::RateLimited {
                reset_at,
                retry_after,
            },
            GitLabError::Auth(message) => PlatformError::auth(message),
            GitLabError::GroupNotFound(group) => {
                PlatformError::not_found(format!("group: {group}"))
            }
            GitLabError::Config(message) => PlatformError::config(message),
        }
    }
}
