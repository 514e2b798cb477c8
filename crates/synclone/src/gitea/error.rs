//! Error types for Gitea API operations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;
use crate::platform::PlatformError;

/// Errors that can occur when interacting with the Gitea API.
#[derive(Debug, Error)]
pub enum GiteaError {
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

    #[error("Organization not found: {0}")]
    OrgNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GiteaError> for PlatformError {
    fn from(err: GiteaError) -> Self {
        match err {
            GiteaError::Http(e) => PlatformError::network(e.to_string()),
            GiteaError::Json(e) => PlatformError::internal(format!("JSON parse error: {e}")),
            GiteaError::Api { status, message } => PlatformError::api(status, message),
            GiteaError::RateLimited {
                reset_at,
                retry_after,
            } => PlatformError::RateLimited {
                reset_at,
                retry_after,
            },
            GiteaError::Auth(message) => PlatformError::auth(message),
            GiteaError::OrgNotFound(org) => PlatformError::not_found(format!("organization: {org}")),
            GiteaError::Config(message) => PlatformError::config(message),
        }
    }
}

/// Get a short error message suitable for display.
pub fn short_error_message(err: &GiteaError) -> String {
    match err {
        GiteaError::Http(_) => "Network error".to_string(),
        GiteaError::Json(_) => "JSON parse error".to_string(),
        GiteaError::Api { status, message } => {
            if message.chars().count() > 50 {
                let truncated: String = message.chars().take(47).collect();
                format!("HTTP {status}: {truncated}...")
            } else {
                format!("HTTP {status}: {message}")
            }
        }
        GiteaError::RateLimited { .. } => "Rate limited".to_string(),
        GiteaError::Auth(_) => "Authentication failed".to_string(),
        GiteaError::OrgNotFound(org) => format!("Org not found: {org}"),
        GiteaError::Config(msg) => format!("Config: {msg}"),
    }
}
