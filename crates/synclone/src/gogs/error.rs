//! Error types for Gogs API operations.

use thiserror::Error;

use crate::http::HttpError;
use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum GogsError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited")]
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Organization not found: {0}")]
    OrgNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GogsError> for PlatformError {
    fn from(err: GogsError) -> Self {
        match err {
            GogsError::Http(e) => PlatformError::network(e.to_string()),
            GogsError::Json(e) => PlatformError::internal(format!("JSON parse error: {e}")),
            GogsError::Api { status, message } => PlatformError::api(status, message),
            GogsError::RateLimited { retry_after } => PlatformError::rate_limited(retry_after),
            GogsError::Auth(message) => PlatformError::auth(message),
            GogsError::OrgNotFound(org) => PlatformError::not_found(format!("organization: {org}")),
            GogsError::Config(message) => PlatformError::config(message),
        }
    }
}
