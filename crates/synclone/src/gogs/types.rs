//! Gogs API data types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Gogs repository.
///
/// Gogs predates Gitea's fork and reports fewer fields: no archive flag,
/// no language and no internal visibility.
#[derive(Debug, Clone, Deserialize)]
pub struct GogsRepo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: GogsUser,
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    pub default_branch: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
    pub stars_count: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
    pub clone_url: String,
    pub ssh_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GogsUser {
    /// Older Gogs releases only send `username`.
    #[serde(alias = "username")]
    pub login: String,
    pub full_name: Option<String>,
}
