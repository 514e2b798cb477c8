//! GitHub API data types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// GitHub repository, limited to the fields a sync needs.
///
/// API docs: https://docs.github.com/en/rest/repos/repos#list-organization-repositories
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: GitHubOwner,
    pub private: bool,
    /// `public`, `private` or `internal`; absent on older Enterprise servers.
    pub visibility: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    /// Size in KB.
    pub size: Option<u64>,
    pub stargazers_count: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub clone_url: String,
    pub ssh_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
}

/// Response of `GET /user`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub name: Option<String>,
}
