//! Gitea API data types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Gitea repository - fields we need from the API response.
///
/// We define only the fields we need, which keeps the code resilient to
/// API changes across Gitea and Forgejo versions.
///
/// API docs: https://docs.gitea.com/api/1.20/#tag/organization/operation/orgListRepos
#[derive(Debug, Clone, Deserialize)]
pub struct GiteaRepo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: GiteaUser,
    pub private: bool,
    /// Limited to signed-in users of the instance.
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub empty: bool,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    /// Size in KB.
    pub size: Option<u64>,
    pub stars_count: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub clone_url: String,
    pub ssh_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GiteaUser {
    pub login: String,
    pub full_name: Option<String>,
}
