//! GitLab API data types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// GitLab project, limited to the fields a sync needs.
///
/// API docs: https://docs.gitlab.com/ee/api/groups.html#list-a-groups-projects
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    pub id: u64,
    pub name: String,
    /// URL slug; used for the local directory name.
    pub path: String,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
    /// `public`, `internal` or `private`.
    pub visibility: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub star_count: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub namespace: GitLabNamespace,
    /// Present only for forks.
    pub forked_from_project: Option<ForkedFrom>,
    pub statistics: Option<ProjectStatistics>,
    pub http_url_to_repo: String,
    pub ssh_url_to_repo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabNamespace {
    pub full_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkedFrom {
    pub id: u64,
}

/// Only returned when `statistics=true` and the token can see them.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectStatistics {
    /// Repository size in bytes.
    pub repository_size: Option<u64>,
}

/// Response of `GET /user`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    pub username: String,
    pub name: Option<String>,
}
