use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// The closed set of supported hosting platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
    Gitea,
    Gogs,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::GitHub,
        Provider::GitLab,
        Provider::Gitea,
        Provider::Gogs,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Gitea => "gitea",
            Provider::Gogs => "gogs",
        }
    }

    /// Public instance used when no host is configured.
    ///
    /// Gogs has no canonical public instance, so a host is mandatory.
    #[must_use]
    pub fn default_host(self) -> Option<&'static str> {
        match self {
            Provider::GitHub => Some("https://api.github.com"),
            Provider::GitLab => Some("https://gitlab.com"),
            Provider::Gitea => Some("https://gitea.com"),
            Provider::Gogs => None,
        }
    }

    /// Starting request budget (requests per second) for the adaptive limiter.
    #[must_use]
    pub fn default_rps(self) -> f64 {
        match self {
            Provider::GitHub => 10.0,
            Provider::GitLab => 5.0,
            Provider::Gitea | Provider::Gogs => 5.0,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" | "gh" => Ok(Provider::GitHub),
            "gitlab" | "gl" => Ok(Provider::GitLab),
            "gitea" | "forgejo" | "codeberg" => Ok(Provider::Gitea),
            "gogs" => Ok(Provider::Gogs),
            other => Err(format!(
                "unknown provider '{other}' (expected github, gitlab, gitea or gogs)"
            )),
        }
    }
}

/// Repository visibility as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    /// Visible to every authenticated user of the instance (GitLab, GitHub Enterprise).
    Internal,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        })
    }
}

/// Which visibilities a run includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityFilter {
    Public,
    /// Everything that is not public (private and internal).
    Private,
    #[default]
    All,
}

impl VisibilityFilter {
    #[must_use]
    pub fn allows(self, visibility: Visibility) -> bool {
        match self {
            VisibilityFilter::All => true,
            VisibilityFilter::Public => visibility == Visibility::Public,
            VisibilityFilter::Private => visibility != Visibility::Public,
        }
    }
}

impl FromStr for VisibilityFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(VisibilityFilter::Public),
            "private" => Ok(VisibilityFilter::Private),
            "all" | "" => Ok(VisibilityFilter::All),
            other => Err(format!(
                "unknown visibility '{other}' (expected public, private or all)"
            )),
        }
    }
}

impl fmt::Display for VisibilityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VisibilityFilter::Public => "public",
            VisibilityFilter::Private => "private",
            VisibilityFilter::All => "all",
        })
    }
}

/// Clone URLs for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneUrls {
    pub https: String,
    pub ssh: Option<String>,
}

/// Stable identity of a repository within the state store.
///
/// Formatted as `provider:namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryKey(String);

impl RepositoryKey {
    #[must_use]
    pub fn new(provider: Provider, namespace: &str, name: &str) -> Self {
        Self(format!("{provider}:{namespace}/{name}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepositoryKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A repository as listed by a platform, normalized across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub provider: Provider,
    /// The organization or top-level group the run targets.
    pub organization: String,
    /// Full owning path. Includes subgroups on GitLab.
    pub namespace: String,
    pub name: String,
    pub default_branch: String,
    pub visibility: Visibility,
    pub archived: bool,
    pub fork: bool,
    pub language: Option<String>,
    pub size_kb: Option<u64>,
    pub star_count: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Topics or tags attached on the platform. Empty when unsupported.
    #[serde(default)]
    pub topics: Vec<String>,
    pub clone_urls: CloneUrls,
}

impl RepositoryDescriptor {
    #[must_use]
    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(self.provider, &self.namespace, &self.name)
    }

    #[inline]
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Path segments between the target organization and the repository.
    ///
    /// Empty for flat providers; the subgroup chain for nested GitLab groups.
    #[must_use]
    pub fn subgroups(&self) -> Vec<&str> {
        let org_len = self.organization.len();
        let relative = match self.namespace.get(..org_len) {
            Some(head)
                if head.eq_ignore_ascii_case(&self.organization)
                    && (self.namespace.len() == org_len
                        || self.namespace[org_len..].starts_with('/')) =>
            {
                &self.namespace[org_len..]
            }
            _ => self.namespace.as_str(),
        };
        relative
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .collect()
    }
}

/// Rate limit information from a platform response.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed per period.
    pub limit: usize,
    /// Remaining requests in current period.
    pub remaining: usize,
    /// When the rate limit resets.
    pub reset_at: DateTime<Utc>,
    /// Server-requested wait before the next request, if any.
    pub retry_after: Option<Duration>,
}

/// One page of a repository listing.
#[derive(Debug, Clone, Default)]
pub struct RepoPage {
    pub items: Vec<RepositoryDescriptor>,
    /// The next page to request, `None` once the listing is exhausted.
    pub next_page: Option<u32>,
    pub rate_limit: Option<RateLimitInfo>,
}

/// The authenticated account behind a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub name: Option<String>,
}

/// Trait implemented by every provider client.
///
/// Implementors should:
/// - Return exactly one page per call; callers drive pagination
/// - Apply `visibility` server-side when the platform supports it
/// - Report rate-limit headers in [`RepoPage::rate_limit`]
/// - Convert platform-specific errors to `PlatformError`
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Largest page size the platform accepts.
    fn max_page_size(&self) -> u32 {
        100
    }

    /// Verify the configured token and return the account it belongs to.
    async fn authenticate(&self) -> Result<UserInfo>;

    /// List one page of repositories owned by `org`.
    async fn list_repositories(
        &self,
        org: &str,
        page: u32,
        page_size: u32,
        visibility: VisibilityFilter,
    ) -> Result<RepoPage>;
}

#[cfg(test)]
pub(crate) fn descriptor(provider: Provider, namespace: &str, name: &str) -> RepositoryDescriptor {
    let organization = namespace.split('/').next().unwrap_or(namespace).to_string();
    RepositoryDescriptor {
        provider,
        organization,
        namespace: namespace.to_string(),
        name: name.to_string(),
        default_branch: "main".to_string(),
        visibility: Visibility::Public,
        archived: false,
        fork: false,
        language: None,
        size_kb: None,
        star_count: None,
        updated_at: None,
        topics: Vec::new(),
        clone_urls: CloneUrls {
            https: format!("https://forge.test/{namespace}/{name}.git"),
            ssh: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_display_and_from_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.to_string().parse::<Provider>(), Ok(provider));
        }
        assert_eq!("GH".parse::<Provider>(), Ok(Provider::GitHub));
        assert_eq!("forgejo".parse::<Provider>(), Ok(Provider::Gitea));
        assert!("bitbucket".parse::<Provider>().is_err());
    }

    #[test]
    fn gogs_has_no_default_host() {
        assert!(Provider::Gogs.default_host().is_none());
        assert!(Provider::GitHub.default_host().is_some());
    }

    #[test]
    fn visibility_filter_semantics() {
        assert!(VisibilityFilter::All.allows(Visibility::Private));
        assert!(VisibilityFilter::Public.allows(Visibility::Public));
        assert!(!VisibilityFilter::Public.allows(Visibility::Internal));
        assert!(VisibilityFilter::Private.allows(Visibility::Internal));
        assert!(VisibilityFilter::Private.allows(Visibility::Private));
        assert!(!VisibilityFilter::Private.allows(Visibility::Public));
    }

    #[test]
    fn key_format_includes_provider_and_full_path() {
        let repo = descriptor(Provider::GitLab, "acme/platform/tools", "cli");
        assert_eq!(repo.key().as_str(), "gitlab:acme/platform/tools/cli");
        assert_eq!(repo.full_name(), "acme/platform/tools/cli");
    }

    #[test]
    fn subgroups_are_relative_to_the_organization() {
        let repo = descriptor(Provider::GitLab, "acme/platform/tools", "cli");
        assert_eq!(repo.subgroups(), vec!["platform", "tools"]);

        let flat = descriptor(Provider::GitHub, "acme", "api");
        assert!(flat.subgroups().is_empty());
    }

    #[test]
    fn key_serializes_as_plain_string() {
        let key = RepositoryKey::new(Provider::Gitea, "acme", "api");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"gitea:acme/api\"");
    }
}
