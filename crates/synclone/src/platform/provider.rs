use async_trait::async_trait;

use super::errors::{PlatformError, Result};
use super::rate_limit::AdaptiveRateLimiter;
use super::types::{PlatformClient, Provider, RepoPage, UserInfo, VisibilityFilter};
use crate::gitea::GiteaClient;
use crate::github::GitHubClient;
use crate::gitlab::GitLabClient;
use crate::gogs::GogsClient;

/// Connection settings for one provider instance.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub provider: Provider,
    /// API host; falls back to [`Provider::default_host`].
    pub host: Option<String>,
    pub token: String,
    /// GitLab only: include projects from nested subgroups.
    pub include_subgroups: bool,
}

impl ClientSettings {
    pub fn new(provider: Provider, token: impl Into<String>) -> Self {
        Self {
            provider,
            host: None,
            token: token.into(),
            include_subgroups: true,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host.filter(|h| !h.trim().is_empty());
        self
    }

    /// Resolve the host, failing for providers without a public default.
    pub fn resolved_host(&self) -> Result<String> {
        self.host
            .clone()
            .or_else(|| self.provider.default_host().map(str::to_string))
            .ok_or_else(|| {
                PlatformError::config(format!("a host is required for {}", self.provider))
            })
    }
}

/// A client for any supported provider.
///
/// The provider set is closed, so dispatch is a plain `match`.
#[derive(Clone)]
pub enum ProviderClient {
    GitHub(GitHubClient),
    GitLab(GitLabClient),
    Gitea(GiteaClient),
    Gogs(GogsClient),
}

impl ProviderClient {
    /// Build a reqwest-backed client, pacing requests with `rate_limiter`.
    pub fn connect(
        settings: &ClientSettings,
        rate_limiter: Option<AdaptiveRateLimiter>,
    ) -> Result<Self> {
        let host = settings.resolved_host()?;
        let token = settings.token.as_str();
        Ok(match settings.provider {
            Provider::GitHub => Self::GitHub(GitHubClient::new(&host, token, rate_limiter)?),
            Provider::GitLab => Self::GitLab(
                GitLabClient::new(&host, token, rate_limiter)?
                    .with_subgroups(settings.include_subgroups),
            ),
            Provider::Gitea => Self::Gitea(GiteaClient::new(&host, token, rate_limiter)?),
            Provider::Gogs => Self::Gogs(GogsClient::new(&host, token, rate_limiter)?),
        })
    }

    fn inner(&self) -> &dyn PlatformClient {
        match self {
            Self::GitHub(c) => c,
            Self::GitLab(c) => c,
            Self::Gitea(c) => c,
            Self::Gogs(c) => c,
        }
    }
}

#[async_trait]
impl PlatformClient for ProviderClient {
    fn provider(&self) -> Provider {
        self.inner().provider()
    }

    fn max_page_size(&self) -> u32 {
        self.inner().max_page_size()
    }

    async fn authenticate(&self) -> Result<UserInfo> {
        self.inner().authenticate().await
    }

    async fn list_repositories(
        &self,
        org: &str,
        page: u32,
        page_size: u32,
        visibility: VisibilityFilter,
    ) -> Result<RepoPage> {
        self.inner()
            .list_repositories(org, page, page_size, visibility)
            .await
    }
}
