//! GitHub REST API client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;

use super::convert::to_descriptor;
use super::error::GitHubError;
use super::pagination::parse_link_header;
use super::types::{GitHubRepo, GitHubUser};
use crate::http::{
    DEFAULT_REQUEST_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
};
use crate::platform::{
    self, AdaptiveRateLimiter, PlatformClient, Provider, RateLimitInfo, RepoPage, UserInfo,
    VisibilityFilter, is_quota_exhausted, parse_rate_limit_headers, parse_retry_after,
    truncate_message,
};

/// Public GitHub API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// GitHub caps `per_page` at 100.
pub const MAX_PAGE_SIZE: u32 = 100;

/// GitHub API client for listing organization repositories.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    token: String,
    rate_limiter: Option<AdaptiveRateLimiter>,
}

/// Derive the REST base URL from a configured host.
///
/// `github.com` maps to `api.github.com`; any other host is treated as
/// GitHub Enterprise Server, whose API lives under `/api/v3`.
fn github_api_base(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    let bare = trimmed
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    if bare == "github.com" || bare == "www.github.com" || bare.starts_with("api.github.com") {
        return GITHUB_API.to_string();
    }
    platform::api_base(trimmed, "/api/v3")
}

impl GitHubClient {
    /// Create a client for `host` (`https://api.github.com` or an Enterprise host).
    pub fn new(
        host: &str,
        token: &str,
        rate_limiter: Option<AdaptiveRateLimiter>,
    ) -> Result<Self, GitHubError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| GitHubError::Config(e.to_string()))?;
        Ok(Self::new_with_transport(
            host,
            token,
            rate_limiter,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        host: &str,
        token: &str,
        rate_limiter: Option<AdaptiveRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            api_base: github_api_base(host),
            token: token.to_string(),
            rate_limiter,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }
    }

    fn record_rate_limit(&self, info: Option<&RateLimitInfo>) {
        if let Some(ref limiter) = self.rate_limiter
            && let Some(info) = info
        {
            limiter.update(info);
        }
    }

    /// Make an authenticated GET request and classify error statuses.
    async fn get(&self, path: &str) -> Result<(HttpResponse, Option<RateLimitInfo>), GitHubError> {
        self.wait_for_rate_limit().await;

        let mut request = HttpRequest::get(format!("{}{}", self.api_base, path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "synclone");
        if !self.token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.token));
        }

        let response = self.transport.send(request).await?;
        let rate_limit = parse_rate_limit_headers(&response.headers);

        if response.is_success() {
            self.record_rate_limit(rate_limit.as_ref());
            return Ok((response, rate_limit));
        }

        if is_quota_exhausted(response.status, &response.headers) {
            let retry_after = parse_retry_after(&response.headers).or_else(|| {
                rate_limit
                    .as_ref()
                    .and_then(|info| (info.reset_at - Utc::now()).to_std().ok())
            });
            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_rate_limited(retry_after);
            }
            let reset_at = rate_limit
                .as_ref()
                .map(|info| info.reset_at)
                .unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1));
            return Err(GitHubError::RateLimited {
                reset_at,
                retry_after,
            });
        }

        let message = truncate_message(&response.body_text());
        Err(match response.status {
            401 | 403 => GitHubError::Auth(message),
            status => GitHubError::Api { status, message },
        })
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GitHubError> {
        serde_json::from_slice(&response.body).map_err(GitHubError::Json)
    }

    /// Fetch one page of an organization's repositories.
    pub async fn list_org_repos_page(
        &self,
        org: &str,
        page: u32,
        per_page: u32,
        visibility: VisibilityFilter,
    ) -> Result<(Vec<GitHubRepo>, Option<u32>, Option<RateLimitInfo>), GitHubError> {
        let kind = match visibility {
            VisibilityFilter::All => "all",
            VisibilityFilter::Public => "public",
            VisibilityFilter::Private => "private",
        };
        let path = format!(
            "/orgs/{org}/repos?type={kind}&sort=full_name&per_page={}&page={page}",
            per_page.clamp(1, MAX_PAGE_SIZE)
        );

        let (response, rate_limit) = self.get(&path).await.map_err(|e| match e {
            GitHubError::Api { status: 404, .. } => GitHubError::OrgNotFound(org.to_string()),
            other => other,
        })?;

        let repos: Vec<GitHubRepo> = Self::decode(&response)?;
        let next_page = response
            .header("link")
            .map(parse_link_header)
            .and_then(|links| links.next_page)
            .filter(|next| *next > page);

        tracing::debug!(org, page, count = repos.len(), ?next_page, "Fetched GitHub page");
        Ok((repos, next_page, rate_limit))
    }

    /// Get the account behind the token.
    pub async fn get_authenticated_user(&self) -> Result<GitHubUser, GitHubError> {
        if self.token.is_empty() {
            return Err(GitHubError::Auth("no token configured".to_string()));
        }
        let (response, _) = self.get("/user").await?;
        Self::decode(&response)
    }
}

#[async_trait]
impl PlatformClient for GitHubClient {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    fn max_page_size(&self) -> u32 {
        MAX_PAGE_SIZE
    }

    async fn authenticate(&self) -> platform::Result<UserInfo> {
        let user = self.get_authenticated_user().await?;
        Ok(UserInfo {
            username: user.login,
            name: user.name,
        })
    }

    async fn list_repositories(
        &self,
        org: &str,
        page: u32,
        page_size: u32,
        visibility: VisibilityFilter,
    ) -> platform::Result<RepoPage> {
        let (repos, next_page, rate_limit) = self
            .list_org_repos_page(org, page, page_size, visibility)
            .await?;
        Ok(RepoPage {
            items: repos.into_iter().map(|r| to_descriptor(r, org)).collect(),
            next_page,
            rate_limit,
        })
    }
}
