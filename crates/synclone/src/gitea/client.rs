//! Gitea API client creation and management.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;

use super::convert::to_descriptor;
use super::error::{GiteaError, short_error_message};
use super::types::{GiteaRepo, GiteaUser};
use crate::http::{
    DEFAULT_REQUEST_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
};
use crate::platform::{
    self, AdaptiveRateLimiter, PlatformClient, Provider, RateLimitInfo, RepoPage, UserInfo,
    VisibilityFilter, is_quota_exhausted, parse_rate_limit_headers, parse_retry_after,
    truncate_message,
};

/// Gitea's default `MAX_RESPONSE_ITEMS`.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Gitea API client.
///
/// Compatible with Gitea, Forgejo and Codeberg.
#[derive(Clone)]
pub struct GiteaClient {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    token: String,
    /// Optional adaptive rate limiter for pacing API requests.
    rate_limiter: Option<AdaptiveRateLimiter>,
}

impl GiteaClient {
    /// Create a new Gitea client.
    ///
    /// ```ignore
    /// let client = GiteaClient::new("https://codeberg.org", "token", None)?;
    /// ```
    pub fn new(
        host: &str,
        token: &str,
        rate_limiter: Option<AdaptiveRateLimiter>,
    ) -> Result<Self, GiteaError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| GiteaError::Config(e.to_string()))?;

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
            api_base: platform::api_base(host, "/api/v1"),
            token: token.to_string(),
            rate_limiter,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Wait for rate limiter if one is configured.
    async fn wait_for_rate_limit(&self) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }
    }

    /// Make an authenticated GET request.
    async fn get(&self, path: &str) -> Result<(HttpResponse, Option<RateLimitInfo>), GiteaError> {
        self.wait_for_rate_limit().await;

        let mut request = HttpRequest::get(format!("{}{}", self.api_base, path))
            .header("Accept", "application/json")
            .header("User-Agent", "synclone");
        if !self.token.is_empty() {
            request = request.header("Authorization", format!("token {}", self.token));
        }

        let response = self.transport.send(request).await?;
        let rate_limit = parse_rate_limit_headers(&response.headers);

        if response.is_success() {
            if let Some(ref limiter) = self.rate_limiter
                && let Some(ref info) = rate_limit
            {
                limiter.update(info);
            }
            return Ok((response, rate_limit));
        }

        if is_quota_exhausted(response.status, &response.headers) {
            let retry_after = parse_retry_after(&response.headers);
            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_rate_limited(retry_after);
            }
            return Err(GiteaError::RateLimited {
                reset_at: rate_limit
                    .map(|info| info.reset_at)
                    .unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1)),
                retry_after,
            });
        }

        let message = truncate_message(&response.body_text());
        Err(match response.status {
            401 | 403 => GiteaError::Auth(message),
            status => GiteaError::Api { status, message },
        })
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GiteaError> {
        serde_json::from_slice(&response.body).map_err(GiteaError::Json)
    }

    /// Fetch one page of an organization's repositories.
    ///
    /// Gitea sends no next-page hint, so a full page implies another one.
    pub async fn list_org_repos_page(
        &self,
        org: &str,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<GiteaRepo>, Option<u32>, Option<RateLimitInfo>), GiteaError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let (response, rate_limit) = self
            .get(&format!("/orgs/{org}/repos?page={page}&limit={limit}"))
            .await
            .map_err(|e| match e {
                GiteaError::Api { status: 404, .. } => GiteaError::OrgNotFound(org.to_string()),
                other => {
                    tracing::debug!(org, page, error = %short_error_message(&other), "Gitea request failed");
                    other
                }
            })?;

        let repos: Vec<GiteaRepo> = Self::decode(&response)?;
        let next_page = (repos.len() as u32 >= limit).then_some(page + 1);

        tracing::debug!(org, page, count = repos.len(), ?next_page, "Fetched Gitea page");
        Ok((repos, next_page, rate_limit))
    }

    pub async fn get_authenticated_user(&self) -> Result<GiteaUser, GiteaError> {
        if self.token.is_empty() {
            return Err(GiteaError::Auth("no token configured".to_string()));
        }
        let (response, _) = self.get("/user").await?;
        Self::decode(&response)
    }
}

#[async_trait]
impl PlatformClient for GiteaClient {
    fn provider(&self) -> Provider {
        Provider::Gitea
    }

    fn max_page_size(&self) -> u32 {
        MAX_PAGE_SIZE
    }

    async fn authenticate(&self) -> platform::Result<UserInfo> {
        let user = self.get_authenticated_user().await?;
        Ok(UserInfo {
            username: user.login,
            name: user.full_name.filter(|n| !n.is_empty()),
        })
    }

    /// Gitea has no server-side visibility filter for org listings.
    async fn list_repositories(
        &self,
        org: &str,
        page: u32,
        page_size: u32,
        _visibility: VisibilityFilter,
    ) -> platform::Result<RepoPage> {
        let (repos, next_page, rate_limit) = self.list_org_repos_page(org, page, page_size).await?;
        Ok(RepoPage {
            items: repos.into_iter().map(|r| to_descriptor(r, org)).collect(),
            next_page,
            rate_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport, mock_response};
    use crate::platform::PlatformError;

    fn repo_json(id: i64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("repo-{id}"),
            "full_name": format!("acme/repo-{id}"),
            "owner": {"login": "acme", "full_name": "Acme"},
            "private": false,
            "fork": false,
            "archived": false,
            "empty": false,
            "default_branch": "main",
            "language": "Go",
            "size": 1,
            "stars_count": 0,
            "updated_at": "2024-01-02T00:00:00Z",
            "clone_url": format!("https://forge.test/acme/repo-{id}.git"),
            "ssh_url": format!("ssh://git@forge.test/acme/repo-{id}.git")
        })
    }

    fn client(transport: &MockTransport) -> GiteaClient {
        GiteaClient::new_with_transport("https://forge.test", "tok", None, Arc::new(transport.clone()))
    }

    #[tokio::test]
    async fn full_page_advertises_next_page() {
        let transport = MockTransport::new();
        let body = serde_json::to_vec(&vec![repo_json(1), repo_json(2)]).unwrap();
        transport.push_response(
            HttpMethod::Get,
            "https://forge.test/api/v1/orgs/acme/repos?page=1&limit=2",
            mock_response(200, vec![], body),
        );

        let page = client(&transport)
            .list_repositories("acme", 1, 2, VisibilityFilter::All)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_page, Some(2));
        assert!(
            transport.requests()[0]
                .headers
                .iter()
                .any(|(k, v)| k == "Authorization" && v == "token tok")
        );
    }

    #[tokio::test]
    async fn short_page_ends_listing() {
        let transport = MockTransport::new();
        let body = serde_json::to_vec(&vec![repo_json(3)]).unwrap();
        transport.push_response(
            HttpMethod::Get,
            "https://forge.test/api/v1/orgs/acme/repos?page=2&limit=2",
            mock_response(200, vec![], body),
        );

        let page = client(&transport)
            .list_repositories("acme", 2, 2, VisibilityFilter::All)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_page, None);
    }

    #[tokio::test]
    async fn page_size_is_clamped_to_gitea_maximum() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://forge.test/api/v1/orgs/acme/repos?page=1&limit=50",
            mock_response(200, vec![], "[]"),
        );
        let page = client(&transport)
            .list_repositories("acme", 1, 100, VisibilityFilter::All)
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://forge.test/api/v1/orgs/acme/repos?page=1&limit=50",
            mock_response(503, vec![], "maintenance"),
        );
        let err = client(&transport)
            .list_repositories("acme", 1, 50, VisibilityFilter::All)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Api { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_org_is_not_found() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://forge.test/api/v1/orgs/ghost/repos?page=1&limit=50",
            mock_response(404, vec![], "{}"),
        );
        let err = client(&transport)
            .list_repositories("ghost", 1, 50, VisibilityFilter::All)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotFound { .. }));
    }
}
