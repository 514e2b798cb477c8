//! GitLab REST API (v4) client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;

use super::convert::to_descriptor;
use super::error::GitLabError;
use super::types::{GitLabProject, GitLabUser};
use crate::http::{
    DEFAULT_REQUEST_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
};
use crate::platform::{
    self, AdaptiveRateLimiter, PlatformClient, Provider, RateLimitInfo, RepoPage, UserInfo,
    VisibilityFilter, is_quota_exhausted, parse_rate_limit_headers, parse_retry_after,
    truncate_message,
};

/// GitLab caps `per_page` at 100.
pub const MAX_PAGE_SIZE: u32 = 100;

/// GitLab API client for listing group projects.
#[derive(Clone)]
pub struct GitLabClient {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    token: String,
    include_subgroups: bool,
    rate_limiter: Option<AdaptiveRateLimiter>,
}

/// Encode a group path for use as a single URL path segment.
///
/// `acme/platform` becomes `acme%2Fplatform`.
pub fn encode_group_path(group: &str) -> String {
    group
        .trim_matches('/')
        .replace('%', "%25")
        .replace('/', "%2F")
        .replace(' ', "%20")
}

impl GitLabClient {
    pub fn new(
        host: &str,
        token: &str,
        rate_limiter: Option<AdaptiveRateLimiter>,
    ) -> Result<Self, GitLabError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| GitLabError::Config(e.to_string()))?;
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
            api_base: platform::api_base(host, "/api/v4"),
            token: token.to_string(),
            include_subgroups: true,
            rate_limiter,
        }
    }

    /// Whether listings recurse into nested subgroups (default: true).
    #[must_use]
    pub fn with_subgroups(mut self, include: bool) -> Self {
        self.include_subgroups = include;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get(&self, path: &str) -> Result<(HttpResponse, Option<RateLimitInfo>), GitLabError> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut request = HttpRequest::get(format!("{}{}", self.api_base, path))
            .header("Accept", "application/json")
            .header("User-Agent", "synclone");
        if !self.token.is_empty() {
            request = request.header("PRIVATE-TOKEN", self.token.clone());
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
            let reset_at = rate_limit
                .map(|info| info.reset_at)
                .unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1));
            return Err(GitLabError::RateLimited {
                reset_at,
                retry_after,
            });
        }

        let message = truncate_message(&response.body_text());
        Err(match response.status {
            401 | 403 => GitLabError::Auth(message),
            status => GitLabError::Api { status, message },
        })
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GitLabError> {
        serde_json::from_slice(&response.body).map_err(GitLabError::Json)
    }

    /// Fetch one page of a group's projects.
    pub async fn list_group_projects_page(
        &self,
        group: &str,
        page: u32,
        per_page: u32,
        visibility: VisibilityFilter,
    ) -> Result<(Vec<GitLabProject>, Option<u32>, Option<RateLimitInfo>), GitLabError> {
        let mut path = format!(
            "/groups/{}/projects?include_subgroups={}&statistics=true&order_by=path&sort=asc&per_page={}&page={page}",
            encode_group_path(group),
            self.include_subgroups,
            per_page.clamp(1, MAX_PAGE_SIZE),
        );
        // GitLab accepts a single visibility value; "private" also covers
        // internal projects, so that case is filtered client-side.
        if visibility == VisibilityFilter::Public {
            path.push_str("&visibility=public");
        }

        let (response, rate_limit) = self.get(&path).await.map_err(|e| match e {
            GitLabError::Api { status: 404, .. } => GitLabError::GroupNotFound(group.to_string()),
            other => other,
        })?;

        let projects: Vec<GitLabProject> = Self::decode(&response)?;
        let next_page = response
            .header("x-next-page")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|next| *next > page);

        tracing::debug!(group, page, count = projects.len(), ?next_page, "Fetched GitLab page");
        Ok((projects, next_page, rate_limit))
    }

    pub async fn get_authenticated_user(&self) -> Result<GitLabUser, GitLabError> {
        if self.token.is_empty() {
            return Err(GitLabError::Auth("no token configured".to_string()));
        }
        let (response, _) = self.get("/user").await?;
        Self::decode(&response)
    }
}

#[async_trait]
impl PlatformClient for GitLabClient {
    fn provider(&self) -> Provider {
        Provider::GitLab
    }

    fn max_page_size(&self) -> u32 {
        MAX_PAGE_SIZE
    }

    async fn authenticate(&self) -> platform::Result<UserInfo> {
        let user = self.get_authenticated_user().await?;
        Ok(UserInfo {
            username: user.username,
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
        let (projects, next_page, rate_limit) = self
            .list_group_projects_page(org, page, page_size, visibility)
            .await?;
        Ok(RepoPage {
            items: projects
                .into_iter()
                .map(|p| to_descriptor(p, org))
                .collect(),
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

    fn project_json(namespace: &str, path: &str) -> serde_json::Value {
        serde_json::json!({
            "id": 1,
            "name": path,
            "path": path,
            "path_with_namespace": format!("{namespace}/{path}"),
            "default_branch": "main",
            "visibility": "private",
            "archived": false,
            "star_count": 0,
            "last_activity_at": "2024-01-01T00:00:00Z",
            "namespace": {"full_path": namespace},
            "http_url_to_repo": format!("https://gitlab.com/{namespace}/{path}.git"),
            "ssh_url_to_repo": format!("git@gitlab.com:{namespace}/{path}.git")
        })
    }

    fn client(transport: &MockTransport) -> GitLabClient {
        GitLabClient::new_with_transport("gitlab.com", "glpat-test", None, Arc::new(transport.clone()))
    }

    #[test]
    fn group_path_encoding() {
        assert_eq!(encode_group_path("acme"), "acme");
        assert_eq!(encode_group_path("acme/platform/tools"), "acme%2Fplatform%2Ftools");
        assert_eq!(encode_group_path("/acme/"), "acme");
    }

    #[tokio::test]
    async fn lists_subgroup_projects_and_reads_next_page_header() {
        let transport = MockTransport::new();
        let body = serde_json::to_vec(&vec![
            project_json("acme", "api"),
            project_json("acme/platform", "deploy"),
        ])
        .unwrap();
        transport.push_response(
            HttpMethod::Get,
            "https://gitlab.com/api/v4/groups/acme/projects?include_subgroups=true&statistics=true&order_by=path&sort=asc&per_page=2&page=1",
            mock_response(
                200,
                vec![
                    ("X-Next-Page", "2"),
                    ("RateLimit-Limit", "2000"),
                    ("RateLimit-Remaining", "1999"),
                    ("RateLimit-Reset", "1700000000"),
                ],
                body,
            ),
        );

        let page = client(&transport)
            .list_repositories("acme", 1, 2, VisibilityFilter::All)
            .await
            .expect("page should load");

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].key().as_str(), "gitlab:acme/platform/deploy");
        assert_eq!(page.next_page, Some(2));
        assert_eq!(page.rate_limit.map(|r| r.limit), Some(2000));
        assert!(
            transport.requests()[0]
                .headers
                .iter()
                .any(|(k, v)| k == "PRIVATE-TOKEN" && v == "glpat-test")
        );
    }

    #[tokio::test]
    async fn empty_next_page_header_ends_listing() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://gitlab.com/api/v4/groups/acme%2Fplatform/projects?include_subgroups=false&statistics=true&order_by=path&sort=asc&per_page=100&page=3&visibility=public",
            mock_response(200, vec![("X-Next-Page", "")], "[]"),
        );

        let page = client(&transport)
            .with_subgroups(false)
            .list_repositories("acme/platform", 3, 100, VisibilityFilter::Public)
            .await
            .expect("page should load");
        assert!(page.items.is_empty());
        assert_eq!(page.next_page, None);
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://gitlab.com/api/v4/groups/acme/projects?include_subgroups=true&statistics=true&order_by=path&sort=asc&per_page=100&page=1",
            mock_response(429, vec![("Retry-After", "30")], "Retry later"),
        );

        let err = client(&transport)
            .list_repositories("acme", 1, 100, VisibilityFilter::All)
            .await
            .expect_err("429 should fail");
        match err {
            PlatformError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(30)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_group_is_not_found() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://gitlab.com/api/v4/groups/ghost/projects?include_subgroups=true&statistics=true&order_by=path&sort=asc&per_page=100&page=1",
            mock_response(404, vec![], r#"{"message":"404 Group Not Found"}"#),
        );
        let err = client(&transport)
            .list_repositories("ghost", 1, 100, VisibilityFilter::All)
            .await
            .expect_err("404 should fail");
        assert!(matches!(err, PlatformError::NotFound { .. }));
    }

    #[tokio::test]
    async fn authenticate_reads_username() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://gitlab.com/api/v4/user",
            mock_response(200, vec![], r#"{"username":"jdoe","name":"J. Doe"}"#),
        );
        let user = client(&transport).authenticate().await.unwrap();
        assert_eq!(user.username, "jdoe");
    }
}
