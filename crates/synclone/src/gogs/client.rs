use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::convert::to_descriptor;
use super::error::GogsError;
use super::types::{GogsRepo, GogsUser};
use crate::http::{
    DEFAULT_REQUEST_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
};
use crate::platform::{
    self, AdaptiveRateLimiter, PlatformClient, Provider, RepoPage, UserInfo, VisibilityFilter,
    is_quota_exhausted, parse_retry_after, truncate_message,
};

/// Gogs API client.
#[derive(Clone)]
pub struct GogsClient {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    token: String,
    rate_limiter: Option<AdaptiveRateLimiter>,
}

impl GogsClient {
    pub fn new(
        host: &str,
        token: &str,
        rate_limiter: Option<AdaptiveRateLimiter>,
    ) -> Result<Self, GogsError> {
        if host.trim().is_empty() {
            return Err(GogsError::Config("a Gogs host is required".to_string()));
        }
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| GogsError::Config(e.to_string()))?;
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

    async fn get(&self, path: &str) -> Result<HttpResponse, GogsError> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut request = HttpRequest::get(format!("{}{}", self.api_base, path))
            .header("Accept", "application/json")
            .header("User-Agent", "synclone");
        if !self.token.is_empty() {
            request = request.header("Authorization", format!("token {}", self.token));
        }

        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        if is_quota_exhausted(response.status, &response.headers) {
            let retry_after = parse_retry_after(&response.headers);
            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_rate_limited(retry_after);
            }
            return Err(GogsError::RateLimited { retry_after });
        }

        let message = truncate_message(&response.body_text());
        Err(match response.status {
            401 | 403 => GogsError::Auth(message),
            status => GogsError::Api { status, message },
        })
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GogsError> {
        serde_json::from_slice(&response.body).map_err(GogsError::Json)
    }

    /// List every repository of an organization in one request.
    pub async fn list_org_repos(&self, org: &str) -> Result<Vec<GogsRepo>, GogsError> {
        let response = self
            .get(&format!("/orgs/{org}/repos"))
            .await
            .map_err(|e| match e {
                GogsError::Api { status: 404, .. } => GogsError::OrgNotFound(org.to_string()),
                other => other,
            })?;
        Self::decode(&response)
    }

    pub async fn get_authenticated_user(&self) -> Result<GogsUser, GogsError> {
        if self.token.is_empty() {
            return Err(GogsError::Auth("no token configured".to_string()));
        }
        let response = self.get("/user").await?;
        Self::decode(&response)
    }
}

#[async_trait]
impl PlatformClient for GogsClient {
    fn provider(&self) -> Provider {
        Provider::Gogs
    }

    async fn authenticate(&self) -> platform::Result<UserInfo> {
        let user = self.get_authenticated_user().await?;
        Ok(UserInfo {
            username: user.login,
            name: user.full_name.filter(|n| !n.is_empty()),
        })
    }

    /// Page 1 carries the full listing; later pages are empty.
    async fn list_repositories(
        &self,
        org: &str,
        page: u32,
        _page_size: u32,
        _visibility: VisibilityFilter,
    ) -> platform::Result<RepoPage> {
        if page > 1 {
            return Ok(RepoPage::default());
        }
        let repos = self.list_org_repos(org).await?;
        tracing::debug!(org, count = repos.len(), "Fetched Gogs listing");
        Ok(RepoPage {
            items: repos.into_iter().map(|r| to_descriptor(r, org)).collect(),
            next_page: None,
            rate_limit: None,
        })
    }
}
