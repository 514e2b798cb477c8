//! Repository discovery.
//!
//! Walks a platform listing page by page, applies the configured [`Filter`]
//! and returns the surviving repositories sorted by key. Discovery is
//! all-or-nothing: any page that still fails after retries aborts the whole
//! listing and no partial result is returned.

mod filter;

pub use filter::{Filter, FilterSpec};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::platform::{PlatformClient, PlatformError, RepositoryDescriptor, RepositoryKey};
use crate::progress::{ProgressCallback, SyncProgress, emit};
use crate::retry::{RetryPolicy, retry};

/// Upper bound on pages followed for one listing.
pub const MAX_PAGES: u32 = 10_000;

/// Errors that abort discovery. No partial listing is ever returned.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("'{resource}' not found")]
    NotFound { resource: String },

    #[error("platform unreachable: {message}")]
    Unreachable { message: String },

    #[error("page {page} could not be fetched after {attempts} attempts: {source}")]
    PaginationExhausted {
        page: u32,
        attempts: u32,
        #[source]
        source: PlatformError,
    },

    #[error("listing exceeded {MAX_PAGES} pages")]
    TooManyPages,

    #[error(transparent)]
    Platform(PlatformError),
}

impl DiscoveryError {
    fn from_page_error(page: u32, attempts: u32, err: PlatformError) -> Self {
        match err {
            PlatformError::Auth { message } => Self::Auth { message },
            PlatformError::NotFound { resource } => Self::NotFound { resource },
            PlatformError::Network { message } => Self::Unreachable { message },
            err if err.is_retryable() => Self::PaginationExhausted {
                page,
                attempts,
                source: err,
            },
            err => Self::Platform(err),
        }
    }
}

/// How discovery talks to the platform.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Requested page size; clamped to what the platform accepts.
    pub page_size: u32,
    /// Verify the token before listing so a bad token fails fast.
    pub verify_token: bool,
    pub retry: RetryPolicy,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            verify_token: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a successful discovery.
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    /// Filtered repositories, sorted and unique by key.
    pub repositories: Vec<RepositoryDescriptor>,
    /// Number of repositories the platform listed before filtering.
    pub listed: usize,
    pub pages: u32,
}

/// List every repository of `org` and keep those matching `filter`.
#[tracing::instrument(skip_all, fields(provider = %client.provider(), org = %org))]
pub async fn discover(
    client: &dyn PlatformClient,
    org: &str,
    filter: &Filter,
    options: &DiscoveryOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<Discovered, DiscoveryError> {
    if options.verify_token {
        let user = client
            .authenticate()
            .await
            .map_err(|e| DiscoveryError::from_page_error(0, 1, e))?;
        tracing::debug!(user = %user.username, "Token verified");
    }

    emit(
        on_progress,
        SyncProgress::FetchingRepos {
            namespace: org.to_string(),
        },
    );

    let page_size = options.page_size.clamp(1, client.max_page_size());
    let visibility = filter.visibility();
    let mut by_key: BTreeMap<RepositoryKey, RepositoryDescriptor> = BTreeMap::new();
    let mut listed = 0usize;
    let mut pages = 0u32;
    let mut page = 1u32;

    loop {
        if pages >= MAX_PAGES {
            return Err(DiscoveryError::TooManyPages);
        }

        let mut attempts = 0u32;
        let result = retry(
            &options.retry,
            || {
                attempts += 1;
                client.list_repositories(org, page, page_size, visibility)
            },
            PlatformError::is_retryable,
            |err, delay, attempt| {
                tracing::warn!(page, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Page fetch failed, retrying");
                emit(
                    on_progress,
                    SyncProgress::PageFetchRetry {
                        page,
                        retry_after_ms: delay.as_millis() as u64,
                        attempt,
                    },
                );
            },
        )
        .await;

        let repo_page = result.map_err(|e| DiscoveryError::from_page_error(page, attempts, e))?;
        pages += 1;

        let count = repo_page.items.len();
        listed += count;
        for repo in repo_page.items {
            by_key.entry(repo.key()).or_insert(repo);
        }

        emit(
            on_progress,
            SyncProgress::FetchedPage {
                namespace: org.to_string(),
                page,
                count,
                total_so_far: listed,
            },
        );

        match repo_page.next_page {
            Some(next) if next > page && count > 0 => page = next,
            _ => break,
        }
    }

    emit(
        on_progress,
        SyncProgress::FetchComplete {
            namespace: org.to_string(),
            total: listed,
        },
    );

    let total = by_key.len();
    let repositories: Vec<_> = by_key
        .into_values()
        .filter(|repo| match filter.rejection(repo) {
            Some(reason) => {
                tracing::trace!(repo = %repo.key(), reason, "Filtered out");
                false
            }
            None => true,
        })
        .collect();

    emit(
        on_progress,
        SyncProgress::FilterComplete {
            namespace: org.to_string(),
            matched: repositories.len(),
            total,
        },
    );
    tracing::info!(listed, matched = repositories.len(), pages, "Discovery complete");

    Ok(Discovered {
        repositories,
        listed,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::platform::{self, Provider, RepoPage, UserInfo, VisibilityFilter, descriptor};

    type Scripted = VecDeque<platform::Result<RepoPage>>;

    /// Platform client answering from a script of page results.
    struct ScriptedClient {
        responses: Mutex<Scripted>,
        calls: Mutex<Vec<(u32, u32, VisibilityFilter)>>,
        auth: Mutex<Option<platform::Result<UserInfo>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<platform::Result<RepoPage>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
                auth: Mutex::new(None),
            }
        }

        fn calls(&self) -> Vec<(u32, u32, VisibilityFilter)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlatformClient for ScriptedClient {
        fn provider(&self) -> Provider {
            Provider::GitHub
        }

        fn max_page_size(&self) -> u32 {
            50
        }

        async fn authenticate(&self) -> platform::Result<UserInfo> {
            self.auth.lock().unwrap().take().unwrap_or_else(|| {
                Ok(UserInfo {
                    username: "bot".to_string(),
                    name: None,
                })
            })
        }

        async fn list_repositories(
            &self,
            _org: &str,
            page: u32,
            page_size: u32,
            visibility: VisibilityFilter,
        ) -> platform::Result<RepoPage> {
            self.calls.lock().unwrap().push((page, page_size, visibility));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RepoPage::default()))
        }
    }

    fn page(names: &[&str], next_page: Option<u32>) -> platform::Result<RepoPage> {
        Ok(RepoPage {
            items: names
                .iter()
                .map(|n| descriptor(Provider::GitHub, "acme", n))
                .collect(),
            next_page,
            rate_limit: None,
        })
    }

    fn fast_retry() -> DiscoveryOptions {
        DiscoveryOptions {
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
                .with_jitter(false),
            ..DiscoveryOptions::default()
        }
    }

    fn names(found: &Discovered) -> Vec<&str> {
        found.repositories.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn follows_pages_until_exhausted_and_sorts() {
        let client = ScriptedClient::new(vec![
            page(&["zeta", "alpha"], Some(2)),
            page(&["mid"], None),
        ]);

        let found = discover(&client, "acme", &Filter::allow_all(), &fast_retry(), None)
            .await
            .unwrap();

        assert_eq!(names(&found), vec!["alpha", "mid", "zeta"]);
        assert_eq!(found.listed, 3);
        assert_eq!(found.pages, 2);
        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, 50, "page size clamped to platform maximum");
    }

    #[tokio::test]
    async fn duplicate_keys_are_collapsed() {
        let client = ScriptedClient::new(vec![page(&["api", "web"], Some(2)), page(&["api"], None)]);
        let found = discover(&client, "acme", &Filter::allow_all(), &fast_retry(), None)
            .await
            .unwrap();
        assert_eq!(names(&found), vec!["api", "web"]);
    }

    #[tokio::test]
    async fn applies_filter_after_listing() {
        let client = ScriptedClient::new(vec![page(
            &["awesome-api", "awesome-archive-old", "other"],
            None,
        )]);
        let filter = Filter::compile(FilterSpec {
            match_pattern: Some("^awesome-.*".to_string()),
            exclude_patterns: vec!["awesome-archive-*".to_string()],
            ..FilterSpec::default()
        })
        .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |e| sink.lock().unwrap().push(e));

        let found = discover(&client, "acme", &filter, &fast_retry(), Some(&callback))
            .await
            .unwrap();

        assert_eq!(names(&found), vec!["awesome-api"]);
        let events = events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(SyncProgress::FilterComplete {
                matched: 1,
                total: 3,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn passes_visibility_to_the_platform() {
        let client = ScriptedClient::new(vec![page(&[], None)]);
        let filter = Filter::compile(FilterSpec {
            visibility: VisibilityFilter::Public,
            ..FilterSpec::default()
        })
        .unwrap();
        discover(&client, "acme", &filter, &fast_retry(), None)
            .await
            .unwrap();
        assert_eq!(client.calls()[0].2, VisibilityFilter::Public);
    }

    #[tokio::test]
    async fn retries_transient_page_failures() {
        let client = ScriptedClient::new(vec![
            page(&["a"], Some(2)),
            Err(PlatformError::rate_limited(Some(Duration::from_millis(1)))),
            Err(PlatformError::api(502, "bad gateway")),
            page(&["b"], None),
        ]);
        let found = discover(&client, "acme", &Filter::allow_all(), &fast_retry(), None)
            .await
            .unwrap();
        assert_eq!(names(&found), vec!["a", "b"]);
        assert_eq!(client.calls().len(), 4);
    }

    #[tokio::test]
    async fn exhausted_retries_abort_without_partial_results() {
        let client = ScriptedClient::new(vec![
            page(&["a"], Some(2)),
            Err(PlatformError::api(503, "down")),
            Err(PlatformError::api(503, "down")),
            Err(PlatformError::api(503, "down")),
            Err(PlatformError::api(503, "down")),
        ]);
        let err = discover(&client, "acme", &Filter::allow_all(), &fast_retry(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::PaginationExhausted {
                page: 2,
                attempts: 4,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn network_failure_reports_unreachable() {
        let responses = (0..4)
            .map(|_| Err(PlatformError::network("connection refused")))
            .collect();
        let client = ScriptedClient::new(responses);
        let err = discover(&client, "acme", &Filter::allow_all(), &fast_retry(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let client = ScriptedClient::new(vec![Err(PlatformError::auth("bad credentials"))]);
        let err = discover(&client, "acme", &Filter::allow_all(), &fast_retry(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Auth { .. }));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn token_verification_fails_before_listing() {
        let client = ScriptedClient::new(vec![page(&["a"], None)]);
        *client.auth.lock().unwrap() = Some(Err(PlatformError::auth("expired")));
        let options = DiscoveryOptions {
            verify_token: true,
            ..fast_retry()
        };
        let err = discover(&client, "acme", &Filter::allow_all(), &options, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Auth { .. }));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn non_advancing_next_page_stops_the_walk() {
        let client = ScriptedClient::new(vec![page(&["a"], Some(1)), page(&["b"], None)]);
        let found = discover(&client, "acme", &Filter::allow_all(), &fast_retry(), None)
            .await
            .unwrap();
        assert_eq!(names(&found), vec!["a"]);
        assert_eq!(client.calls().len(), 1);
    }
}
