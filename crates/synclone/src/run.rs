//! Run controller: one synchronization of one target, end to end.
//!
//! ```text
//! validate ─→ discover ─→ load + reconcile ─→ schedule ─→ summary
//!                              │                  │
//!                              └── StateStore ←───┘ (one write per task)
//! ```
//!
//! Configuration errors and discovery failures abort before the state store
//! is touched. Task failures never abort the run; they end up in the
//! [`RunSummary`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discovery::{DiscoveryError, DiscoveryOptions, Filter, FilterSpec, discover};
use crate::error::ConfigError;
use crate::executor::{GitExecutor, Layout, Protocol, RepoExecutor, Strategy, local_path};
use crate::orphans::{find_orphans, remove_orphan};
use crate::platform::{
    AdaptiveRateLimiter, ClientSettings, PlatformClient, PlatformError, Provider, ProviderClient,
    RepositoryDescriptor, RepositoryKey,
};
use crate::progress::{ProgressCallback, SyncProgress, emit};
use crate::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};
use crate::scheduler::{
    DEFAULT_CONCURRENCY, DEFAULT_TASK_TIMEOUT, RunSummary, Scheduler, SchedulerConfig, Task,
    validate_concurrency,
};
use crate::state::{
    DEFAULT_RETRY_CEILING, RunState, StateError, StateRecorder, StateStore, TargetId, TaskOutcome,
    reconcile,
};

/// Errors that stop a run before or outside of task execution.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// What to synchronize and how.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunTarget {
    pub provider: Provider,
    /// Organization (GitHub, Gitea, Gogs) or top-level group (GitLab).
    pub organization: String,
    /// API host for self-hosted instances.
    pub host: Option<String>,
    /// Already-resolved access token. Never persisted.
    #[serde(skip)]
    pub token: String,
    /// Local directory the repositories are synchronized into.
    pub root: PathBuf,
    pub strategy: Strategy,
    pub concurrency: usize,
    /// Retries per task within one run.
    pub max_retries: usize,
    pub filter: FilterSpec,
    pub layout: Layout,
    pub protocol: Protocol,
    /// GitLab only: include projects from nested subgroups.
    pub include_subgroups: bool,
}

impl Default for RunTarget {
    fn default() -> Self {
        Self {
            provider: Provider::GitHub,
            organization: String::new(),
            host: None,
            token: String::new(),
            root: PathBuf::new(),
            strategy: Strategy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            filter: FilterSpec::default(),
            layout: Layout::default(),
            protocol: Protocol::default(),
            include_subgroups: true,
        }
    }
}

impl fmt::Debug for RunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunTarget")
            .field("provider", &self.provider)
            .field("organization", &self.organization)
            .field("host", &self.host)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("root", &self.root)
            .field("strategy", &self.strategy)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("filter", &self.filter)
            .field("layout", &self.layout)
            .field("protocol", &self.protocol)
            .field("include_subgroups", &self.include_subgroups)
            .finish()
    }
}

impl RunTarget {
    pub fn new(provider: Provider, organization: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            organization: organization.into(),
            root: root.into(),
            ..Self::default()
        }
    }

    /// Stable identifier of this target's state file.
    pub fn id(&self) -> TargetId {
        TargetId::derive(self.provider, &self.organization, &self.root)
    }

    /// Check everything that can be checked offline and compile the filter.
    pub fn validate(&self) -> Result<Filter, ConfigError> {
        if self.organization.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "organization",
            });
        }
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Missing { field: "root" });
        }
        if self.layout.flatten && self.layout.delimiter.is_empty() {
            return Err(ConfigError::Missing {
                field: "layout.delimiter",
            });
        }
        validate_concurrency(self.concurrency)?;
        Filter::compile(self.filter.clone())
    }

    pub fn client_settings(&self) -> ClientSettings {
        let mut settings =
            ClientSettings::new(self.provider, self.token.clone()).with_host(self.host.clone());
        settings.include_subgroups = self.include_subgroups;
        settings
    }

    /// Where `repo` lives on disk.
    pub fn path_for(&self, repo: &RepositoryDescriptor) -> PathBuf {
        local_path(&self.root, repo, &self.layout)
    }
}

/// Per-invocation switches.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Continue from the persisted state instead of starting over.
    pub resume: bool,
    /// Report planned actions without touching the filesystem or the state.
    pub dry_run: bool,
    /// Cumulative retries after which a failed repository is left alone on resume.
    pub retry_ceiling: u32,
    pub task_timeout: Duration,
    pub verify_token: bool,
    pub page_size: u32,
    /// Backoff schedule for tasks and page fetches. The retry count is
    /// taken from [`RunTarget::max_retries`].
    pub backoff: RetryPolicy,
    /// Delete checkouts under the root that are no longer selected.
    pub cleanup_orphans: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: false,
            dry_run: false,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            verify_token: false,
            page_size: DiscoveryOptions::default().page_size,
            backoff: RetryPolicy::default(),
            cleanup_orphans: false,
        }
    }
}

/// Drives runs against one platform client.
pub struct RunController {
    client: Arc<dyn PlatformClient>,
    executor: Arc<dyn RepoExecutor>,
    store: Arc<dyn StateStore>,
    limiter: Option<AdaptiveRateLimiter>,
    shutdown: Arc<AtomicBool>,
}

impl RunController {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        executor: Arc<dyn RepoExecutor>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            client,
            executor,
            store,
            limiter: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wire up the real platform client and git executor for `target`.
    ///
    /// The client and the workers share one adaptive rate limiter.
    pub fn for_target(target: &RunTarget, store: Arc<dyn StateStore>) -> Result<Self, RunError> {
        let limiter = AdaptiveRateLimiter::for_provider(target.provider);
        let client = ProviderClient::connect(&target.client_settings(), Some(limiter.clone()))?;
        let executor = GitExecutor::new(target.protocol);
        Ok(Self::new(Arc::new(client), Arc::new(executor), store).with_rate_limiter(limiter))
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: AdaptiveRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Synchronize `target`.
    #[tracing::instrument(skip_all, fields(provider = %target.provider, org = %target.organization, resume = options.resume, dry_run = options.dry_run))]
    pub async fn run(
        &self,
        target: &RunTarget,
        options: &RunOptions,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<RunSummary, RunError> {
        let filter = target.validate()?;
        if self.client.provider() != target.provider {
            return Err(ConfigError::invalid(format!(
                "client is for {}, target is for {}",
                self.client.provider(),
                target.provider
            ))
            .into());
        }

        let policy = options.backoff.clone().with_max_retries(target.max_retries);
        let discovery = DiscoveryOptions {
            page_size: options.page_size,
            verify_token: options.verify_token,
            retry: policy.clone(),
        };
        let discovered = discover(
            self.client.as_ref(),
            &target.organization,
            &filter,
            &discovery,
            on_progress,
        )
        .await?;
        let repositories = discovered.repositories;

        let id = target.id();
        let persisted = if options.resume {
            self.store.load(&id).await?
        } else {
            None
        };
        let mut state = persisted.unwrap_or_else(|| RunState::new(target.clone()));
        state.target = target.clone();

        let report = reconcile(&mut state, &repositories, options.retry_ceiling);
        tracing::info!(
            added = report.added,
            removed = report.removed,
            completed = report.completed,
            interrupted = report.interrupted,
            exhausted = report.exhausted,
            "State reconciled"
        );
        emit(
            on_progress,
            SyncProgress::Reconciled {
                added: report.added,
                removed: report.removed,
                completed: report.completed,
            },
        );

        let collisions = path_collisions(target, &repositories);
        let mut tasks = Vec::new();
        let mut previously_completed = 0usize;
        let mut not_runnable = Vec::new();
        for repo in repositories.iter() {
            let key = repo.key();
            if let Some(reason) = collisions.get(&key) {
                tracing::warn!(repo = %key, reason, "Skipping repository with a colliding path");
                if !options.dry_run {
                    let retry_count = state
                        .outcomes
                        .get(&key)
                        .map(TaskOutcome::retry_count)
                        .unwrap_or(0);
                    state.record(
                        key.clone(),
                        TaskOutcome::Failed {
                            reason: reason.clone(),
                            retry_count,
                        },
                    );
                }
                not_runnable.push((key, reason.clone()));
            } else if state.is_runnable(&key, options.retry_ceiling) {
                let prior_retries = state
                    .outcomes
                    .get(&key)
                    .filter(|outcome| outcome.is_failed())
                    .map(TaskOutcome::retry_count);
                tasks.push(Task {
                    path: target.path_for(repo),
                    repo: repo.clone(),
                    prior_retries,
                });
            } else {
                match state.outcomes.get(&key) {
                    Some(TaskOutcome::Failed {
                        reason,
                        retry_count,
                    }) => not_runnable.push((
                        key,
                        format!("{reason} (retry ceiling reached after {retry_count} retries)"),
                    )),
                    _ => previously_completed += 1,
                }
            }
        }

        let config = SchedulerConfig {
            concurrency: target.concurrency,
            strategy: target.strategy,
            retry: policy,
            task_timeout: options.task_timeout,
        };
        let mut scheduler = Scheduler::new(config, Arc::clone(&self.executor))?
            .with_shutdown(Arc::clone(&self.shutdown));

        if options.dry_run {
            let mut summary = scheduler.plan(tasks, on_progress).await;
            finish_summary(
                &mut summary,
                repositories.len(),
                previously_completed,
                not_runnable,
            );
            if options.cleanup_orphans {
                self.cleanup_orphans(target, &repositories, true, &mut summary, on_progress)
                    .await;
            }
            return Ok(summary);
        }

        self.store.save(&state).await?;
        let (recorder, recorder_handle) = StateRecorder::spawn(Arc::clone(&self.store), state);
        scheduler = scheduler.with_recorder(recorder);
        if let Some(ref limiter) = self.limiter {
            scheduler = scheduler.with_rate_limiter(limiter.clone());
        }

        let mut summary = scheduler.run(tasks, on_progress).await;
        finish_summary(
            &mut summary,
            repositories.len(),
            previously_completed,
            not_runnable,
        );
        if options.cleanup_orphans && !summary.cancelled {
            self.cleanup_orphans(target, &repositories, false, &mut summary, on_progress)
                .await;
        }

        match recorder_handle.await {
            Ok(recorded) => {
                if recorded.failed_saves > 0 {
                    emit(
                        on_progress,
                        SyncProgress::Warning {
                            message: format!(
                                "{} state writes failed; resume may redo some repositories",
                                recorded.failed_saves
                            ),
                        },
                    );
                } else if summary.is_success() && recorded.state.is_complete() {
                    self.store.clear(&id).await?;
                    tracing::debug!(%id, "Run complete, state cleared");
                }
            }
            Err(e) => tracing::error!(error = %e, "State recorder stopped unexpectedly"),
        }

        Ok(summary)
    }

    /// Find, and unless `dry_run` delete, checkouts no longer selected.
    ///
    /// Failures are reported as warnings; they never fail the run.
    async fn cleanup_orphans(
        &self,
        target: &RunTarget,
        repositories: &[RepositoryDescriptor],
        dry_run: bool,
        summary: &mut RunSummary,
        on_progress: Option<&ProgressCallback>,
    ) {
        let expected: HashSet<PathBuf> = repositories.iter().map(|r| target.path_for(r)).collect();
        let found = match find_orphans(&target.root, &expected).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(root = %target.root.display(), error = %e, "Orphan scan failed");
                emit(
                    on_progress,
                    SyncProgress::Warning {
                        message: format!("orphan scan of {} failed: {e}", target.root.display()),
                    },
                );
                return;
            }
        };

        for path in found {
            let removed = if dry_run {
                false
            } else {
                match remove_orphan(&path).await {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "Removed orphaned checkout");
                        summary.orphans_removed += 1;
                        true
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Could not remove orphan");
                        emit(
                            on_progress,
                            SyncProgress::Warning {
                                message: format!("could not remove {}: {e}", path.display()),
                            },
                        );
                        false
                    }
                }
            };
            emit(
                on_progress,
                SyncProgress::Orphan {
                    path: path.display().to_string(),
                    removed,
                },
            );
            summary.orphans.push(path);
        }
    }
}

/// Repositories whose local path is shared with another selected repository,
/// with the reason they cannot be synced.
///
/// Flattening can map distinct keys onto one directory (`tools/cli` and
/// `tools_cli` with `_`). Every repository involved is left out.
fn path_collisions(
    target: &RunTarget,
    repositories: &[RepositoryDescriptor],
) -> BTreeMap<RepositoryKey, String> {
    let mut by_path: BTreeMap<PathBuf, Vec<RepositoryKey>> = BTreeMap::new();
    for repo in repositories {
        by_path.entry(target.path_for(repo)).or_default().push(repo.key());
    }

    let mut collisions = BTreeMap::new();
    for (path, keys) in by_path.into_iter().filter(|(_, keys)| keys.len() > 1) {
        for key in &keys {
            let others: Vec<String> = keys
                .iter()
                .filter(|other| *other != key)
                .map(ToString::to_string)
                .collect();
            collisions.insert(
                key.clone(),
                format!(
                    "local path {} collides with {}",
                    path.display(),
                    others.join(", ")
                ),
            );
        }
    }
    collisions
}

/// Fold the repositories the scheduler never saw into its summary.
fn finish_summary(
    summary: &mut RunSummary,
    total: usize,
    previously_completed: usize,
    not_runnable: Vec<(RepositoryKey, String)>,
) {
    summary.total = total;
    summary.previously_completed = previously_completed;
    for (key, reason) in not_runnable {
        summary.add_failure(key, reason, 0);
    }
    summary.normalize();
}
