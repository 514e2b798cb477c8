//! Progress events emitted while a run discovers and synchronizes repositories.
//!
//! The library never renders anything itself. Front ends register a
//! [`ProgressCallback`] and turn these events into progress bars or log lines.

use std::time::Duration;

use crate::executor::Action;

/// Progress events emitted during a run.
///
/// Uses platform-agnostic terminology: "namespace" for an organization or
/// group, "repository" for a repository or project.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// Starting to list repositories for a namespace.
    FetchingRepos {
        namespace: String,
    },

    /// Fetched one page of the listing.
    FetchedPage {
        namespace: String,
        /// Page number (1-indexed).
        page: u32,
        /// Number of repos on this page.
        count: usize,
        /// Running total of repos fetched so far.
        total_so_far: usize,
    },

    /// A page fetch failed and will be retried.
    PageFetchRetry {
        page: u32,
        retry_after_ms: u64,
        attempt: u32,
    },

    /// Finished listing all repositories.
    FetchComplete {
        namespace: String,
        total: usize,
    },

    /// Filters applied to the listing.
    FilterComplete {
        namespace: String,
        matched: usize,
        total: usize,
    },

    /// Persisted state was merged with a fresh listing.
    Reconciled {
        /// Repositories newly added as pending.
        added: usize,
        /// Repositories dropped because they are no longer listed.
        removed: usize,
        /// Repositories already completed in an earlier run.
        completed: usize,
    },

    /// The worker pool is starting.
    SyncStarting {
        tasks: usize,
        concurrency: usize,
        dry_run: bool,
    },

    /// A worker picked up a repository.
    RepoStarted {
        key: String,
    },

    /// A repository task finished successfully.
    RepoSynced {
        key: String,
        action: Action,
    },

    /// A repository was skipped.
    RepoSkipped {
        key: String,
        reason: String,
    },

    /// A repository task failed after all retries.
    RepoFailed {
        key: String,
        reason: String,
    },

    /// A repository task failed and will be retried.
    TaskRetry {
        key: String,
        reason: String,
        retry_after_ms: u64,
        attempt: u32,
    },

    /// Dry run: the action that would be taken for a repository.
    Planned {
        key: String,
        action: Action,
        path: String,
    },

    /// The rate limiter lowered its request rate.
    RateLimited {
        current_rps: f64,
    },

    /// Cancellation was observed; no new tasks will start.
    Cancelling {
        in_flight: usize,
    },

    /// A checkout that is no longer selected was found under the root.
    Orphan {
        path: String,
        removed: bool,
    },

    /// All tasks are done.
    SyncComplete {
        duration: Duration,
    },

    /// Warning message (non-fatal).
    Warning {
        message: String,
    },
}

/// Callback for progress updates.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
