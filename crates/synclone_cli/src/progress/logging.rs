use synclone::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::FetchingRepos { namespace } => {
                tracing::info!(namespace = %namespace, "Fetching repositories");
            }

            SyncProgress::FetchedPage {
                namespace,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(namespace = %namespace, page, count, total_so_far, "Fetched page");
            }

            SyncProgress::PageFetchRetry {
                page,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(page, retry_after_ms, attempt, "Page fetch failed, retrying");
            }

            SyncProgress::FetchComplete { namespace, total } => {
                tracing::info!(namespace = %namespace, total, "Fetch complete");
            }

            SyncProgress::FilterComplete {
                namespace,
                matched,
                total,
            } => {
                tracing::info!(namespace = %namespace, matched, total, "Filters applied");
            }

            SyncProgress::Reconciled {
                added,
                removed,
                completed,
            } => {
                tracing::info!(added, removed, completed, "Resume state reconciled");
            }

            SyncProgress::SyncStarting {
                tasks,
                concurrency,
                dry_run,
            } => {
                tracing::info!(tasks, concurrency, dry_run, "Starting sync");
            }

            SyncProgress::RepoStarted { key } => {
                tracing::debug!(repo = %key, "Started");
            }

            SyncProgress::RepoSynced { key, action } => {
                tracing::info!(repo = %key, action = %action, "Synced");
            }

            SyncProgress::RepoSkipped { key, reason } => {
                tracing::info!(repo = %key, reason = %reason, "Skipped");
            }

            SyncProgress::RepoFailed { key, reason } => {
                tracing::error!(repo = %key, reason = %reason, "Failed");
            }

            SyncProgress::TaskRetry {
                key,
                reason,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(repo = %key, reason = %reason, retry_after_ms, attempt, "Retrying");
            }

            SyncProgress::Planned { key, action, path } => {
                tracing::info!(repo = %key, action = %action, path = %path, "Would sync");
            }

            SyncProgress::RateLimited { current_rps } => {
                tracing::warn!(current_rps, "Rate limited, slowing down");
            }

            SyncProgress::Cancelling { in_flight } => {
                tracing::warn!(in_flight, "Cancelling, waiting for in-flight repositories");
            }

            SyncProgress::SyncComplete { duration } => {
                tracing::info!(duration_secs = duration.as_secs_f64(), "Sync complete");
            }

            SyncProgress::Orphan { path, removed } => {
                tracing::info!(path = %path, removed, "Orphaned checkout");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
