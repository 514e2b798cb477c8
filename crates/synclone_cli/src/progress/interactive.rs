use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use synclone::SyncProgress;

const TICK: Duration = Duration::from_millis(100);

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Spinner for listing and filtering the current target.
    fetch_bar: Option<ProgressBar>,
    /// Bar for the worker pool of the current target.
    sync_bar: Option<ProgressBar>,
    dry_run: bool,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::FetchingRepos { namespace } => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.enable_steady_tick(TICK);
                pb.set_prefix(format!("{:12}", truncate(&namespace, 12)));
                pb.set_message("Fetching repositories...");
                state.fetch_bar = Some(pb);
            }

            SyncProgress::FetchedPage {
                page, total_so_far, ..
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!("Page {} ({} repos)", page, total_so_far));
                }
            }

            SyncProgress::PageFetchRetry {
                page,
                retry_after_ms,
                attempt,
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!(
                        "⏳ page {} failed, retry {} in {:.1}s",
                        page,
                        attempt,
                        retry_after_ms as f64 / 1000.0
                    ));
                }
            }

            SyncProgress::FetchComplete { total, .. } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!("Fetched {} repos, filtering...", total));
                }
            }

            SyncProgress::FilterComplete { matched, total, .. } => {
                if let Some(pb) = state.fetch_bar.take() {
                    pb.finish_with_message(format!("✓ {}/{} repos selected", matched, total));
                }
            }

            SyncProgress::Reconciled { completed, .. } => {
                if completed > 0 {
                    drop(state);
                    self.println(&format!(
                        "↻ resuming: {} repositories already done",
                        completed
                    ));
                }
            }

            SyncProgress::SyncStarting { tasks, dry_run, .. } => {
                let pb = self.multi.add(ProgressBar::new(tasks as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", if dry_run { "Planning" } else { "Syncing" }));
                state.dry_run = dry_run;
                state.sync_bar = Some(pb);
            }

            SyncProgress::RepoStarted { key } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.set_message(key);
                }
            }

            SyncProgress::RepoSynced { key, action } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.inc(1);
                    pb.set_message(format!("✓ {} {}", key, action.past_tense()));
                }
            }

            SyncProgress::RepoSkipped { key, reason } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.inc(1);
                    pb.set_message(format!("· {} ({})", key, reason));
                }
            }

            SyncProgress::RepoFailed { key, reason } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.inc(1);
                }
                drop(state);
                self.println(&format!("{} {}: {}", style("✗").red(), key, reason));
            }

            SyncProgress::TaskRetry {
                key,
                retry_after_ms,
                attempt,
                ..
            } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.set_message(format!(
                        "⏳ {} retry {} in {:.1}s",
                        key,
                        attempt,
                        retry_after_ms as f64 / 1000.0
                    ));
                }
            }

            SyncProgress::Planned { key, action, path } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.inc(1);
                }
                drop(state);
                self.println(&format!("→ {:7} {} ({})", action.as_str(), key, path));
            }

            SyncProgress::RateLimited { current_rps } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.set_message(format!("rate limited, slowing to {:.1} req/s", current_rps));
                }
            }

            SyncProgress::Cancelling { in_flight } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.set_message(format!("cancelling, waiting for {} in flight", in_flight));
                }
            }

            SyncProgress::SyncComplete { duration } => {
                if let Some(pb) = state.sync_bar.take() {
                    let verb = if state.dry_run { "planned" } else { "done" };
                    pb.finish_with_message(format!("✓ {} in {:.1}s", verb, duration.as_secs_f64()));
                }
            }

            SyncProgress::Orphan { path, removed } => {
                drop(state);
                let verb = if removed { "removed" } else { "would remove" };
                self.println(&format!("{} {} orphan {}", style("-").dim(), verb, path));
            }

            SyncProgress::Warning { message } => {
                drop(state);
                self.println(&format!("⚠ {}", message));
            }

            _ => {}
        }
    }

    pub fn println(&self, line: &str) {
        self.multi.println(line).ok();
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for pb in [&state.fetch_bar, &state.sync_bar].into_iter().flatten() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let head: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
