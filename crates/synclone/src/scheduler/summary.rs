use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::executor::{Action, ExecOutcome, TaskError};
use crate::platform::RepositoryKey;

/// A repository that ended the run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub key: RepositoryKey,
    pub reason: String,
    /// Attempts made in this run; zero when the retry ceiling kept it from running.
    pub attempts: u32,
}

/// Dry run: what would happen to one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTask {
    pub key: RepositoryKey,
    pub path: PathBuf,
    pub action: Option<Action>,
    /// Skip reason, or the error that would stop the repository.
    pub note: Option<String>,
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Order-independent tally of a run.
///
/// `cloned + updated + failed + skipped + not_started + previously_completed`
/// equals `total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub cloned: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Repositories selected by discovery.
    pub total: usize,
    #[serde(rename = "duration_secs", serialize_with = "as_secs")]
    pub duration: Duration,
    pub errors: Vec<TaskFailure>,
    /// Rate-limit signals observed during the run.
    pub throttled: u64,
    pub cancelled: bool,
    /// Tasks never dispatched because the run was cancelled.
    pub not_started: usize,
    /// Repositories completed by an earlier run and not executed again.
    pub previously_completed: usize,
    pub dry_run: bool,
    pub planned: Vec<PlannedTask>,
    /// Checkouts under the root that are no longer selected. Only filled
    /// when orphan cleanup is enabled; a dry run lists without deleting.
    pub orphans: Vec<PathBuf>,
    pub orphans_removed: usize,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Fold one finished task into the tally.
    pub fn add(&mut self, key: &RepositoryKey, result: &Result<ExecOutcome, TaskError>, attempts: u32) {
        match result {
            Ok(ExecOutcome::Synced(Action::Clone)) => self.cloned += 1,
            Ok(ExecOutcome::Synced(_)) => self.updated += 1,
            Ok(ExecOutcome::Skipped(_)) => self.skipped += 1,
            Err(err) => self.add_failure(key.clone(), err.to_string(), attempts),
        }
    }

    pub fn add_failure(&mut self, key: RepositoryKey, reason: String, attempts: u32) {
        self.failed += 1;
        self.errors.push(TaskFailure {
            key,
            reason,
            attempts,
        });
    }

    /// Number of tasks that reached a final outcome in this run.
    pub fn finished(&self) -> usize {
        self.cloned + self.updated + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Nothing failed and nothing was left undone.
    pub fn is_success(&self) -> bool {
        !self.has_failures() && !self.cancelled && self.not_started == 0
    }

    /// Sort errors and plans by key so output is stable regardless of
    /// completion order.
    pub fn normalize(&mut self) {
        self.errors.sort_by(|a, b| a.key.cmp(&b.key));
        self.planned.sort_by(|a, b| a.key.cmp(&b.key));
    }
}
