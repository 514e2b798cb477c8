use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::executor::Action;
use crate::platform::{Provider, RepositoryDescriptor, RepositoryKey};
use crate::run::RunTarget;

/// Outcome of one repository task as persisted in a [`RunState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Pending,
    Running,
    Success {
        action: Action,
    },
    Failed {
        reason: String,
        /// Retries spent on this repository, cumulative across resumed runs.
        retry_count: u32,
    },
    Skipped {
        reason: String,
    },
}

impl TaskOutcome {
    /// Completed outcomes are never executed again on resume.
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. } | TaskOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }

    pub fn retry_count(&self) -> u32 {
        match self {
            TaskOutcome::Failed { retry_count, .. } => *retry_count,
            _ => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Pending => "pending",
            TaskOutcome::Running => "running",
            TaskOutcome::Success { .. } => "success",
            TaskOutcome::Failed { .. } => "failed",
            TaskOutcome::Skipped { .. } => "skipped",
        }
    }

    /// Free-form detail for display: the action, failure or skip reason.
    pub fn detail(&self) -> Option<String> {
        match self {
            TaskOutcome::Success { action } => Some(action.past_tense().to_string()),
            TaskOutcome::Failed {
                reason,
                retry_count,
            } => Some(format!("{reason} (retries: {retry_count})")),
            TaskOutcome::Skipped { reason } => Some(reason.clone()),
            TaskOutcome::Pending | TaskOutcome::Running => None,
        }
    }
}

/// Stable identifier of a run target, used as the state file name.
///
/// `{provider}-{org}-{16 hex chars}` where the hash covers the provider, the
/// organization and the local root, so two targets never share a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn derive(provider: Provider, organization: &str, root: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(organization.as_bytes());
        hasher.update([0u8]);
        hasher.update(root.to_string_lossy().as_bytes());
        let digest = hex::encode(hasher.finalize());

        let org: String = organization
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();

        Self(format!("{provider}-{org}-{}", &digest[..16]))
    }

    /// Accept an identifier typed by a user. Rejects anything that could
    /// leave the state directory.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().trim_end_matches(".json");
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable record of one run target's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub id: TargetId,
    pub target: RunTarget,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub outcomes: BTreeMap<RepositoryKey, TaskOutcome>,
}

/// Outcome tallies of a [`RunState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.success + self.failed + self.skipped
    }
}

impl RunState {
    pub fn new(target: RunTarget) -> Self {
        let now = Utc::now();
        Self {
            id: target.id(),
            target,
            created_at: now,
            updated_at: now,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, key: RepositoryKey, outcome: TaskOutcome) {
        self.outcomes.insert(key, outcome);
        self.updated_at = Utc::now();
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for outcome in self.outcomes.values() {
            match outcome {
                TaskOutcome::Pending => counts.pending += 1,
                TaskOutcome::Running => counts.running += 1,
                TaskOutcome::Success { .. } => counts.success += 1,
                TaskOutcome::Failed { .. } => counts.failed += 1,
                TaskOutcome::Skipped { .. } => counts.skipped += 1,
            }
        }
        counts
    }

    /// Every repository reached `Success` or `Skipped`.
    pub fn is_complete(&self) -> bool {
        self.outcomes.values().all(TaskOutcome::is_completed)
    }

    /// Whether `key` should run (again) on resume.
    ///
    /// Pending repositories always run. Failed ones run until their
    /// cumulative retries reach `retry_ceiling`.
    pub fn is_runnable(&self, key: &RepositoryKey, retry_ceiling: u32) -> bool {
        match self.outcomes.get(key) {
            None | Some(TaskOutcome::Pending) | Some(TaskOutcome::Running) => true,
            Some(TaskOutcome::Failed { retry_count, .. }) => *retry_count < retry_ceiling,
            Some(TaskOutcome::Success { .. }) | Some(TaskOutcome::Skipped { .. }) => false,
        }
    }
}

/// What [`reconcile`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New repositories added as pending.
    pub added: usize,
    /// Repositories dropped because discovery no longer lists them.
    pub removed: usize,
    /// Repositories already completed in an earlier run.
    pub completed: usize,
    /// Interrupted (`Running`) entries reset to pending.
    pub interrupted: usize,
    /// Failed repositories that reached the retry ceiling and will not run.
    pub exhausted: usize,
}

/// Merge a persisted state with a fresh discovery result.
///
/// Keys no longer listed are dropped and new ones are added as `Pending`,
/// so afterwards the outcome keys equal the discovered keys.
pub fn reconcile(
    state: &mut RunState,
    fresh: &[RepositoryDescriptor],
    retry_ceiling: u32,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut outcomes = BTreeMap::new();

    for repo in fresh {
        let key = repo.key();
        let outcome = match state.outcomes.remove(&key) {
            None => {
                report.added += 1;
                TaskOutcome::Pending
            }
            Some(TaskOutcome::Running) => {
                report.interrupted += 1;
                TaskOutcome::Pending
            }
            Some(outcome) => {
                if outcome.is_completed() {
                    report.completed += 1;
                } else if outcome.retry_count() >= retry_ceiling && outcome.is_failed() {
                    report.exhausted += 1;
                }
                outcome
            }
        };
        outcomes.insert(key, outcome);
    }

    report.removed = state.outcomes.len();
    state.outcomes = outcomes;
    state.updated_at = Utc::now();
    report
}
