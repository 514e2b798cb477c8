use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How an existing local repository is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Discard local changes and hard-reset to the remote default branch.
    #[default]
    Reset,
    /// Merge the remote default branch into the local branch.
    Pull,
    /// Update remote-tracking refs only.
    Fetch,
    /// Rebase local work onto the remote default branch.
    Rebase,
    /// Clone missing repositories, leave existing ones alone.
    Clone,
    /// Do nothing.
    Skip,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::Reset,
        Strategy::Pull,
        Strategy::Fetch,
        Strategy::Rebase,
        Strategy::Clone,
        Strategy::Skip,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Reset => "reset",
            Strategy::Pull => "pull",
            Strategy::Fetch => "fetch",
            Strategy::Rebase => "rebase",
            Strategy::Clone => "clone",
            Strategy::Skip => "skip",
        }
    }

    /// Whether the strategy may throw away uncommitted work.
    pub fn is_destructive(self) -> bool {
        matches!(self, Strategy::Reset)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

/// The git operation actually performed for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Clone,
    Reset,
    Pull,
    Fetch,
    Rebase,
    Skip,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Clone => "clone",
            Action::Reset => "reset",
            Action::Pull => "pull",
            Action::Fetch => "fetch",
            Action::Rebase => "rebase",
            Action::Skip => "skip",
        }
    }

    /// Past-tense label used in summaries.
    pub fn past_tense(self) -> &'static str {
        match self {
            Action::Clone => "cloned",
            Action::Skip => "skipped",
            _ => "updated",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is on disk at a repository's local path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Absent,
    Clean,
    /// Present with uncommitted or untracked changes.
    Dirty,
}

impl LocalState {
    pub fn is_present(self) -> bool {
        !matches!(self, LocalState::Absent)
    }
}

/// Result of running (or planning) one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Synced(Action),
    Skipped(String),
}

/// Reason recorded when the strategy itself is `skip`.
pub const SKIP_STRATEGY_REASON: &str = "strategy=skip";
/// Reason recorded when `clone` finds the repository already present.
pub const ALREADY_CLONED_REASON: &str = "already cloned";

/// Decide what `strategy` does given the local state.
///
/// Every updating strategy degrades to a clone when nothing is on disk yet.
pub fn plan(strategy: Strategy, local: LocalState) -> ExecOutcome {
    match (strategy, local) {
        (Strategy::Skip, _) => ExecOutcome::Skipped(SKIP_STRATEGY_REASON.to_string()),
        (_, LocalState::Absent) => ExecOutcome::Synced(Action::Clone),
        (Strategy::Clone, _) => ExecOutcome::Skipped(ALREADY_CLONED_REASON.to_string()),
        (Strategy::Reset, _) => ExecOutcome::Synced(Action::Reset),
        (Strategy::Pull, _) => ExecOutcome::Synced(Action::Pull),
        (Strategy::Fetch, _) => ExecOutcome::Synced(Action::Fetch),
        (Strategy::Rebase, _) => ExecOutcome::Synced(Action::Rebase),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_strategy_case_insensitively() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
            assert_eq!(
                strategy.as_str().to_uppercase().parse::<Strategy>().unwrap(),
                strategy
            );
        }
    }

    #[test]
    fn unknown_strategy_is_config_error() {
        let err = "merge".parse::<Strategy>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy(ref s) if s == "merge"));
    }

    #[test]
    fn default_strategy_is_reset() {
        assert_eq!(Strategy::default(), Strategy::Reset);
        assert!(Strategy::Reset.is_destructive());
        assert!(!Strategy::Pull.is_destructive());
    }

    #[test]
    fn absent_repositories_are_cloned_by_every_updating_strategy() {
        for strategy in [
            Strategy::Reset,
            Strategy::Pull,
            Strategy::Fetch,
            Strategy::Rebase,
            Strategy::Clone,
        ] {
            assert_eq!(
                plan(strategy, LocalState::Absent),
                ExecOutcome::Synced(Action::Clone),
                "{strategy}"
            );
        }
    }

    #[test]
    fn skip_never_touches_anything() {
        for local in [LocalState::Absent, LocalState::Clean, LocalState::Dirty] {
            assert_eq!(
                plan(Strategy::Skip, local),
                ExecOutcome::Skipped("strategy=skip".to_string())
            );
        }
    }

    #[test]
    fn present_repositories_follow_the_strategy() {
        assert_eq!(
            plan(Strategy::Clone, LocalState::Clean),
            ExecOutcome::Skipped("already cloned".to_string())
        );
        assert_eq!(
            plan(Strategy::Reset, LocalState::Dirty),
            ExecOutcome::Synced(Action::Reset)
        );
        assert_eq!(
            plan(Strategy::Rebase, LocalState::Dirty),
            ExecOutcome::Synced(Action::Rebase)
        );
        assert_eq!(
            plan(Strategy::Fetch, LocalState::Clean),
            ExecOutcome::Synced(Action::Fetch)
        );
    }

    #[test]
    fn action_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Clone).unwrap(), "\"clone\"");
        assert_eq!(Action::Pull.past_tense(), "updated");
        assert_eq!(Action::Clone.past_tense(), "cloned");
    }
}
