//! Per-repository clone and update.
//!
//! [`GitExecutor`] inspects what is on disk at a repository's local path
//! (absent, clean or dirty), picks the action the [`Strategy`] calls for and
//! runs it through the system `git`. Clones are written to a hidden
//! `.<name>.partial` sibling and renamed into place once complete, so an
//! interrupted clone never looks like a present repository.

mod error;
mod git;
mod path;
mod strategy;

pub use error::{TaskError, classify_git_failure};
pub use git::{Git, GitOutput, normalize_remote};
pub use path::{DEFAULT_DELIMITER, Layout, flatten_name, local_path, partial_path};
pub use strategy::{
    ALREADY_CLONED_REASON, Action, ExecOutcome, LocalState, SKIP_STRATEGY_REASON, Strategy, plan,
};

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::platform::{CloneUrls, RepositoryDescriptor};

/// Which clone URL to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Https,
    /// Falls back to HTTPS when the platform reports no SSH URL.
    Ssh,
}

impl Protocol {
    pub fn clone_url(self, urls: &CloneUrls) -> &str {
        match self {
            Protocol::Ssh => urls.ssh.as_deref().unwrap_or(&urls.https),
            Protocol::Https => &urls.https,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Https => "https",
            Protocol::Ssh => "ssh",
        })
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "https" | "http" => Ok(Protocol::Https),
            "ssh" => Ok(Protocol::Ssh),
            other => Err(format!("unknown protocol '{other}' (expected https or ssh)")),
        }
    }
}

/// Performs the clone-or-update for one repository.
///
/// The scheduler only talks to this trait, so tests can count, delay or
/// fail executions without touching git.
#[async_trait]
pub trait RepoExecutor: Send + Sync {
    /// Bring `path` up to date with `repo` according to `strategy`.
    async fn execute(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
        strategy: Strategy,
    ) -> Result<ExecOutcome, TaskError>;

    /// Report what [`execute`](Self::execute) would do without changing
    /// anything on disk.
    async fn plan(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
        strategy: Strategy,
    ) -> Result<ExecOutcome, TaskError>;
}

/// [`RepoExecutor`] backed by the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitExecutor {
    git: Git,
    protocol: Protocol,
}

impl GitExecutor {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            git: Git::new(),
            protocol,
        }
    }

    #[must_use]
    pub fn with_git(mut self, git: Git) -> Self {
        self.git = git;
        self
    }

    /// Classify what is at `path`.
    ///
    /// An empty directory counts as absent. Anything else must be a git work
    /// tree whose `origin` is one of the repository's clone URLs.
    pub async fn inspect(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
    ) -> Result<LocalState, TaskError> {
        match tokio::fs::metadata(path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LocalState::Absent),
            Err(e) => return Err(TaskError::io("inspect", e)),
            Ok(meta) if !meta.is_dir() => return Err(TaskError::NotARepository(path.to_path_buf())),
            Ok(_) => {}
        }

        if is_empty_dir(path).await? {
            return Ok(LocalState::Absent);
        }

        let has_git_dir = tokio::fs::try_exists(path.join(".git"))
            .await
            .map_err(|e| TaskError::io("inspect", e))?;
        if !has_git_dir {
            return Err(TaskError::NotARepository(path.to_path_buf()));
        }

        let expected = self.protocol.clone_url(&repo.clone_urls).to_string();
        match self.git.origin_url(path).await? {
            Some(found) if remote_matches(&found, &repo.clone_urls) => {}
            found => {
                return Err(TaskError::RemoteMismatch {
                    expected,
                    found: found.unwrap_or_else(|| "(no origin)".to_string()),
                });
            }
        }

        if self.git.is_dirty(path).await? {
            Ok(LocalState::Dirty)
        } else {
            Ok(LocalState::Clean)
        }
    }

    async fn clone_into(&self, repo: &RepositoryDescriptor, dest: &Path) -> Result<(), TaskError> {
        let partial = partial_path(dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::io("create parent directory", e))?;
        }
        remove_dir_if_exists(&partial).await?;

        let url = self.protocol.clone_url(&repo.clone_urls);
        if let Err(err) = self.git.clone(url, &partial).await {
            if let Err(e) = remove_dir_if_exists(&partial).await {
                tracing::warn!(path = %partial.display(), error = %e, "Failed to clean up partial clone");
            }
            return Err(err);
        }

        // Only an empty directory can be here; inspect rejects anything else.
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tokio::fs::remove_dir(dest)
                .await
                .map_err(|e| TaskError::io("replace empty directory", e))?;
        }
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| TaskError::io("move clone into place", e))
    }

    async fn apply(
        &self,
        action: Action,
        repo: &RepositoryDescriptor,
        path: &Path,
    ) -> Result<(), TaskError> {
        let branch = Some(repo.default_branch.as_str()).filter(|b| !b.is_empty());
        match action {
            Action::Clone => self.clone_into(repo, path).await,
            Action::Reset => self.git.reset_to(path, branch).await,
            Action::Pull => self.git.pull(path, branch).await,
            Action::Fetch => self.git.fetch(path).await,
            Action::Rebase => self.git.rebase(path, branch).await,
            Action::Skip => Ok(()),
        }
    }
}

#[async_trait]
impl RepoExecutor for GitExecutor {
    #[tracing::instrument(skip_all, fields(repo = %repo.key(), %strategy))]
    async fn execute(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
        strategy: Strategy,
    ) -> Result<ExecOutcome, TaskError> {
        if strategy == Strategy::Skip {
            return Ok(plan(strategy, LocalState::Absent));
        }

        let local = self.inspect(repo, path).await?;
        if local == LocalState::Dirty {
            if strategy.is_destructive() {
                tracing::warn!(path = %path.display(), "Discarding local changes");
            } else {
                tracing::debug!(path = %path.display(), "Working tree has local changes");
            }
        }

        let outcome = plan(strategy, local);
        if let ExecOutcome::Synced(action) = outcome {
            self.apply(action, repo, path).await?;
            tracing::debug!(%action, "Repository synchronized");
        }
        Ok(outcome)
    }

    async fn plan(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
        strategy: Strategy,
    ) -> Result<ExecOutcome, TaskError> {
        if strategy == Strategy::Skip {
            return Ok(plan(strategy, LocalState::Absent));
        }
        let local = self.inspect(repo, path).await?;
        Ok(plan(strategy, local))
    }
}

fn remote_matches(found: &str, urls: &CloneUrls) -> bool {
    let found = normalize_remote(found);
    std::iter::once(urls.https.as_str())
        .chain(urls.ssh.as_deref())
        .any(|url| normalize_remote(url) == found)
}

async fn is_empty_dir(path: &Path) -> Result<bool, TaskError> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| TaskError::io("inspect", e))?;
    let first = entries
        .next_entry()
        .await
        .map_err(|e| TaskError::io("inspect", e))?;
    Ok(first.is_none())
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), TaskError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TaskError::io("remove partial clone", e)),
    }
}
