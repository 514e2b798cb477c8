use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single repository task. Never aborts the run.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("merge conflict")]
    MergeConflict,

    #[error("rebase conflict")]
    RebaseConflict,

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Permission denied or disk full while writing the working tree.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("timeout")]
    Timeout,

    #[error("{} exists but is not a git repository", .0.display())]
    NotARepository(PathBuf),

    #[error("origin points at {found}, expected {expected}")]
    RemoteMismatch { expected: String, found: String },

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("failed to run git: {0}")]
    Spawn(String),
}

impl TaskError {
    /// Whether the same task could succeed on another attempt.
    ///
    /// Conflicts and states that only a human can fix are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::Network(_)
            | TaskError::RateLimited { .. }
            | TaskError::Timeout
            | TaskError::Git { .. } => true,
            TaskError::MergeConflict
            | TaskError::RebaseConflict
            | TaskError::Auth(_)
            | TaskError::Filesystem(_)
            | TaskError::NotARepository(_)
            | TaskError::RemoteMismatch { .. }
            | TaskError::Spawn(_) => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TaskError::RateLimited { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TaskError::MergeConflict | TaskError::RebaseConflict)
    }

    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        TaskError::Filesystem(format!("{context}: {err}"))
    }
}

/// Map git's stderr for a failed `command` onto a [`TaskError`].
pub fn classify_git_failure(command: &str, stderr: &str) -> TaskError {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().lines().last().unwrap_or_default().to_string();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["rate limit", "too many requests", "error: 429", " 429"]) {
        return TaskError::RateLimited {
            message,
            retry_after: None,
        };
    }
    if has(&[
        "authentication failed",
        "could not read username",
        "could not read password",
        "terminal prompts disabled",
        "permission denied (publickey",
        "invalid username or password",
        "the requested url returned error: 401",
        "the requested url returned error: 403",
    ]) {
        return TaskError::Auth(message);
    }
    if has(&[
        "could not resolve host",
        "connection timed out",
        "connection refused",
        "connection reset",
        "network is unreachable",
        "operation timed out",
        "the remote end hung up",
        "early eof",
        "unexpected disconnect",
        "failed to connect",
        "tls",
        "ssl",
        "the requested url returned error: 5",
    ]) {
        return TaskError::Network(message);
    }
    if has(&[
        "no space left on device",
        "disk quota exceeded",
        "permission denied",
        "read-only file system",
    ]) {
        return TaskError::Filesystem(message);
    }

    TaskError::Git {
        command: command.to_string(),
        message,
    }
}
