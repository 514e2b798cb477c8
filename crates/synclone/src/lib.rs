//! Synclone - bulk repository synchronization.
//!
//! Discovers every repository of an organization or group on GitHub,
//! GitLab, Gitea or Gogs, then clones or updates each one into a local
//! directory tree with a bounded, rate-limited worker pool. Progress is
//! persisted per repository so an interrupted run can be resumed.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use synclone::{JsonFileStore, Provider, RunController, RunOptions, RunTarget};
//!
//! let mut target = RunTarget::new(Provider::GitHub, "rust-lang", "/src/rust-lang");
//! target.token = std::env::var("GITHUB_TOKEN")?;
//!
//! let store = Arc::new(JsonFileStore::new("/var/lib/synclone/runs"));
//! let controller = RunController::for_target(&target, store)?;
//! let summary = controller.run(&target, &RunOptions::default(), None).await?;
//! println!("{} cloned, {} updated, {} failed", summary.cloned, summary.updated, summary.failed);
//! ```

pub mod discovery;
pub mod error;
pub mod executor;
pub mod http;
pub mod orphans;
pub mod platform;
pub mod progress;
pub mod retry;
pub mod run;
pub mod scheduler;
pub mod state;

pub mod gitea;
pub mod github;
pub mod gitlab;
pub mod gogs;

pub use discovery::{DiscoveryError, Filter, FilterSpec};
pub use error::ConfigError;
pub use executor::{Action, GitExecutor, Layout, Protocol, RepoExecutor, Strategy, TaskError};
pub use platform::{
    AdaptiveRateLimiter, PlatformClient, PlatformError, Provider, ProviderClient,
    RepositoryDescriptor, RepositoryKey, VisibilityFilter,
};
pub use progress::{ProgressCallback, SyncProgress};
pub use run::{RunController, RunError, RunOptions, RunTarget};
pub use scheduler::RunSummary;
pub use state::{JsonFileStore, RunState, StateError, StateStore, TargetId, TaskOutcome};
