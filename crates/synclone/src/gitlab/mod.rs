//! GitLab provider adapter.
//!
//! Lists projects of a group, optionally including all nested subgroups,
//! following `X-Next-Page` pagination. Works against gitlab.com and
//! self-managed instances.

mod client;
mod convert;
mod error;
mod types;

pub use client::{GitLabClient, MAX_PAGE_SIZE, encode_group_path};
pub use convert::to_descriptor;
pub use error::GitLabError;
pub use types::{GitLabNamespace, GitLabProject, GitLabUser};
