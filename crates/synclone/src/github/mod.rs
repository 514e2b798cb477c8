//! GitHub provider adapter.
//!
//! Lists organization repositories through the REST API, following `Link`
//! header pagination. Works against github.com and GitHub Enterprise Server.

mod client;
mod convert;
mod error;
mod pagination;
mod types;

pub use client::{GITHUB_API, GitHubClient, MAX_PAGE_SIZE};
pub use convert::to_descriptor;
pub use error::GitHubError;
pub use pagination::{LinkPagination, parse_link_header};
pub use types::{GitHubOwner, GitHubRepo, GitHubUser};
