//! Gitea provider adapter.
//!
//! Lists organization repositories on Gitea-based forges (Gitea, Forgejo,
//! Codeberg). Pagination uses `page`/`limit` and ends on a short page.

mod client;
mod convert;
mod error;
mod types;

pub use client::{GiteaClient, MAX_PAGE_SIZE};
pub use convert::to_descriptor;
pub use error::{GiteaError, short_error_message};
pub use types::{GiteaRepo, GiteaUser};
