//! Platform-agnostic interface to code hosting providers.
//!
//! Every provider adapter implements [`PlatformClient`], which exposes one
//! page of an organization's repositories at a time along with the quota
//! headers the platform reported. [`ProviderClient`] wraps the four adapters
//! behind a single type.
//!
//! # Example
//!
//! ```ignore
//! use synclone::platform::{ClientSettings, PlatformClient, Provider, ProviderClient, VisibilityFilter};
//!
//! let client = ProviderClient::connect(&ClientSettings::new(Provider::GitHub, token), None)?;
//! let page = client.list_repositories("rust-lang", 1, 100, VisibilityFilter::All).await?;
//! for repo in page.items {
//!     println!("{}", repo.full_name());
//! }
//! ```

mod errors;
mod headers;
mod provider;
mod rate_limit;
mod types;

pub use errors::{PlatformError, Result, short_error_message};
pub(crate) use errors::truncate_message;
pub use headers::{api_base, is_quota_exhausted, parse_rate_limit_headers, parse_retry_after};
pub use provider::{ClientSettings, ProviderClient};
pub use rate_limit::{AdaptiveRateLimiter, DEFAULT_COOLDOWN, RateLimiterConfig};
pub use types::{
    CloneUrls, PlatformClient, Provider, RateLimitInfo, RepoPage, RepositoryDescriptor,
    RepositoryKey, UserInfo, Visibility, VisibilityFilter,
};

#[cfg(test)]
pub(crate) use types::descriptor;
