//! Gogs provider adapter.
//!
//! The Gogs organization listing is not paginated; the whole listing comes
//! back as page 1.

mod client;
mod convert;
mod error;
mod types;

pub use client::GogsClient;
pub use convert::to_descriptor;
pub use error::GogsError;
pub use types::{GogsRepo, GogsUser};
