//! Conversion from GitHub API types to provider-neutral descriptors.

use super::types::GitHubRepo;
use crate::platform::{CloneUrls, Provider, RepositoryDescriptor, Visibility};

/// Convert a GitHub repository listed under `org`.
pub fn to_descriptor(repo: GitHubRepo, org: &str) -> RepositoryDescriptor {
    let visibility = match repo.visibility.as_deref() {
        Some("internal") => Visibility::Internal,
        Some("public") => Visibility::Public,
        Some("private") => Visibility::Private,
        _ if repo.private => Visibility::Private,
        _ => Visibility::Public,
    };

    // GitHub's updated_at also moves on metadata edits; prefer the later of the two.
    let updated_at = match (repo.updated_at, repo.pushed_at) {
        (Some(u), Some(p)) => Some(u.max(p)),
        (u, p) => u.or(p),
    };

    RepositoryDescriptor {
        provider: Provider::GitHub,
        organization: org.to_string(),
        namespace: repo.owner.login,
        name: repo.name,
        default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
        visibility,
        archived: repo.archived,
        fork: repo.fork,
        language: repo.language,
        size_kb: repo.size,
        star_count: repo.stargazers_count,
        updated_at,
        topics: repo.topics,
        clone_urls: CloneUrls {
            https: repo.clone_url,
            ssh: repo.ssh_url,
        },
    }
}
