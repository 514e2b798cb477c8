//! Conversion from Gitea API types to provider-neutral descriptors.

use super::types::GiteaRepo;
use crate::platform::{CloneUrls, Provider, RepositoryDescriptor, Visibility};

/// Convert a Gitea repository listed under `org`.
pub fn to_descriptor(repo: GiteaRepo, org: &str) -> RepositoryDescriptor {
    let visibility = if repo.internal {
        Visibility::Internal
    } else if repo.private {
        Visibility::Private
    } else {
        Visibility::Public
    };

    RepositoryDescriptor {
        provider: Provider::Gitea,
        organization: org.to_string(),
        namespace: repo.owner.login,
        name: repo.name,
        default_branch: repo
            .default_branch
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "main".to_string()),
        visibility,
        archived: repo.archived,
        fork: repo.fork,
        language: repo.language.filter(|l| !l.is_empty()),
        size_kb: repo.size,
        star_count: repo.stars_count,
        updated_at: repo.updated_at,
        topics: repo.topics,
        clone_urls: CloneUrls {
            https: repo.clone_url,
            ssh: repo.ssh_url.filter(|u| !u.is_empty()),
        },
    }
}
