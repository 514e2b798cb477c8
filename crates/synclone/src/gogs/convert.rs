//! Conversion from Gogs API types to provider-neutral descriptors.

use super::types::GogsRepo;
use crate::platform::{CloneUrls, Provider, RepositoryDescriptor, Visibility};

pub fn to_descriptor(repo: GogsRepo, org: &str) -> RepositoryDescriptor {
    RepositoryDescriptor {
        provider: Provider::Gogs,
        organization: org.to_string(),
        namespace: repo.owner.login,
        name: repo.name,
        default_branch: repo
            .default_branch
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "master".to_string()),
        visibility: if repo.private {
            Visibility::Private
        } else {
            Visibility::Public
        },
        archived: false,
        fork: repo.fork,
        language: None,
        size_kb: repo.size.map(|bytes| bytes.div_ceil(1024)),
        star_count: repo.stars_count,
        updated_at: repo.updated_at,
        topics: Vec::new(),
        clone_urls: CloneUrls {
            https: repo.clone_url,
            ssh: repo.ssh_url.filter(|u| !u.is_empty()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_legacy_owner_and_byte_size() {
        let repo: GogsRepo = serde_json::from_value(serde_json::json!({
            "id": 9,
            "name": "legacy",
            "full_name": "acme/legacy",
            "owner": {"username": "acme"},
            "private": false,
            "default_branch": "",
            "size": 4096,
            "stars_count": 1,
            "clone_url": "https://gogs.test/acme/legacy.git",
            "ssh_url": "git@gogs.test:acme/legacy.git"
        }))
        .unwrap();

        let descriptor = to_descriptor(repo, "acme");
        assert_eq!(descriptor.key().as_str(), "gogs:acme/legacy");
        assert_eq!(descriptor.default_branch, "master");
        assert_eq!(descriptor.size_kb, Some(4));
        assert!(!descriptor.archived);
    }
}
