//! Conversion from GitLab projects to provider-neutral descriptors.

use super::types::GitLabProject;
use crate::platform::{CloneUrls, Provider, RepositoryDescriptor, Visibility};

/// Convert a project found under the group `group`.
pub fn to_descriptor(project: GitLabProject, group: &str) -> RepositoryDescriptor {
    let visibility = match project.visibility.as_str() {
        "public" => Visibility::Public,
        "internal" => Visibility::Internal,
        _ => Visibility::Private,
    };

    RepositoryDescriptor {
        provider: Provider::GitLab,
        organization: group.to_string(),
        namespace: project.namespace.full_path,
        name: project.path,
        default_branch: project.default_branch.unwrap_or_else(|| "main".to_string()),
        visibility,
        archived: project.archived,
        fork: project.forked_from_project.is_some(),
        language: None,
        size_kb: project
            .statistics
            .and_then(|s| s.repository_size)
            .map(|bytes| bytes.div_ceil(1024)),
        star_count: Some(project.star_count),
        updated_at: project.last_activity_at,
        topics: project.topics,
        clone_urls: CloneUrls {
            https: project.http_url_to_repo,
            ssh: project.ssh_url_to_repo,
        },
    }
}
