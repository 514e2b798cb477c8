//! Local checkouts under a target root that discovery no longer selects.
//!
//! Only directories holding a `.git` entry are candidates. Hidden entries
//! (including in-flight `.<name>.partial` clones) are never visited, expected
//! repository paths are never descended into, and symlinks are not followed.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Repository directories below `root` that are not in `expected`.
///
/// A missing `root` yields no orphans. The result is sorted.
pub async fn find_orphans(
    root: &Path,
    expected: &HashSet<PathBuf>,
) -> std::io::Result<Vec<PathBuf>> {
    let ancestors: HashSet<&Path> = expected
        .iter()
        .flat_map(|path| path.ancestors().skip(1))
        .collect();

    let mut orphans = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound && dir == root => return Ok(orphans),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path();
            if expected.contains(&path) {
                continue;
            }
            let is_repo = tokio::fs::try_exists(path.join(".git")).await?;
            if is_repo && !ancestors.contains(path.as_path()) {
                orphans.push(path);
            } else {
                pending.push(path);
            }
        }
    }

    orphans.sort();
    Ok(orphans)
}

/// Delete one orphaned checkout.
pub async fn remove_orphan(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn repo(path: &Path) {
        tokio::fs::create_dir_all(path.join(".git")).await.unwrap();
    }

    fn expected(paths: &[PathBuf]) -> HashSet<PathBuf> {
        paths.iter().cloned().collect()
    }

    #[tokio::test]
    async fn finds_only_unexpected_checkouts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        repo(&root.join("api")).await;
        repo(&root.join("retired")).await;
        tokio::fs::create_dir_all(root.join("notes")).await.unwrap();
        tokio::fs::write(root.join("README.md"), "hi").await.unwrap();

        let orphans = find_orphans(root, &expected(&[root.join("api")])).await.unwrap();
        assert_eq!(orphans, vec![root.join("retired")]);
    }

    #[tokio::test]
    async fn walks_into_group_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        repo(&root.join("platform/tools/cli")).await;
        repo(&root.join("platform/tools/old-cli")).await;
        repo(&root.join("legacy/group/thing")).await;

        let orphans = find_orphans(root, &expected(&[root.join("platform/tools/cli")]))
            .await
            .unwrap();
        assert_eq!(
            orphans,
            vec![root.join("legacy/group/thing"), root.join("platform/tools/old-cli")]
        );
    }

    #[tokio::test]
    async fn skips_hidden_entries_and_expected_subtrees() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        repo(&root.join(".api.partial")).await;
        repo(&root.join(".cache/mirror")).await;
        repo(&root.join("api")).await;
        repo(&root.join("api/vendor/dep")).await;

        let orphans = find_orphans(root, &expected(&[root.join("api")])).await.unwrap();
        assert!(orphans.is_empty(), "{orphans:?}");
    }

    #[tokio::test]
    async fn repository_holding_an_expected_path_is_kept() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        repo(&root.join("platform")).await;
        repo(&root.join("platform/cli")).await;

        let orphans = find_orphans(root, &expected(&[root.join("platform/cli")]))
            .await
            .unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn missing_root_has_no_orphans() {
        let tmp = TempDir::new().unwrap();
        let orphans = find_orphans(&tmp.path().join("absent"), &HashSet::new())
            .await
            .unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn remove_tolerates_missing_paths() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone");
        repo(&path).await;
        remove_orphan(&path).await.unwrap();
        assert!(!path.exists());
        remove_orphan(&path).await.unwrap();
    }
}
