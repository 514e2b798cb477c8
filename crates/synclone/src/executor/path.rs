//! Where a repository lives on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform::RepositoryDescriptor;

/// Default separator used when flattening nested groups.
pub const DEFAULT_DELIMITER: &str = "_";

/// Directory layout below the target root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Join subgroup segments and the name into one directory name.
    pub flatten: bool,
    pub delimiter: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            flatten: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

impl Layout {
    pub fn flattened(delimiter: impl Into<String>) -> Self {
        Self {
            flatten: true,
            delimiter: delimiter.into(),
        }
    }
}

/// Replace path separators and dot-only names so a segment stays one component.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len().max(1))
    } else {
        cleaned
    }
}

/// Join subgroup segments and a repository name with `delimiter`.
///
/// `flatten_name(&["platform", "tools"], "cli", "_")` is `platform_tools_cli`.
pub fn flatten_name(segments: &[&str], name: &str, delimiter: &str) -> String {
    let mut parts: Vec<&str> = segments.iter().copied().filter(|s| !s.is_empty()).collect();
    parts.push(name);
    sanitize_segment(&parts.join(delimiter))
}

/// Local path of `repo` below `root`.
///
/// Only the segments below the target organization are used, so
/// `acme/platform/tools/cli` under `root` is `root/platform/tools/cli`, or
/// `root/platform_tools_cli` when flattened.
pub fn local_path(root: &Path, repo: &RepositoryDescriptor, layout: &Layout) -> PathBuf {
    let segments = repo.subgroups();
    if layout.flatten {
        return root.join(flatten_name(&segments, &repo.name, &layout.delimiter));
    }

    let mut path = root.to_path_buf();
    for segment in segments {
        path.push(sanitize_segment(segment));
    }
    path.push(sanitize_segment(&repo.name));
    path
}

/// Sibling directory a clone is written to before being renamed into place.
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repository".to_string());
    dest.with_file_name(format!(".{name}.partial"))
}
