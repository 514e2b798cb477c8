use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::platform::{RepositoryDescriptor, VisibilityFilter};

/// Repository selection criteria as configured.
///
/// Threshold filters only reject a repository when the platform reported
/// the value in question; an unknown size or star count passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub visibility: VisibilityFilter,
    /// Regular expression the repository name must match (unanchored).
    pub match_pattern: Option<String>,
    /// Regular expressions that exclude a repository when any matches.
    pub exclude_patterns: Vec<String>,
    pub min_stars: Option<u32>,
    pub max_stars: Option<u32>,
    pub max_size_kb: Option<u64>,
    /// Keep only repositories the platform reports as empty (size 0).
    pub only_empty: bool,
    /// Primary languages to keep, compared case-insensitively. Empty keeps all.
    pub languages: Vec<String>,
    /// Keep repositories carrying at least one of these topics. Empty keeps all.
    pub topics: Vec<String>,
    /// Drop repositories carrying any of these topics.
    pub exclude_topics: Vec<String>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub include_archived: bool,
    pub include_forks: bool,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            visibility: VisibilityFilter::All,
            match_pattern: None,
            exclude_patterns: Vec::new(),
            min_stars: None,
            max_stars: None,
            max_size_kb: None,
            only_empty: false,
            languages: Vec::new(),
            topics: Vec::new(),
            exclude_topics: Vec::new(),
            updated_after: None,
            updated_before: None,
            include_archived: true,
            include_forks: true,
        }
    }
}

/// A [`FilterSpec`] with its patterns compiled.
#[derive(Debug, Clone)]
pub struct Filter {
    spec: FilterSpec,
    matcher: Option<Regex>,
    excludes: Vec<Regex>,
    languages: Vec<String>,
    topics: Vec<String>,
    exclude_topics: Vec<String>,
}

fn lowercased(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl Filter {
    /// Compile the patterns in `spec`; an invalid regex or an empty range is
    /// a configuration error.
    pub fn compile(spec: FilterSpec) -> Result<Self, ConfigError> {
        if let (Some(min), Some(max)) = (spec.min_stars, spec.max_stars)
            && min > max
        {
            return Err(ConfigError::invalid(format!(
                "min_stars ({min}) is greater than max_stars ({max})"
            )));
        }
        if let (Some(after), Some(before)) = (spec.updated_after, spec.updated_before)
            && after >= before
        {
            return Err(ConfigError::invalid(format!(
                "updated_after ({after}) is not earlier than updated_before ({before})"
            )));
        }
        let matcher = spec
            .match_pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(compile)
            .transpose()?;
        let excludes = spec
            .exclude_patterns
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let languages = lowercased(&spec.languages);
        let topics = lowercased(&spec.topics);
        let exclude_topics = lowercased(&spec.exclude_topics);

        Ok(Self {
            spec,
            matcher,
            excludes,
            languages,
            topics,
            exclude_topics,
        })
    }

    /// A filter that keeps everything.
    pub fn allow_all() -> Self {
        Self {
            spec: FilterSpec::default(),
            matcher: None,
            excludes: Vec::new(),
            languages: Vec::new(),
            topics: Vec::new(),
            exclude_topics: Vec::new(),
        }
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn visibility(&self) -> VisibilityFilter {
        self.spec.visibility
    }

    /// Whether `repo` passes every active predicate.
    pub fn matches(&self, repo: &RepositoryDescriptor) -> bool {
        self.rejection(repo).is_none()
    }

    /// The first predicate `repo` fails, if any.
    pub fn rejection(&self, repo: &RepositoryDescriptor) -> Option<&'static str> {
        if !self.spec.visibility.allows(repo.visibility) {
            return Some("visibility");
        }
        if repo.archived && !self.spec.include_archived {
            return Some("archived");
        }
        if repo.fork && !self.spec.include_forks {
            return Some("fork");
        }
        if let Some(ref re) = self.matcher
            && !re.is_match(&repo.name)
        {
            return Some("match");
        }
        if self.excludes.iter().any(|re| re.is_match(&repo.name)) {
            return Some("exclude");
        }
        if let (Some(min), Some(stars)) = (self.spec.min_stars, repo.star_count)
            && stars < min
        {
            return Some("min_stars");
        }
        if let (Some(max), Some(stars)) = (self.spec.max_stars, repo.star_count)
            && stars > max
        {
            return Some("max_stars");
        }
        if let (Some(max), Some(size)) = (self.spec.max_size_kb, repo.size_kb)
            && size > max
        {
            return Some("max_size_kb");
        }
        if self.spec.only_empty && repo.size_kb != Some(0) {
            return Some("only_empty");
        }
        if !self.languages.is_empty() {
            let keep = repo
                .language
                .as_deref()
                .is_some_and(|l| self.languages.contains(&l.to_lowercase()));
            if !keep {
                return Some("language");
            }
        }
        if !self.topics.is_empty() || !self.exclude_topics.is_empty() {
            let topics = lowercased(&repo.topics);
            if !self.topics.is_empty() && !topics.iter().any(|t| self.topics.contains(t)) {
                return Some("topics");
            }
            if topics.iter().any(|t| self.exclude_topics.contains(t)) {
                return Some("exclude_topics");
            }
        }
        if let Some(after) = self.spec.updated_after {
            let fresh = repo.updated_at.is_some_and(|t| t > after);
            if !fresh {
                return Some("updated_after");
            }
        }
        if let Some(before) = self.spec.updated_before {
            let stale = repo.updated_at.is_some_and(|t| t < before);
            if !stale {
                return Some("updated_before");
            }
        }
        None
    }
}
