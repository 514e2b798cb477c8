//! Configuration file support for synclone.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `SYNCLONE_`, e.g. `SYNCLONE_GITHUB_TOKEN`)
//! 3. A file passed with `--config`
//! 4. `./synclone.toml`
//! 5. `~/.config/synclone/config.toml` (`$XDG_CONFIG_HOME/synclone/config.toml`)
//! 6. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use SYNCLONE_GITHUB_TOKEN env var
//!
//! [gitlab]
//! host = "https://gitlab.example.com"
//! token = "glpat-..."
//! include_subgroups = true
//!
//! [defaults]
//! root = "~/src"
//! strategy = "reset"
//! concurrency = 5
//!
//! [targets.platform]
//! provider = "gitlab"
//! organization = "acme"
//! root = "/src/acme"
//! strategy = "pull"
//! flatten = true
//!
//! [targets.platform.filter]
//! match_pattern = "^svc-"
//! exclude_patterns = ["-archive$"]
//! exclude_topics = ["deprecated"]
//! updated_after = "2024-01-01T00:00:00Z"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

use synclone::executor::DEFAULT_DELIMITER;
use synclone::retry::DEFAULT_MAX_RETRIES;
use synclone::scheduler::{DEFAULT_CONCURRENCY, DEFAULT_TASK_TIMEOUT};
use synclone::state::DEFAULT_RETRY_CEILING;
use synclone::{ConfigError, FilterSpec, Layout, Protocol, Provider, RunTarget, Strategy};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub state: StateConfig,
    pub github: ProviderConfig,
    pub gitlab: GitLabConfig,
    pub gitea: ProviderConfig,
    pub gogs: ProviderConfig,
    /// Values used by every target that does not set its own.
    pub defaults: DefaultsConfig,
    /// Named run targets.
    pub targets: BTreeMap<String, TargetConfig>,
}

/// Where run state is kept.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Defaults to `$XDG_STATE_HOME/synclone/runs`.
    pub dir: Option<PathBuf>,
}

/// Connection settings for GitHub, Gitea or Gogs.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API host. Required for Gogs; the public instance otherwise.
    pub host: Option<String>,
    /// Personal access token.
    pub token: Option<String>,
}

/// GitLab configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitLabConfig {
    pub host: Option<String>,
    pub token: Option<String>,
    /// Include projects from subgroups when syncing.
    pub include_subgroups: bool,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            include_subgroups: true,
        }
    }
}

/// Defaults shared by all targets.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Base directory; a target without its own root syncs into `root/<organization>`.
    pub root: Option<PathBuf>,
    pub strategy: String,
    pub concurrency: usize,
    pub max_retries: usize,
    /// Cumulative retries after which resume leaves a failed repository alone.
    pub retry_ceiling: u32,
    pub task_timeout_secs: u64,
    pub protocol: String,
    pub flatten: bool,
    pub delimiter: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            root: None,
            strategy: Strategy::default().to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT.as_secs(),
            protocol: Protocol::default().to_string(),
            flatten: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

/// One named target. Unset fields fall back to `[defaults]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub provider: Option<String>,
    pub organization: String,
    pub root: Option<PathBuf>,
    pub host: Option<String>,
    pub strategy: Option<String>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<usize>,
    pub protocol: Option<String>,
    pub flatten: Option<bool>,
    pub delimiter: Option<String>,
    pub include_subgroups: Option<bool>,
    pub filter: FilterSpec,
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. XDG config file
    /// 2. Local `./synclone.toml`
    /// 3. `explicit`, which must exist when given
    /// 4. Environment variables with the `SYNCLONE_` prefix
    pub fn load(explicit: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("synclone.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./synclone.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        if let Some(path) = explicit {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        // SYNCLONE_GITHUB_TOKEN -> github.token
        builder = builder.add_source(
            Environment::with_prefix("SYNCLONE")
                .separator("_")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Host and token configured for `provider`.
    pub fn credentials(&self, provider: Provider) -> (Option<String>, Option<String>) {
        let (host, token) = match provider {
            Provider::GitHub => (&self.github.host, &self.github.token),
            Provider::GitLab => (&self.gitlab.host, &self.gitlab.token),
            Provider::Gitea => (&self.gitea.host, &self.gitea.token),
            Provider::Gogs => (&self.gogs.host, &self.gogs.token),
        };
        (host.clone(), token.clone())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.task_timeout_secs)
    }

    /// Turn a target section into a [`RunTarget`], filling gaps from the
    /// defaults and the provider section.
    pub fn resolve(&self, target: &TargetConfig) -> Result<RunTarget, ConfigError> {
        let provider: Provider = target
            .provider
            .as_deref()
            .ok_or(ConfigError::Missing { field: "provider" })?
            .parse()
            .map_err(ConfigError::Invalid)?;
        if target.organization.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "organization",
            });
        }

        let root = match (&target.root, &self.defaults.root) {
            (Some(root), _) => expand_home(root),
            (None, Some(base)) => expand_home(base).join(&target.organization),
            (None, None) => return Err(ConfigError::Missing { field: "root" }),
        };

        let strategy: Strategy = target
            .strategy
            .as_deref()
            .unwrap_or(&self.defaults.strategy)
            .parse()?;
        let protocol: Protocol = target
            .protocol
            .as_deref()
            .unwrap_or(&self.defaults.protocol)
            .parse()
            .map_err(ConfigError::Invalid)?;

        let (configured_host, token) = self.credentials(provider);
        let include_subgroups = target
            .include_subgroups
            .unwrap_or(provider != Provider::GitLab || self.gitlab.include_subgroups);

        Ok(RunTarget {
            host: target.host.clone().or(configured_host),
            token: token.unwrap_or_default(),
            strategy,
            concurrency: target.concurrency.unwrap_or(self.defaults.concurrency),
            max_retries: target.max_retries.unwrap_or(self.defaults.max_retries),
            filter: target.filter.clone(),
            layout: Layout {
                flatten: target.flatten.unwrap_or(self.defaults.flatten),
                delimiter: target
                    .delimiter
                    .clone()
                    .unwrap_or_else(|| self.defaults.delimiter.clone()),
            },
            protocol,
            include_subgroups,
            ..RunTarget::new(provider, target.organization.clone(), root)
        })
    }

    /// Directory holding one state file per target.
    pub fn state_dir(&self) -> Option<PathBuf> {
        self.state
            .dir
            .as_deref()
            .map(expand_home)
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("runs")))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "synclone").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/synclone` or `~/.local/state/synclone`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "synclone").map(|dirs| {
            // state_dir() returns None on macOS/Windows, fall back to data_dir
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.strategy, "reset");
        assert_eq!(config.defaults.concurrency, 5);
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.defaults.retry_ceiling, 10);
        assert_eq!(config.task_timeout(), Duration::from_secs(600));
        assert_eq!(config.defaults.delimiter, "_");
        assert!(config.gitlab.include_subgroups);
        assert!(config.targets.is_empty());
        assert!(config.github.token.is_none());
    }

    #[test]
    fn test_target_resolution_uses_defaults_and_credentials() {
        let config = parse(
            r#"
            [gitlab]
            host = "https://gitlab.example.com"
            token = "glpat-test"

            [defaults]
            root = "/srv/src"
            concurrency = 8

            [targets.platform]
            provider = "gitlab"
            organization = "acme"
            strategy = "pull"
            flatten = true

            [targets.platform.filter]
            match_pattern = "^svc-"
            exclude_patterns = ["-archive$"]
            "#,
        );

        let target = config.resolve(&config.targets["platform"]).unwrap();
        assert_eq!(target.provider, Provider::GitLab);
        assert_eq!(target.root, PathBuf::from("/srv/src/acme"));
        assert_eq!(target.strategy, Strategy::Pull);
        assert_eq!(target.concurrency, 8);
        assert_eq!(target.host.as_deref(), Some("https://gitlab.example.com"));
        assert_eq!(target.token, "glpat-test");
        assert!(target.layout.flatten);
        assert_eq!(target.layout.delimiter, "_");
        assert!(target.include_subgroups);
        assert_eq!(target.filter.match_pattern.as_deref(), Some("^svc-"));
        assert_eq!(target.filter.exclude_patterns, vec!["-archive$".to_string()]);
    }

    #[test]
    fn test_unknown_strategy_is_a_config_error() {
        let config = parse(
            r#"
            [targets.a]
            provider = "github"
            organization = "acme"
            root = "/src"
            strategy = "yolo"
            "#,
        );
        let err = config.resolve(&config.targets["a"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy(ref s) if s == "yolo"));
    }

    #[test]
    fn test_target_without_root_is_rejected() {
        let target = TargetConfig {
            provider: Some("github".to_string()),
            organization: "acme".to_string(),
            ..TargetConfig::default()
        };
        let err = Config::default().resolve(&target).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "root" }));
    }

    #[test]
    fn test_config_merging_order() {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[defaults]\nconcurrency = 20\nmax_retries = 5",
                FileFormat::Toml,
            ))
            .add_source(config::File::from_str(
                "[defaults]\nconcurrency = 2",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.defaults.concurrency, 2);
        assert_eq!(config.defaults.max_retries, 5);
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str("[defaults\nconcurrency = 2", FileFormat::Toml))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_state_dir_respects_configured_value() {
        let config = parse("[state]\ndir = \"/var/lib/synclone\"");
        assert_eq!(config.state_dir(), Some(PathBuf::from("/var/lib/synclone")));
    }

    #[test]
    fn test_default_state_dir() {
        let dir = Config::default().state_dir().unwrap();
        assert!(dir.to_string_lossy().contains("synclone"));
        assert!(dir.ends_with("runs"));
    }
}
