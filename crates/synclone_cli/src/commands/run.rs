//! `synclone run`: synchronize configured or ad-hoc targets.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use console::Term;
use serde::Serialize;

use synclone::{
    Protocol, Provider, RunController, RunOptions, RunSummary, RunTarget, StateStore, Strategy,
    TargetId, VisibilityFilter,
};

use crate::commands::shared::{OutputFormat, open_store, parse_date, print_json, print_summary};
use crate::config::{Config, TargetConfig, expand_home};
use crate::progress::ProgressReporter;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct RunArgs {
    /// Named targets from the config file (every configured target when omitted)
    targets: Vec<String>,

    /// Continue the previous run of each target instead of starting over
    #[arg(short, long)]
    resume: bool,

    /// Show what would be done without touching the filesystem or saved state
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Verify the token before listing repositories
    #[arg(long)]
    verify_token: bool,

    /// Delete checkouts under the root that are no longer selected
    #[arg(long)]
    cleanup_orphans: bool,

    #[command(flatten)]
    adhoc: AdhocTarget,

    #[command(flatten)]
    overrides: Overrides,

    /// Output format for the final summary
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

/// A target given entirely on the command line.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct AdhocTarget {
    /// Provider of an ad-hoc target (github, gitlab, gitea, gogs)
    #[arg(short, long, requires = "org", conflicts_with = "targets")]
    provider: Option<Provider>,

    /// Organization or group of an ad-hoc target
    #[arg(short = 'o', long, requires = "provider")]
    org: Option<String>,

    /// API host for self-hosted instances
    #[arg(short = 'H', long)]
    host: Option<String>,
}

/// Settings applied on top of every selected target.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct Overrides {
    /// Local directory to sync into
    #[arg(long)]
    root: Option<PathBuf>,

    /// Update strategy (reset, pull, fetch, rebase, clone, skip)
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// Number of repositories synced at once (1-50)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Retries per repository within this run
    #[arg(long)]
    max_retries: Option<usize>,

    /// Per-repository timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Clone over https or ssh
    #[arg(long)]
    protocol: Option<Protocol>,

    /// Join subgroups and the repository name into one directory name
    #[arg(long)]
    flatten: bool,

    /// Delimiter used with --flatten
    #[arg(long, requires = "flatten")]
    delimiter: Option<String>,

    /// Don't include projects from subgroups (GitLab only)
    #[arg(long)]
    no_subgroups: bool,

    /// Only repositories whose name matches this regular expression
    #[arg(short, long = "match", value_name = "REGEX")]
    match_pattern: Option<String>,

    /// Skip repositories whose name matches this regular expression
    #[arg(short = 'x', long = "exclude", value_name = "REGEX")]
    exclude: Vec<String>,

    /// Only public, only private or all repositories
    #[arg(long)]
    visibility: Option<VisibilityFilter>,

    /// Only repositories with at least this many stars
    #[arg(long)]
    min_stars: Option<u32>,

    /// Only repositories with at most this many stars
    #[arg(long)]
    max_stars: Option<u32>,

    /// Only repositories up to this size in KB
    #[arg(long)]
    max_size_kb: Option<u64>,

    /// Only repositories the platform reports as empty
    #[arg(long)]
    only_empty: bool,

    /// Only repositories in these primary languages
    #[arg(short, long = "language")]
    languages: Vec<String>,

    /// Only repositories tagged with one of these topics
    #[arg(long = "topic", value_name = "TOPIC")]
    topics: Vec<String>,

    /// Skip repositories tagged with this topic
    #[arg(long = "exclude-topic", value_name = "TOPIC")]
    exclude_topics: Vec<String>,

    /// Only repositories updated after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    updated_after: Option<DateTime<Utc>>,

    /// Only repositories last updated before this date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    updated_before: Option<DateTime<Utc>>,

    /// Skip archived repositories
    #[arg(long)]
    no_archived: bool,

    /// Skip forks
    #[arg(long)]
    no_forks: bool,
}

impl Overrides {
    fn apply(&self, target: &mut RunTarget) {
        if let Some(ref root) = self.root {
            target.root = expand_home(root);
        }
        if let Some(strategy) = self.strategy {
            target.strategy = strategy;
        }
        if let Some(concurrency) = self.concurrency {
            target.concurrency = concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            target.max_retries = max_retries;
        }
        if let Some(protocol) = self.protocol {
            target.protocol = protocol;
        }
        if self.flatten {
            target.layout.flatten = true;
        }
        if let Some(ref delimiter) = self.delimiter {
            target.layout.delimiter = delimiter.clone();
        }
        if self.no_subgroups {
            target.include_subgroups = false;
        }

        let filter = &mut target.filter;
        if let Some(ref pattern) = self.match_pattern {
            filter.match_pattern = Some(pattern.clone());
        }
        filter.exclude_patterns.extend(self.exclude.iter().cloned());
        if let Some(visibility) = self.visibility {
            filter.visibility = visibility;
        }
        if self.min_stars.is_some() {
            filter.min_stars = self.min_stars;
        }
        if self.max_stars.is_some() {
            filter.max_stars = self.max_stars;
        }
        if self.max_size_kb.is_some() {
            filter.max_size_kb = self.max_size_kb;
        }
        if self.only_empty {
            filter.only_empty = true;
        }
        if !self.languages.is_empty() {
            filter.languages = self.languages.clone();
        }
        if !self.topics.is_empty() {
            filter.topics = self.topics.clone();
        }
        filter
            .exclude_topics
            .extend(self.exclude_topics.iter().cloned());
        if self.updated_after.is_some() {
            filter.updated_after = self.updated_after;
        }
        if self.updated_before.is_some() {
            filter.updated_before = self.updated_before;
        }
        if self.no_archived {
            filter.include_archived = false;
        }
        if self.no_forks {
            filter.include_forks = false;
        }
    }
}

/// Resolve the targets selected on the command line, with overrides applied.
fn select_targets(
    args: &RunArgs,
    config: &Config,
) -> Result<Vec<(String, RunTarget)>, Box<dyn std::error::Error>> {
    let mut selected = Vec::new();

    if let (Some(provider), Some(org)) = (args.adhoc.provider, args.adhoc.org.as_ref()) {
        let adhoc = TargetConfig {
            provider: Some(provider.to_string()),
            organization: org.clone(),
            host: args.adhoc.host.clone(),
            root: args.overrides.root.clone(),
            ..TargetConfig::default()
        };
        selected.push((org.clone(), config.resolve(&adhoc)?));
    } else if args.targets.is_empty() {
        if config.targets.is_empty() {
            return Err("No targets configured. Add a [targets.<name>] section to the config \
                        or pass --provider, --org and --root."
                .into());
        }
        for (name, target) in &config.targets {
            selected.push((name.clone(), config.resolve(target)?));
        }
    } else {
        for name in &args.targets {
            let target = config
                .targets
                .get(name)
                .ok_or_else(|| format!("Target '{name}' is not configured"))?;
            selected.push((name.clone(), config.resolve(target)?));
        }
    }

    for (_, target) in &mut selected {
        args.overrides.apply(target);
        if args.adhoc.provider.is_none()
            && let Some(ref host) = args.adhoc.host
        {
            target.host = Some(host.clone());
        }
    }
    Ok(selected)
}

#[derive(Serialize)]
struct TargetReport<'a> {
    name: &'a str,
    id: TargetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Handle `synclone run`.
pub(crate) async fn handle_run(
    args: RunArgs,
    config: &Config,
    shutdown: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let targets = select_targets(&args, config)?;
    let store: Arc<dyn StateStore> = open_store(config)?;
    let is_tty = Term::stdout().is_term();

    let options = RunOptions {
        resume: args.resume,
        dry_run: args.dry_run,
        retry_ceiling: config.defaults.retry_ceiling,
        task_timeout: args
            .overrides
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.task_timeout()),
        verify_token: args.verify_token,
        cleanup_orphans: args.cleanup_orphans,
        ..RunOptions::default()
    };

    let mut results: Vec<(String, TargetId, Result<RunSummary, String>)> = Vec::new();
    for (name, target) in targets {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        let id = target.id();
        let reporter = Arc::new(ProgressReporter::new());
        let callback = reporter.as_callback();

        let outcome = match RunController::for_target(&target, Arc::clone(&store)) {
            Ok(controller) => controller
                .with_shutdown(Arc::clone(&shutdown))
                .run(&target, &options, Some(&callback))
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        reporter.finish();

        if args.output == OutputFormat::Table {
            match outcome {
                Ok(ref summary) => print_summary(&name, summary, is_tty),
                Err(ref e) => eprintln!("{} {}: {}", console::style("✗").red(), name, e),
            }
        }
        results.push((name, id, outcome));
    }

    if args.output == OutputFormat::Json {
        let reports: Vec<_> = results
            .iter()
            .map(|(name, id, outcome)| TargetReport {
                name,
                id: id.clone(),
                summary: outcome.as_ref().ok(),
                error: outcome.as_ref().err().cloned(),
            })
            .collect();
        print_json(&reports)?;
    }

    let errored = results.iter().filter(|(_, _, r)| r.is_err()).count();
    let failed: usize = results
        .iter()
        .filter_map(|(_, _, r)| r.as_ref().ok())
        .map(|s| s.failed)
        .sum();
    let cancelled = shutdown.load(Ordering::Acquire)
        || results
            .iter()
            .any(|(_, _, r)| r.as_ref().is_ok_and(|s| s.cancelled));

    if errored > 0 {
        return Err(format!("{errored} target(s) could not be synced").into());
    }
    if failed > 0 {
        return Err(
            format!("{failed} repositories failed; rerun with --resume to retry them").into(),
        );
    }
    if cancelled {
        return Err("run cancelled before all repositories were synced".into());
    }
    Ok(())
}
