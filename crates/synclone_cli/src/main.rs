//! Synclone CLI - bulk repository synchronization from the command line.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use chrono::TimeDelta;
use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::run::RunArgs;
use crate::commands::shared::{OutputFormat, parse_age};

#[derive(Parser)]
#[command(name = "synclone")]
#[command(version)]
#[command(about = "Clone and update every repository of an organization or group")]
#[command(
    long_about = "Synclone discovers the repositories of GitHub organizations, GitLab groups \
and Gitea/Gogs organizations, then clones or updates each of them into a local directory \
tree with a bounded, rate-limited worker pool. Interrupted runs can be resumed."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync every configured target:
        $ synclone run

    Sync one GitHub organization into ~/src/rust-lang:
        $ synclone run --provider github --org rust-lang --root ~/src/rust-lang

    Only update repositories whose name starts with "awesome-":
        $ synclone run docs --match '^awesome-' --exclude 'awesome-archive-'

    Continue an interrupted run:
        $ synclone run platform --resume

    See what would happen:
        $ synclone run platform --dry-run

    Inspect saved run state:
        $ synclone state list

    Forget runs nobody touched for a week:
        $ synclone state clear --older-than 7d

CONFIGURATION
    Synclone reads configuration from:
      1. ~/.config/synclone/config.toml (or $XDG_CONFIG_HOME/synclone/config.toml)
      2. ./synclone.toml
      3. The file given with --config
      4. Environment variables (SYNCLONE_* prefix, e.g., SYNCLONE_GITHUB_TOKEN)
      5. .env file in current directory

ENVIRONMENT VARIABLES
    SYNCLONE_GITHUB_TOKEN     GitHub personal access token
    SYNCLONE_GITLAB_TOKEN     GitLab personal access token
    SYNCLONE_GITLAB_HOST      GitLab host (default: gitlab.com)
    SYNCLONE_GITEA_TOKEN      Gitea/Forgejo personal access token
    SYNCLONE_GITEA_HOST       Gitea/Forgejo host URL
    SYNCLONE_GOGS_TOKEN       Gogs personal access token
    SYNCLONE_GOGS_HOST        Gogs host URL (required for Gogs)
    SYNCLONE_STATE_DIR        Run state directory (default: ~/.local/state/synclone/runs)
"#)]
pub(crate) struct Cli {
    /// Additional config file, layered over the default locations
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone or update repositories
    Run(RunArgs),
    /// Inspect or clear saved run state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum StateAction {
    /// List saved runs
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show per-repository outcomes of one run
    Show {
        /// Run identifier, as printed by `state list`
        id: String,

        /// Only show repositories that failed
        #[arg(short, long)]
        failed: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Delete saved state
    Clear {
        /// Run identifier(s) to clear
        #[arg(
            required_unless_present_any = ["all", "older_than"],
            conflicts_with_all = ["all", "older_than"]
        )]
        ids: Vec<String>,

        /// Clear every saved run, including unreadable files
        #[arg(long, conflicts_with = "older_than")]
        all: bool,

        /// Clear runs last updated longer ago than this (e.g. 12h, 7d, 2w)
        #[arg(long, value_name = "AGE", value_parser = parse_age)]
        older_than: Option<TimeDelta>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing for non-TTY mode (structured logging)
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("synclone=info,synclone_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    // Commands that don't need configuration
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    // Load configuration (config files -> env vars -> defaults)
    let config = config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            let shutdown = shutdown::setup_shutdown_handler();
            commands::run::handle_run(args, &config, shutdown).await?;
        }
        Commands::State { action } => {
            commands::state::handle_state(action, &config).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
