mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::Term;
use harvester::discovery::DEFAULT_AGE_YEARS;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harvester")]
#[command(author, version, about = "Discover, clone and watch GitHub repositories")]
#[command(
    long_about = "Harvester searches the GitHub API for repositories matching a set of \
    filters, clones every hit into a local directory through a bounded worker pool, and \
    watches repositories for changes to their size, stars, watchers and forks.\n\n\
    Every clone attempt and every observed change is appended to a CSV (or NDJSON) log."
)]
#[command(after_long_help = "EXAMPLES:
    # Clone every Rust repository of an organization with at least 100 stars
    harvester clone -o repos --org rust-lang --language rust --min-stars 100

    # Shallow-clone the main branch of small recent repositories
    harvester clone -o repos --topic cli --max-size 5 --age 2 --depth 1 --branch main

    # Watch two repositories for 30 minutes and print changes
    harvester watch --minutes 30 --names tokio-rs/tokio,serde-rs/serde --display-active

    # Watch an organization's repositories tagged 'async', logging as NDJSON
    harvester watch --minutes 60 --org tokio-rs --tags async --log-file changes.ndjson

CONFIGURATION:
    Config file: ~/.config/harvester/config.toml or ./harvester.toml

ENVIRONMENT VARIABLES:
    GITHUB_TOKEN                    GitHub API token (same as --token)
    HARVESTER_GITHUB__TOKEN         GitHub API token from the config layer
    HARVESTER_CLONE__CONCURRENCY    Default clone worker count
    RUST_LOG                        Log filter when output is not a terminal")]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for repositories and clone every match
    Clone(CloneArgs),
    /// Poll repositories for a fixed time and log every change
    Watch(WatchArgs),
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man pages
    Man {
        /// Output directory for man pages (prints main page to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Search filters shared by `clone` and `watch`.
#[derive(Args, Debug, Clone)]
pub(crate) struct FilterArgs {
    /// Only repositories owned by this user
    #[arg(long, visible_alias = "user")]
    pub owner: Option<String>,

    /// Only repositories owned by this organization
    #[arg(long)]
    pub org: Option<String>,

    /// Primary language (e.g. rust, python)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Exact repository, as owner/name
    #[arg(long)]
    pub name: Option<String>,

    /// Substring the repository name must contain
    #[arg(long)]
    pub contains: Option<String>,

    /// Topic the repository must carry (repeatable)
    #[arg(long = "topic")]
    pub topics: Vec<String>,

    /// Minimum number of stars
    #[arg(long, visible_alias = "stars")]
    pub min_stars: Option<u64>,

    /// Maximum repository size in megabytes
    #[arg(long, value_name = "MB")]
    pub max_size: Option<u64>,

    /// Only repositories pushed within this many years
    #[arg(long, value_name = "YEARS", default_value_t = DEFAULT_AGE_YEARS)]
    pub age: u32,

    /// Size cap expressed as a percentage
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub code_percent: Option<u8>,
}

/// Arguments for `harvester clone`.
#[derive(Args, Debug, Clone)]
pub(crate) struct CloneArgs {
    /// Directory to clone into (created if missing)
    #[arg(short = 'o', long)]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// GitHub API token (raises rate limits, reaches private repositories)
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// CSV log of clone attempts (appended to)
    #[arg(long)]
    pub csv_file: Option<PathBuf>,

    /// Number of concurrent clone workers
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Shallow clone with this many commits
    #[arg(long)]
    pub depth: Option<u32>,

    /// Clone only this branch
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Replace existing checkouts instead of skipping them
    #[arg(long)]
    pub overwrite: bool,
}

/// Arguments for `harvester watch`.
#[derive(Args, Debug, Clone)]
pub(crate) struct WatchArgs {
    /// How long to watch, in minutes
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub minutes: u64,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Watch a single repository (owner/name)
    #[arg(long)]
    pub specific: Option<String>,

    /// Comma-separated repositories to watch (owner/name or bare name)
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,

    /// Comma-separated topics every watched repository must carry
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Only repositories with issues enabled
    #[arg(long)]
    pub has_issues: bool,

    /// GitHub API token (raises rate limits, reaches private repositories)
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Change log (.csv, or .json/.jsonl/.ndjson for NDJSON)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print every change as it is observed
    #[arg(long)]
    pub display_active: bool,

    /// Maximum polls in flight at once
    #[arg(long)]
    pub max_in_flight: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // Structured logging when not connected to a TTY; progress bars otherwise
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("harvester=info,harvester_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output)?;
        }
        Commands::Clone(args) => {
            let config = config::Config::load()?;
            commands::clone::handle_clone(args, &config).await?;
        }
        Commands::Watch(args) => {
            let config = config::Config::load()?;
            commands::watch::handle_watch(args, &config).await?;
        }
    }

    Ok(())
}
