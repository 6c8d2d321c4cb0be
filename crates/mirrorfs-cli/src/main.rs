#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mirrorfs_core::{CacheConfig, CacheError, CacheService};
use mirrorfs_sync::SyncError;

use crate::commands::{cat, ls, pending, put, rm, stat, stats, sync, touch};
use crate::config::CliConfig;

/// Inspect and populate a mirrorfs content cache
#[derive(Parser)]
#[command(name = "mirrorfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Cache a file with an explicit modification time
    mirrorfs --cache ~/.cache/site put /index.html --file index.html --timestamp 1700000000000

    # Append a line to a cached log
    echo \"started\" | mirrorfs --cache ~/.cache/site put /logs/app.log --append

    # Pull a directory tree into the cache
    mirrorfs --cache ~/.cache/site sync / --remote /srv/site --direction pull
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (default: ~/.config/mirrorfs/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Cache directory (overrides cache_root from the config file)
    #[arg(long, value_name = "DIR", env = "MIRRORFS_CACHE", global = true)]
    cache: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store content from a file or stdin
    Put(put::Args),

    /// Write cached content to stdout
    Cat(cat::Args),

    /// Show whether an entry exists, its length and timestamp
    Stat(stat::Args),

    /// Set the timestamp of an entry without touching its content
    Touch(touch::Args),

    /// Remove an entry
    Rm(rm::Args),

    /// List entries below a container
    Ls(ls::Args),

    /// Synchronize with a remote directory
    Sync(sync::Args),

    /// List deletions that failed and are awaiting retry
    Pending(pending::Args),

    /// Show cache counters
    Stats(stats::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");
            if !is_quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let cache = open_cache(cli.cache.as_ref(), &config)?;

    match cli.command {
        Commands::Put(args) => put::execute(&cache, &args),
        Commands::Cat(args) => cat::execute(&cache, &args),
        Commands::Stat(args) => stat::execute(&cache, &args),
        Commands::Touch(args) => touch::execute(&cache, &args),
        Commands::Rm(args) => rm::execute(&cache, &args),
        Commands::Ls(args) => ls::execute(&cache, &args),
        Commands::Sync(args) => sync::execute(&cache, &args, &config, cli.quiet),
        Commands::Pending(args) => pending::execute(&cache, &args),
        Commands::Stats(args) => stats::execute(&cache, &args),
    }
}

/// Open the cache named by `--cache`, falling back to the config file.
fn open_cache(flag: Option<&PathBuf>, config: &CliConfig) -> Result<Arc<CacheService>> {
    let root = flag
        .or(config.cache_root.as_ref())
        .context("No cache directory given (use --cache or set cache_root in the config file)")?;

    let cache_config = CacheConfig::new(root).with_sync_on_close(config.sync_on_close);
    let cache = CacheService::open(cache_config)
        .with_context(|| format!("Failed to open cache at {}", root.display()))?;
    Ok(Arc::new(cache))
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Map an error to an exit code by downcasting along its chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(sync_err) = cause.downcast_ref::<SyncError>() {
            match sync_err {
                SyncError::Multiple(_) => return exit_code::PARTIAL_SYNC,
                SyncError::Cache(cache_err) => return cache_error_code(cache_err),
                _ => {}
            }
        }

        if let Some(cache_err) = cause.downcast_ref::<CacheError>() {
            return cache_error_code(cache_err);
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::NotFound
        {
            return exit_code::NOT_FOUND;
        }
    }
    exit_code::GENERAL_ERROR
}

fn cache_error_code(e: &CacheError) -> u8 {
    match e {
        CacheError::NotFound { .. } => exit_code::NOT_FOUND,
        CacheError::InvalidPath { .. } | CacheError::Config { .. } => exit_code::USAGE,
        _ => exit_code::GENERAL_ERROR,
    }
}
