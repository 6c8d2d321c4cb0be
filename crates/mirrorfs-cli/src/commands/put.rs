use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use mirrorfs_core::{CachePath, CacheService};

#[derive(ClapArgs)]
pub struct Args {
    /// Cache path to write
    pub path: CachePath,

    /// Read content from this file instead of stdin
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Append to the existing entry instead of replacing it
    #[arg(short, long)]
    pub append: bool,

    /// Modification time in milliseconds since the epoch (default: now)
    #[arg(short, long, value_name = "MS", allow_negative_numbers = true)]
    pub timestamp: Option<i64>,
}

#[instrument(level = "info", name = "cmd::put", skip_all, fields(path = %args.path))]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    let source: Box<dyn Read> = match &args.file {
        Some(file) => Box::new(
            File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let stored = match args.timestamp {
        Some(timestamp) => cache.add_content_with_timestamp(&args.path, source, timestamp, args.append),
        None => cache.add_content(&args.path, source, args.append),
    };
    stored.with_context(|| format!("Failed to store {}", args.path))
}
