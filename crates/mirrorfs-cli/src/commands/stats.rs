use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use mirrorfs_core::{CacheService, CacheStatsSnapshot, format_bytes};

#[derive(ClapArgs)]
pub struct Args {
    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    #[default]
    Json,
}

#[derive(Serialize)]
struct Report {
    root: String,
    pending_deletions: usize,
    counters: CacheStatsSnapshot,
}

#[instrument(level = "info", name = "cmd::stats", skip_all)]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    let report = Report {
        root: cache.root().display().to_string(),
        pending_deletions: cache.pending_deletions().len(),
        counters: cache.stats().snapshot(),
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            let c = &report.counters;
            println!("Cache root:         {}", report.root);
            println!("Pending deletions:  {}", report.pending_deletions);
            println!("Commits:            {}", c.commits);
            println!("Bytes written:      {}", format_bytes(c.bytes_written));
            println!("Hits / misses:      {} / {}", c.hits, c.misses);
            println!("Deletions:          {}", c.deletions);
            println!("Failed deletions:   {}", c.failed_deletions);
            println!("Healed deletions:   {}", c.healed_deletions);
            println!("Abandoned writes:   {}", c.abandoned_writes);
        }
    }
    Ok(())
}
