use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use mirrorfs_core::{CachePath, CacheService};

#[derive(ClapArgs)]
pub struct Args {
    /// Cache path to inspect
    pub path: CachePath,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct EntryInfo {
    path: String,
    exists: bool,
    container: bool,
    length: Option<u64>,
    timestamp: Option<i64>,
}

#[instrument(level = "info", name = "cmd::stat", skip_all, fields(path = %args.path))]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    let exists = cache.has_content(&args.path);
    let info = EntryInfo {
        path: args.path.to_string(),
        exists,
        container: cache.is_container(&args.path),
        length: cache.content_length(&args.path),
        timestamp: exists.then(|| cache.get_content_timestamp(&args.path)),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("path:      {}", info.path);
    println!("exists:    {}", info.exists);
    if info.container {
        println!("container: true");
    }
    if let Some(length) = info.length {
        println!("length:    {length}");
    }
    if let Some(timestamp) = info.timestamp {
        println!("timestamp: {timestamp}");
    }
    Ok(())
}
