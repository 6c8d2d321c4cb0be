use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use mirrorfs_core::{CacheError, CachePath, CacheService};

#[derive(ClapArgs)]
pub struct Args {
    /// Cache path to update
    pub path: CachePath,

    /// New modification time in milliseconds since the epoch
    #[arg(allow_negative_numbers = true)]
    pub timestamp: i64,
}

#[instrument(level = "info", name = "cmd::touch", skip_all, fields(path = %args.path))]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    if !cache.has_content(&args.path) {
        return Err(CacheError::NotFound { path: args.path.clone() }.into());
    }
    cache.set_content_timestamp(&args.path, args.timestamp)?;
    Ok(())
}
