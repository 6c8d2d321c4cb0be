use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use mirrorfs_core::{CacheError, CachePath, CacheService};

#[derive(ClapArgs)]
pub struct Args {
    /// Cache path to remove
    pub path: CachePath,

    /// Do not fail if the entry does not exist
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::rm", skip_all, fields(path = %args.path))]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    if !args.force && !cache.has_content(&args.path) {
        return Err(CacheError::NotFound { path: args.path.clone() }.into());
    }
    cache.remove_content(&args.path)?;
    Ok(())
}
