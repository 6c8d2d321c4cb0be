use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use mirrorfs_core::{CacheError, CachePath, CacheService};

#[derive(ClapArgs)]
pub struct Args {
    /// Container to list
    #[arg(default_value = "/")]
    pub path: CachePath,
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    if !cache.is_container(&args.path) {
        if cache.has_content(&args.path) {
            println!("{}", args.path);
            return Ok(());
        }
        return Err(CacheError::NotFound { path: args.path.clone() }.into());
    }

    for name in cache.list_children(&args.path)? {
        let child = args.path.child(&name)?;
        if cache.is_container(&child) {
            println!("{name}/");
        } else {
            println!("{name}");
        }
    }
    Ok(())
}
