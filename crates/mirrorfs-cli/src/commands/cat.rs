use std::io::{self, Write};

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use mirrorfs_core::{CacheError, CachePath, CacheService};

#[derive(ClapArgs)]
pub struct Args {
    /// Cache path to read
    pub path: CachePath,
}

#[instrument(level = "info", name = "cmd::cat", skip_all, fields(path = %args.path))]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    let mut content = cache
        .get_content(&args.path)?
        .ok_or_else(|| CacheError::NotFound { path: args.path.clone() })?;
    let mut stdout = io::stdout().lock();
    io::copy(&mut content, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}
