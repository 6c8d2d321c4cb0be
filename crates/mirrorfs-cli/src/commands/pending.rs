use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use mirrorfs_core::CacheService;

#[derive(ClapArgs)]
pub struct Args {
    /// Retry every pending deletion before listing
    #[arg(long)]
    pub retry: bool,
}

#[instrument(level = "info", name = "cmd::pending", skip_all)]
pub fn execute(cache: &CacheService, args: &Args) -> Result<()> {
    if args.retry {
        let healed = cache.retry_pending_deletions();
        eprintln!("Cleared {healed} pending deletion(s)");
    }
    for path in cache.pending_deletions() {
        println!("{}", path.display());
    }
    Ok(())
}
