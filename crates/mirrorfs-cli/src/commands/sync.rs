use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{instrument, warn};

use mirrorfs_core::{CachePath, CacheService};
use mirrorfs_sync::{DirectoryRemote, Reconciler, RemoteStore, SyncDirection};

use crate::config::CliConfig;

#[derive(ClapArgs)]
pub struct Args {
    /// Cache path to synchronize (containers are walked recursively)
    #[arg(default_value = "/")]
    pub path: CachePath,

    /// Remote directory (overrides remote_root from the config file)
    #[arg(short, long, value_name = "DIR")]
    pub remote: Option<PathBuf>,

    /// pull (incoming), push (outgoing) or both (newer side wins)
    #[arg(short, long, default_value = "both")]
    pub direction: SyncDirection,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::sync", skip_all, fields(path = %args.path, direction = %args.direction))]
pub fn execute(cache: &Arc<CacheService>, args: &Args, config: &CliConfig, quiet: bool) -> Result<()> {
    let remote_root = args
        .remote
        .as_ref()
        .or(config.remote_root.as_ref())
        .context("No remote directory given (use --remote or set remote_root in the config file)")?;
    let remote: Arc<dyn RemoteStore> = Arc::new(
        DirectoryRemote::new(remote_root)
            .with_context(|| format!("Failed to open remote directory {}", remote_root.display()))?,
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed)) {
            warn!(error = %e, "Could not install Ctrl-C handler, sync cannot be interrupted");
        }
    }

    let reconciler = Reconciler::new(Arc::clone(cache), remote).with_cancellation(cancel);
    let report = reconciler.synchronize(&args.path, args.direction);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        println!(
            "pulled {}, pushed {}, unchanged {}, skipped {}, failed {}",
            report.pulled,
            report.pushed,
            report.unchanged,
            report.skipped,
            report.status.len()
        );
    }

    report
        .status
        .into_result()
        .context("Synchronization finished with failures")
}
