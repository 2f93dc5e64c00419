//! Update command: fetch, then set up.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::fetch::{fetch_with_shutdown, print_summary};
use super::setup::setup;
use crate::config::Config;
use crate::enforcer::check_root;
use crate::lock::LockGuard;

/// Run the update command
///
/// A dry run still fetches and persists the prefix files; only the ruleset
/// is printed instead of applied.
pub async fn run(dry_run: bool, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if !dry_run {
        check_root()?;
    }
    let _lock = LockGuard::acquire(&config.lock_file)?;

    info!("Updating allow-list...");
    let summary = fetch_with_shutdown(&config).await?;
    print_summary(&summary, &config);

    setup(&config, dry_run)
}
