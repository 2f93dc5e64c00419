//! Firewall enforcement.
//!
//! Applying a ruleset is three strictly ordered external steps behind the
//! [`FirewallEngine`] capability: load, then enable the persistent service,
//! then list the active ruleset for the operator. Only a failed load is fatal.

mod nftables;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info};

#[cfg(test)]
use mockall::automock;

pub use nftables::NftablesEngine;

use crate::fs_abstraction::FileSystem;
use crate::ruleset::RulesetDocument;

/// External firewall engine and service manager
#[cfg_attr(test, automock)]
pub trait FirewallEngine: Send + Sync {
    /// Load the ruleset at `path` into the running firewall.
    ///
    /// A non-zero exit is reported as [`crate::error::AsnwallError::RulesetLoad`].
    fn load(&self, path: &Path) -> Result<()>;

    /// Enable and start the service that restores the ruleset at boot.
    fn enable(&self) -> Result<()>;

    /// Return the active ruleset as listed by the engine.
    fn verify(&self) -> Result<String>;
}

/// Outcome of the steps that follow a successful load
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub enabled: bool,
    /// Active ruleset listing, when verification succeeded
    pub active_ruleset: Option<String>,
    /// Failures of the non-fatal steps, in order
    pub failures: Vec<String>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Write `document` to `path` and drive load, enable, verify.
///
/// The file is fully replaced. A load failure returns before the service is
/// touched; enable and verify failures are logged and collected in the
/// report without rolling back the loaded ruleset.
pub fn apply<E, F>(
    engine: &E,
    fs: &F,
    document: &RulesetDocument,
    path: &Path,
) -> Result<ApplyReport>
where
    E: FirewallEngine + ?Sized,
    F: FileSystem + ?Sized,
{
    fs.write_atomic(path, document.as_bytes())
        .with_context(|| format!("Failed to write ruleset to {:?}", path))?;
    info!("Wrote ruleset to {:?}", path);

    engine.load(path).context("Ruleset load step failed")?;
    info!("Ruleset loaded");

    let mut report = ApplyReport::default();

    match engine.enable() {
        Ok(()) => {
            info!("Firewall service enabled");
            report.enabled = true;
        }
        Err(e) => {
            error!("Failed to enable firewall service: {:#}", e);
            report.failures.push(format!("enable: {:#}", e));
        }
    }

    match engine.verify() {
        Ok(listing) => report.active_ruleset = Some(listing),
        Err(e) => {
            error!("Failed to list active ruleset: {:#}", e);
            report.failures.push(format!("verify: {:#}", e));
        }
    }

    Ok(report)
}

/// Check if running as root (effective UID == 0)
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has CAP_NET_ADMIN."
        )
    }
    Ok(())
}
