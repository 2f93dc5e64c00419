//! Error types for asnwall.
//!
//! Fatal pipeline conditions carry their own variant so callers (and tests)
//! can tell them apart after they have been wrapped with stage context.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsnwallError {
    /// Both allow-list sets are empty; applying would lock out all traffic but SSH.
    #[error("Refusing to render ruleset: both IPv4 and IPv6 prefix sets are empty")]
    EmptyAllowList,

    /// The firewall engine rejected the ruleset; the service was not enabled.
    #[error("Ruleset load failed ({command}, exit code {code:?}): {stderr}")]
    RulesetLoad {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid entry in {path:?} on line {line}: {entry:?}")]
    PrefixFile {
        path: PathBuf,
        line: usize,
        entry: String,
    },
}
