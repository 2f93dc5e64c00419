//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "asnwall")]
#[command(author, version, about = "Operator-based nftables allow-list for Linux hosts")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "/etc/asnwall/config.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the routing table and persist the allowed IPv4/IPv6 prefixes
    Fetch,

    /// Render the ruleset from the persisted prefixes and apply it
    Setup {
        /// Print the ruleset instead of applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch, then set up
    Update {
        /// Fetch and persist, but print the ruleset instead of applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the default configuration, or write it to a file
    Config {
        /// Write to this path instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show version
    Version,
}
