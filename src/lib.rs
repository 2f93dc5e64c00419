//! # asnwall - operator-based firewall allow-list
//!
//! Builds an nftables allow-list from the public BGP routing table: every
//! address block announced by one of the configured autonomous systems is
//! allowed inbound, everything else is dropped except SSH.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        asnwall                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: fetch, setup, update, config, version      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │    └── Streaming NDJSON decode, fixed-delay retry, cancel   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Classifier                                                 │
//! │    └── Target-ASN filter, IPv4/IPv6 split                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Aggregator (ipnet)                                         │
//! │    └── IPv4 /24 decomposition, dedup, canonical order       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Store                                                      │
//! │    └── One prefix file per family, atomic writes            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Ruleset + sshd port discovery                              │
//! │    └── Deterministic nftables document                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (FirewallEngine trait)                            │
//! │    └── NftablesEngine: nft -f, systemctl enable, nft list   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use asnwall::commands::fetch::fetch_and_store;
//! use asnwall::commands::setup::{install_ruleset, prepare_ruleset};
//! use asnwall::config::Config;
//! use asnwall::enforcer::{check_root, NftablesEngine};
//! use asnwall::fetcher::Fetcher;
//! use asnwall::fs_abstraction::{real_fs, RealFileSystem};
//! use std::sync::Arc;
//! use asnwall::signal::ShutdownToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!     let config = Config::load("/etc/asnwall/config.yaml")?;
//!
//!     // Download the routing table and persist the allowed blocks
//!     let fetcher = Fetcher::new(&config.source)?;
//!     let cancel = ShutdownToken::new();
//!     fetch_and_store(&fetcher, &config, Arc::new(RealFileSystem), &cancel).await?;
//!
//!     // Render and apply
//!     let document = prepare_ruleset(&config, real_fs())?;
//!     let engine = NftablesEngine::new(&config.engine);
//!     install_ruleset(&document, &config, &engine, real_fs())?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - Block normalization (IPv4 /24 decomposition)
//! - [`classifier`] - ASN filtering and family split
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`enforcer`] - Firewall engine abstraction and apply sequence
//! - [`fetcher`] - HTTP client for the routing-table snapshot
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`ruleset`] - nftables document rendering
//! - [`signal`] - Cancellation on SIGINT/SIGTERM
//! - [`sshd`] - SSH port discovery
//! - [`store`] - Persisted prefix files

pub mod aggregator;
pub mod classifier;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod fetcher;
pub mod fs_abstraction;
pub mod lock;
pub mod prefix;
pub mod ruleset;
pub mod signal;
pub mod sshd;
pub mod store;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::AsnwallError;
