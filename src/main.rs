//! asnwall - operator-based nftables allow-list
//!
//! Allows inbound traffic only from address blocks announced by a chosen set
//! of autonomous systems.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use asnwall::cli::{Cli, Commands};
use asnwall::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Fetch => asnwall::commands::fetch::run(&cli.config).await,
        Commands::Setup { dry_run } => asnwall::commands::setup::run(dry_run, &cli.config).await,
        Commands::Update { dry_run } => asnwall::commands::update::run(dry_run, &cli.config).await,
        Commands::Config { output: None } => {
            print!("{}", Config::generate_default_yaml());
            Ok(())
        }
        Commands::Config { output: Some(path) } => {
            Config::default()
                .save(&path)
                .with_context(|| format!("Failed to write default config to {:?}", path))?;
            println!("[OK] Default configuration written to {:?}", path);
            Ok(())
        }
        Commands::Version => {
            println!("asnwall {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
