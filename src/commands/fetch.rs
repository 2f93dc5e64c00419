//! Fetch command: download, classify, normalize and persist.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::aggregator::{count_addresses, normalize_parallel};
use crate::classifier::classify;
use crate::config::Config;
use crate::fetcher::{Fetcher, SnapshotSource};
use crate::fs_abstraction::{FileSystem, RealFileSystem};
use crate::lock::LockGuard;
use crate::prefix::{Family, NormalizedBlockSet};
use crate::signal::{ShutdownGuard, ShutdownToken};
use crate::store::{self, WriteStatus};
use crate::utils::{format_addresses, format_count};

/// Result of one fetch-to-disk run
#[derive(Debug)]
pub struct FetchSummary {
    pub records: usize,
    pub skipped: usize,
    /// Records announced by a target ASN
    pub matched: usize,
    pub v4: NormalizedBlockSet,
    pub v6: NormalizedBlockSet,
    pub v4_status: WriteStatus,
    pub v6_status: WriteStatus,
}

/// Run the fetch stage against any snapshot source.
///
/// Both families are normalized concurrently, then both prefix files are
/// written; the write phase completes only when both writes have finished.
pub async fn fetch_and_store<S, F>(
    source: &S,
    config: &Config,
    fs: Arc<F>,
    cancel: &ShutdownToken,
) -> Result<FetchSummary>
where
    S: SnapshotSource + ?Sized,
    F: FileSystem + ?Sized + 'static,
{
    let outcome = source.fetch(cancel).await.context("Fetch stage failed")?;

    let classified = classify(&outcome.records, &config.asns);
    info!(
        "{} of {} records announced by {} target ASNs",
        format_count(classified.total()),
        format_count(outcome.records.len()),
        config.asns.len()
    );
    let matched = classified.total();

    let policy = config.ruleset.ipv6_policy;
    let (v4, v6) = tokio::try_join!(
        normalize_parallel(classified.v4, Family::V4, policy, config.workers),
        normalize_parallel(classified.v6, Family::V6, policy, config.workers),
    )
    .context("Normalize stage failed")?;

    info!(
        "Normalized to {} IPv4 blocks ({} addresses) and {} IPv6 blocks",
        format_count(v4.len()),
        format_addresses(count_addresses(&v4)),
        format_count(v6.len())
    );

    let (v4_status, v6_status) = store::write_both(fs, v4.clone(), v6.clone(), &config.prefixes)
        .await
        .context("Write stage failed")?;

    Ok(FetchSummary {
        records: outcome.records.len(),
        skipped: outcome.skipped,
        matched,
        v4,
        v6,
        v4_status,
        v6_status,
    })
}

/// Fetch from the configured source; SIGINT/SIGTERM cancel the download.
pub(crate) async fn fetch_with_shutdown(config: &Config) -> Result<FetchSummary> {
    let token = ShutdownToken::new();
    let _signals = ShutdownGuard::new(token.clone());

    let fetcher = Fetcher::new(&config.source).context("Failed to create HTTP client")?;
    fetch_and_store(&fetcher, config, Arc::new(RealFileSystem), &token).await
}

pub(crate) fn print_summary(summary: &FetchSummary, config: &Config) {
    println!();
    println!(
        "[OK] {} records fetched, {} matched ({} malformed lines skipped)",
        format_count(summary.records),
        format_count(summary.matched),
        summary.skipped
    );
    for (set, status, path) in [
        (&summary.v4, summary.v4_status, &config.prefixes.v4_path),
        (&summary.v6, summary.v6_status, &config.prefixes.v6_path),
    ] {
        match status {
            WriteStatus::Written(count) => {
                println!("  {}: {} blocks -> {:?}", set.family(), format_count(count), path)
            }
            WriteStatus::Kept => {
                println!("  {}: none found, kept previous {:?}", set.family(), path)
            }
        }
    }
}

/// Run the fetch command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let _lock = LockGuard::acquire(&config.lock_file)?;

    let summary = fetch_with_shutdown(&config).await?;
    print_summary(&summary, &config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrefixPaths;
    use crate::fetcher::{AttemptError, FetchError, FetchOutcome};
    use crate::fs_abstraction::MockFileSystem;
    use crate::prefix::{NetworkBlock, PrefixRecord};
    use async_trait::async_trait;
    use std::io;
    use tempfile::TempDir;

    struct StaticSource(Vec<PrefixRecord>);

    #[async_trait]
    impl SnapshotSource for StaticSource {
        async fn fetch(&self, _cancel: &ShutdownToken) -> Result<FetchOutcome, FetchError> {
            Ok(FetchOutcome {
                records: self.0.clone(),
                lines: self.0.len() + 1,
                skipped: 1,
            })
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn fetch(&self, _cancel: &ShutdownToken) -> Result<FetchOutcome, FetchError> {
            Err(FetchError::Exhausted {
                attempts: 3,
                source: AttemptError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE),
            })
        }
    }

    fn record(cidr: &str, asn: u32) -> PrefixRecord {
        PrefixRecord {
            block: cidr.parse::<NetworkBlock>().unwrap(),
            asn,
        }
    }

    fn config_in(dir: &TempDir) -> Config {
        Config {
            asns: vec![64500],
            prefixes: PrefixPaths {
                v4_path: dir.path().join("v4.txt"),
                v6_path: dir.path().join("v6.txt"),
            },
            workers: 2,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_and_store_pipeline() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let source = StaticSource(vec![
            record("198.51.100.0/23", 64500),
            record("203.0.113.0/24", 64501),
            record("2001:db8::/32", 64500),
        ]);

        let summary = fetch_and_store(
            &source,
            &config,
            Arc::new(RealFileSystem),
            &ShutdownToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.v4_status, WriteStatus::Written(2));
        assert_eq!(summary.v6_status, WriteStatus::Written(1));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("v4.txt")).unwrap(),
            "198.51.100.0/24\n198.51.101.0/24\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("v6.txt")).unwrap(),
            "2001:db8::/32\n"
        );
    }

    #[tokio::test]
    async fn test_fetch_without_v6_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::write(dir.path().join("v6.txt"), "2001:db8::/32\n").unwrap();
        let source = StaticSource(vec![record("192.0.2.0/24", 64500)]);

        let summary = fetch_and_store(
            &source,
            &config,
            Arc::new(RealFileSystem),
            &ShutdownToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.v6_status, WriteStatus::Kept);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("v6.txt")).unwrap(),
            "2001:db8::/32\n"
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let err = fetch_and_store(
            &FailingSource,
            &config,
            Arc::new(RealFileSystem),
            &ShutdownToken::new(),
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("Fetch stage failed"));
        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::Exhausted { attempts: 3, .. })
        ));
        assert!(!dir.path().join("v4.txt").exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_write_stage_error() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut mock_fs = MockFileSystem::new();
        mock_fs
            .expect_write_atomic()
            .times(2)
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::Other, "disk full")));
        let source = StaticSource(vec![
            record("192.0.2.0/24", 64500),
            record("2001:db8::/32", 64500),
        ]);

        let err = fetch_and_store(&source, &config, Arc::new(mock_fs), &ShutdownToken::new())
            .await
            .unwrap_err();

        let chain = format!("{:#}", err);
        assert!(chain.contains("Write stage failed"), "{}", chain);
        assert!(chain.contains("disk full"), "{}", chain);
    }
}
