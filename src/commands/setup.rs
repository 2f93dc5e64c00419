//! Setup command: render the ruleset from the persisted prefixes and apply it.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::enforcer::{apply, check_root, ApplyReport, FirewallEngine, NftablesEngine};
use crate::fs_abstraction::{real_fs, FileSystem};
use crate::lock::LockGuard;
use crate::ruleset::{render, RulesetDocument};
use crate::sshd::discover_port;
use crate::store;
use crate::utils::format_count;

/// Read both prefix files, discover the SSH port and render the ruleset.
///
/// Fails with [`crate::error::AsnwallError::EmptyAllowList`] before anything
/// is written when neither family has a block.
pub fn prepare_ruleset<F: FileSystem + ?Sized>(config: &Config, fs: &F) -> Result<RulesetDocument> {
    let (v4, v6) =
        store::read_both(fs, &config.prefixes).context("Failed to read persisted prefixes")?;
    let port = discover_port(fs, &config.ssh.config_path, config.ssh.default_port);

    let document = render(&v4, &v6, port).context("Render stage failed")?;
    info!(
        "Rendered ruleset: {} IPv4 blocks, {} IPv6 blocks, SSH port {}",
        format_count(v4.len()),
        format_count(v6.len()),
        port
    );
    Ok(document)
}

/// Write the document to the configured ruleset path and apply it.
pub fn install_ruleset<E, F>(
    document: &RulesetDocument,
    config: &Config,
    engine: &E,
    fs: &F,
) -> Result<ApplyReport>
where
    E: FirewallEngine + ?Sized,
    F: FileSystem + ?Sized,
{
    apply(engine, fs, document, &config.ruleset.path)
}

/// Render and either print (dry-run) or apply with the nftables engine.
pub(crate) fn setup(config: &Config, dry_run: bool) -> Result<()> {
    let document = prepare_ruleset(config, real_fs())?;

    if dry_run {
        info!("[DRY-RUN] Not applying; ruleset follows");
        print!("{}", document);
        return Ok(());
    }

    let engine = NftablesEngine::new(&config.engine);
    let report = install_ruleset(&document, config, &engine, real_fs())?;
    print_report(&report, &config.ruleset.path)
}

fn print_report(report: &ApplyReport, path: &Path) -> Result<()> {
    if let Some(listing) = &report.active_ruleset {
        println!("{}", listing.trim_end());
    }

    println!();
    if report.is_clean() {
        println!("[OK] Ruleset {:?} loaded and enabled", path);
        return Ok(());
    }

    println!("[WARN] Ruleset {:?} loaded, but:", path);
    for failure in &report.failures {
        println!("  - {}", failure);
    }
    anyhow::bail!(
        "{} post-load step(s) failed; the loaded ruleset was kept",
        report.failures.len()
    )
}

/// Run the setup command
pub async fn run(dry_run: bool, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // A dry run only reads, so it needs neither root nor the lock
    if dry_run {
        return setup(&config, true);
    }

    check_root()?;
    let _lock = LockGuard::acquire(&config.lock_file)?;
    setup(&config, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcer::MockFirewallEngine;
    use crate::error::AsnwallError;
    use crate::fs_abstraction::MockFileSystem;
    use std::io;
    use std::path::PathBuf;

    fn mock_fs(v4: &'static str, v6: &'static str, sshd: Option<&'static str>) -> MockFileSystem {
        let mut fs = MockFileSystem::new();
        fs.expect_read_to_string().returning(move |path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            match name {
                "prefixes_v4.txt" => Ok(v4.to_string()),
                "prefixes_v6.txt" => Ok(v6.to_string()),
                "sshd_config" => {
                    sshd.map(str::to_string)
                        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
                }
                other => panic!("unexpected read of {}", other),
            }
        });
        fs
    }

    #[test]
    fn test_prepare_ruleset_discovers_port() {
        let fs = mock_fs("192.0.2.0/24\n", "", Some("Port 2222\n"));
        let document = prepare_ruleset(&Config::default(), &fs).unwrap();

        assert!(document.as_str().contains("tcp dport 2222 accept"));
        assert!(document.as_str().contains("192.0.2.0/24"));
        assert!(!document.as_str().contains("allowed_ipv6"));
    }

    #[test]
    fn test_prepare_ruleset_default_port_without_sshd_config() {
        let fs = mock_fs("", "2001:db8::/32\n", None);
        let document = prepare_ruleset(&Config::default(), &fs).unwrap();
        assert!(document.as_str().contains("tcp dport 22 accept"));
    }

    #[test]
    fn test_prepare_ruleset_both_empty_is_fatal() {
        let fs = mock_fs("", "", Some("Port 22\n"));
        let err = prepare_ruleset(&Config::default(), &fs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AsnwallError>(),
            Some(AsnwallError::EmptyAllowList)
        ));
    }

    #[test]
    fn test_prepare_ruleset_corrupt_prefix_file() {
        let fs = mock_fs("192.0.2.0/24\n192.0.2.300/24\n", "", None);
        let err = prepare_ruleset(&Config::default(), &fs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AsnwallError>(),
            Some(AsnwallError::PrefixFile { line: 2, .. })
        ));
    }

    #[test]
    fn test_install_ruleset_uses_configured_path() {
        let mut config = Config::default();
        config.ruleset.path = PathBuf::from("/tmp/asnwall-test.nft");
        let document = prepare_ruleset(&config, &mock_fs("192.0.2.0/24\n", "", None)).unwrap();

        let mut fs = MockFileSystem::new();
        fs.expect_write_atomic()
            .withf(|p, _| p == Path::new("/tmp/asnwall-test.nft"))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut engine = MockFirewallEngine::new();
        engine
            .expect_load()
            .withf(|p| p == Path::new("/tmp/asnwall-test.nft"))
            .returning(|_| Ok(()));
        engine.expect_enable().returning(|| Ok(()));
        engine.expect_verify().returning(|| Ok(String::new()));

        let report = install_ruleset(&document, &config, &engine, &fs).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_print_report_fails_on_post_load_failure() {
        let report = ApplyReport {
            enabled: false,
            active_ruleset: None,
            failures: vec!["enable: unit not found".to_string()],
        };
        assert!(print_report(&report, Path::new("/etc/nftables.conf")).is_err());
        assert!(print_report(&ApplyReport::default(), Path::new("/etc/nftables.conf")).is_ok());
    }
}
