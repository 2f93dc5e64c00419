//! Integration tests for the asnwall binary.
//!
//! Everything here runs unprivileged against files in a temporary directory;
//! nothing touches the live firewall.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Run asnwall and return its output
fn run_asnwall(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_asnwall"))
        .args(args)
        .output()
        .expect("Failed to execute asnwall")
}

/// Write a config whose every path points into `dir`
fn write_config(dir: &Path, source_url: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    let yaml = format!(
        "source:\n  url: {url}\n  max_attempts: 1\n  retry_delay_secs: 0\n  connect_timeout_secs: 2\n\
         asns: [64500]\n\
         prefixes:\n  v4_path: {dir}/prefixes_v4.txt\n  v6_path: {dir}/prefixes_v6.txt\n\
         ruleset:\n  path: {dir}/nftables.conf\n\
         ssh:\n  config_path: {dir}/sshd_config\n\
         lock_file: {dir}/asnwall.lock\n",
        url = source_url,
        dir = dir.display()
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_version_command() {
    let output = run_asnwall(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("asnwall"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_command() {
    let output = run_asnwall(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["fetch", "setup", "update", "config"] {
        assert!(stdout.contains(command), "help lacks {}", command);
    }
}

#[test]
fn test_config_command_prints_loadable_yaml() {
    let dir = TempDir::new().unwrap();
    let output = run_asnwall(&["config"]);
    assert!(output.status.success());

    let path = dir.path().join("default.yaml");
    std::fs::write(&path, &output.stdout).unwrap();
    let config = asnwall::Config::load(&path).unwrap();
    assert_eq!(config, asnwall::Config::default());
}

#[test]
fn test_config_command_writes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("etc").join("config.yaml");

    let output = run_asnwall(&["config", "--output", path.to_str().unwrap()]);

    assert!(output.status.success());
    assert_eq!(
        asnwall::Config::load(&path).unwrap(),
        asnwall::Config::default()
    );
}

#[test]
fn test_setup_dry_run_prints_ruleset() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://127.0.0.1:1/table.jsonl");
    std::fs::write(dir.path().join("prefixes_v4.txt"), "198.51.100.0/24\n").unwrap();
    std::fs::write(dir.path().join("sshd_config"), "Port 2222\n").unwrap();

    let output = run_asnwall(&["-q", "-c", config.to_str().unwrap(), "setup", "--dry-run"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.starts_with("#!/usr/sbin/nft -f\n"));
    assert!(stdout.contains("198.51.100.0/24"));
    assert!(stdout.contains("tcp dport 2222 accept"));
    assert!(!dir.path().join("nftables.conf").exists());
}

#[test]
fn test_setup_dry_run_refuses_empty_allow_list() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://127.0.0.1:1/table.jsonl");

    let output = run_asnwall(&["-c", config.to_str().unwrap(), "setup", "--dry-run"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("both IPv4 and IPv6 prefix sets are empty"), "stderr: {}", stderr);
    assert!(!dir.path().join("nftables.conf").exists());
}

#[test]
fn test_setup_requires_root() {
    if is_root() {
        eprintln!("Skipping test_setup_requires_root: running as root");
        return;
    }

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://127.0.0.1:1/table.jsonl");
    std::fs::write(dir.path().join("prefixes_v4.txt"), "198.51.100.0/24\n").unwrap();

    let output = run_asnwall(&["-c", config.to_str().unwrap(), "setup"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("root"));
    assert!(!dir.path().join("nftables.conf").exists());
}

#[test]
fn test_fetch_unreachable_source_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://127.0.0.1:1/table.jsonl");

    let output = run_asnwall(&["-c", config.to_str().unwrap(), "fetch"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Fetch stage failed"), "stderr: {}", stderr);
    assert!(!dir.path().join("prefixes_v4.txt").exists());
    assert!(!dir.path().join("prefixes_v6.txt").exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://insecure.example/table.jsonl");

    let output = run_asnwall(&["-c", config.to_str().unwrap(), "setup", "--dry-run"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("HTTPS"));
}
