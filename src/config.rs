//! Configuration management for asnwall.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregator::Ipv6Policy;

/// Default operator list: the networks the allow-list was first built for.
const DEFAULT_ASNS: &[u32] = &[
    197207, 44244, 25184, 41689, 12880, 49100, 41881, 50810, 47330, 48159, 58224, 42337, 24631,
    39501, 51469, 205647, 31549, 57218, 25124, 42440, 60976, 16322,
];

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Routing-table snapshot source
    pub source: SourceConfig,

    /// Operators (ASNs) whose announced blocks are allowed
    pub asns: Vec<u32>,

    /// Persisted prefix files
    pub prefixes: PrefixPaths,

    /// Generated ruleset
    pub ruleset: RulesetConfig,

    /// Administrative (SSH) access
    pub ssh: SshConfig,

    /// External firewall engine and service manager
    pub engine: EngineConfig,

    /// Number of decomposition workers
    pub workers: usize,

    /// Lock file preventing concurrent runs
    pub lock_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            asns: DEFAULT_ASNS.to_vec(),
            prefixes: PrefixPaths::default(),
            ruleset: RulesetConfig::default(),
            ssh: SshConfig::default(),
            engine: EngineConfig::default(),
            workers: 4,
            lock_file: PathBuf::from("/run/asnwall.lock"),
        }
    }
}

/// HTTP source of the newline-delimited JSON routing table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,

    /// Identifying User-Agent sent with every request (required by the feed operator)
    pub user_agent: String,

    pub max_attempts: u32,

    /// Fixed delay between attempts
    pub retry_delay_secs: u64,

    /// Overall per-attempt timeout (the snapshot is large)
    pub timeout_secs: u64,

    pub connect_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://bgp.tools/table.jsonl".to_string(),
            user_agent: format!("asnwall/{} bgp.tools", env!("CARGO_PKG_VERSION")),
            max_attempts: 3,
            retry_delay_secs: 2,
            timeout_secs: 300,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixPaths {
    pub v4_path: PathBuf,
    pub v6_path: PathBuf,
}

impl Default for PrefixPaths {
    fn default() -> Self {
        Self {
            v4_path: PathBuf::from("/var/lib/asnwall/prefixes_v4.txt"),
            v6_path: PathBuf::from("/var/lib/asnwall/prefixes_v6.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetConfig {
    pub path: PathBuf,
    pub ipv6_policy: Ipv6Policy,
}

impl Default for RulesetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/nftables.conf"),
            ipv6_policy: Ipv6Policy::Exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// sshd configuration read for a `Port` directive
    pub config_path: PathBuf,
    pub default_port: u16,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/ssh/sshd_config"),
            default_port: 22,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub nft: String,
    pub systemctl: String,
    /// Service unit that loads the ruleset at boot
    pub service: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nft: "nft".to_string(),
            systemctl: "systemctl".to_string(),
            service: "nftables".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file is not an error: built-in defaults are used.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.asns.is_empty() {
            anyhow::bail!("At least one ASN must be configured");
        }

        if !self.source.url.starts_with("https://") {
            anyhow::bail!("Source URL must use HTTPS: {}", self.source.url);
        }

        if !is_valid_header_value(&self.source.user_agent) {
            anyhow::bail!(
                "Invalid user_agent {:?}: must be non-empty printable ASCII",
                self.source.user_agent
            );
        }

        if self.source.max_attempts == 0 {
            anyhow::bail!("source.max_attempts must be at least 1");
        }

        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        if self.ssh.default_port == 0 {
            anyhow::bail!("ssh.default_port must be between 1 and 65535");
        }

        if self.engine.service.is_empty()
            || !self
                .engine
                .service
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        {
            anyhow::bail!("Invalid service unit name: {:?}", self.engine.service);
        }

        Ok(())
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        crate::fs_abstraction::write_atomic(path.as_ref(), content.as_bytes())
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))
    }

    /// Generate a commented default configuration
    pub fn generate_default_yaml() -> String {
        let body = serde_yaml::to_string(&Self::default()).unwrap_or_default();
        format!(
            "# asnwall configuration\n\
             # Blocks announced by the listed ASNs are allowed inbound; everything\n\
             # else is dropped except SSH on the discovered port.\n\n{}",
            body
        )
    }
}

/// HTTP header values must be visible ASCII or spaces; reject anything that
/// could terminate the header line.
fn is_valid_header_value(value: &str) -> bool {
    !value.trim().is_empty() && value.chars().all(|c| c == ' ' || c.is_ascii_graphic())
}
