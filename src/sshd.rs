//! Administrative (SSH) port discovery from the sshd configuration.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::fs_abstraction::FileSystem;

fn port_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?i:port)\s+(\S+)").expect("valid regex pattern"))
}

/// First valid `Port <number>` directive in `config`, if any.
///
/// Commented lines never match. A directive whose value is not a port
/// number in 1..=65535 is skipped with a warning and the search continues.
pub fn parse_port(config: &str) -> Option<u16> {
    for line in config.lines() {
        let Some(caps) = port_directive().captures(line) else {
            continue;
        };
        match caps[1].parse::<u16>() {
            Ok(port) if port != 0 => return Some(port),
            _ => warn!("Ignoring invalid Port directive: {:?}", line.trim()),
        }
    }
    None
}

/// Discover the SSH port, falling back to `default_port`.
///
/// An unreadable or directive-free configuration is not fatal: the default
/// is used and a warning logged.
pub fn discover_port<F: FileSystem + ?Sized>(fs: &F, path: &Path, default_port: u16) -> u16 {
    let content = match fs.read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(
                "Couldn't read sshd configuration {:?} ({}), using default port {}",
                path, e, default_port
            );
            return default_port;
        }
    };

    match parse_port(&content) {
        Some(port) => {
            info!("Found SSH port {} in {:?}", port, path);
            port
        }
        None => {
            warn!(
                "Couldn't find Port in sshd configuration {:?}, using default port {}",
                path, default_port
            );
            default_port
        }
    }
}
