//! Persisted prefix files.
//!
//! One plain-text file per family, one CIDR per line in canonical order,
//! no header. A missing file reads as an empty set.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregator::normalize;
use crate::config::PrefixPaths;
use crate::error::AsnwallError;
use crate::fs_abstraction::FileSystem;
use crate::prefix::{Family, NetworkBlock, NormalizedBlockSet};

/// What happened to a prefix file on write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// File replaced with this many entries
    Written(usize),
    /// Set was empty; the previous file was left in place
    Kept,
}

/// Render a set in the persisted format.
pub fn render_prefix_file(set: &NormalizedBlockSet) -> String {
    let mut out = String::with_capacity(set.len() * 20);
    for block in set {
        out.push_str(&block.to_string());
        out.push('\n');
    }
    out
}

/// Replace the prefix file for `set`'s family.
///
/// An empty set never overwrites an existing file: an upstream snapshot that
/// momentarily lacks a family must not wipe the last good allow-list.
pub fn write_prefix_file<F: FileSystem + ?Sized>(
    fs: &F,
    path: &Path,
    set: &NormalizedBlockSet,
) -> Result<WriteStatus> {
    if set.is_empty() {
        info!(
            family = set.family().label(),
            "No prefixes to write, keeping {:?}",
            path
        );
        return Ok(WriteStatus::Kept);
    }

    fs.write_atomic(path, render_prefix_file(set).as_bytes())
        .with_context(|| format!("Failed to write {} prefixes to {:?}", set.family(), path))?;

    info!(
        family = set.family().label(),
        count = set.len(),
        "Wrote prefixes to {:?}",
        path
    );
    Ok(WriteStatus::Written(set.len()))
}

/// Read a prefix file back into a normalized set.
///
/// A missing file is an empty set (logged). Any entry that does not parse,
/// or belongs to the other family, is an error: a damaged allow-list must
/// not silently shrink.
pub fn read_prefix_file<F: FileSystem + ?Sized>(
    fs: &F,
    path: &Path,
    family: Family,
) -> Result<NormalizedBlockSet> {
    let content = match fs.read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(
                family = family.label(),
                "Prefix file {:?} not found, treating as empty",
                path
            );
            return Ok(NormalizedBlockSet::empty(family));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read prefix file {:?}", path));
        }
    };

    let mut blocks = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let block = trimmed
            .parse::<NetworkBlock>()
            .ok()
            .filter(|b| b.family() == family)
            .ok_or_else(|| AsnwallError::PrefixFile {
                path: path.to_path_buf(),
                line: idx + 1,
                entry: trimmed.to_string(),
            })?;
        blocks.push(block);
    }

    Ok(normalize(&blocks, family))
}

/// Read both prefix files.
pub fn read_both<F: FileSystem + ?Sized>(
    fs: &F,
    paths: &PrefixPaths,
) -> Result<(NormalizedBlockSet, NormalizedBlockSet)> {
    let v4 = read_prefix_file(fs, &paths.v4_path, Family::V4)?;
    let v6 = read_prefix_file(fs, &paths.v6_path, Family::V6)?;
    Ok((v4, v6))
}

/// Write both prefix files concurrently and wait for both.
///
/// Both writes always run to completion; the first error, if any, is returned.
pub async fn write_both<F: FileSystem + ?Sized + 'static>(
    fs: Arc<F>,
    v4: NormalizedBlockSet,
    v6: NormalizedBlockSet,
    paths: &PrefixPaths,
) -> Result<(WriteStatus, WriteStatus)> {
    let (v4_result, v6_result) = tokio::join!(
        spawn_write(Arc::clone(&fs), paths.v4_path.clone(), v4),
        spawn_write(fs, paths.v6_path.clone(), v6),
    );

    match (v4_result, v6_result) {
        (Ok(v4_status), Ok(v6_status)) => Ok((v4_status, v6_status)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(v4_err), Err(v6_err)) => {
            warn!("IPv6 prefix write failed as well: {:#}", v6_err);
            Err(v4_err)
        }
    }
}

async fn spawn_write<F: FileSystem + ?Sized + 'static>(
    fs: Arc<F>,
    path: PathBuf,
    set: NormalizedBlockSet,
) -> Result<WriteStatus> {
    tokio::task::spawn_blocking(move || write_prefix_file(&*fs, &path, &set))
        .await
        .context("Prefix writer task failed")?
}
