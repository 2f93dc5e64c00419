//! Normalization of announced blocks into the canonical allow-list sets.
//!
//! IPv4 blocks shorter than /24 are split into contiguous /24 blocks, /24
//! blocks pass through, and longer blocks are kept at their exact length
//! unless an accepted broader block already covers them. IPv6 blocks are
//! only deduplicated, with overlap collapsing available as an opt-in policy.

use anyhow::{Context, Result};
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::prefix::{Family, NetworkBlock, NormalizedBlockSet};

/// Prefix length every short IPv4 block is split into
pub const V4_BLOCK_LEN: u8 = 24;

/// Number of addresses in one /24
const V4_BLOCK_SIZE: u32 = 1 << (32 - V4_BLOCK_LEN);

/// How IPv6 blocks are canonicalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ipv6Policy {
    /// Remove exact duplicates only
    #[default]
    Exact,
    /// Also drop blocks already covered by a broader accepted block
    CollapseOverlaps,
}

/// Split an IPv4 block into the /24 blocks covering exactly its range.
///
/// A block of length `p < 24` yields `2^(24 - p)` blocks, starting at the
/// network address and stepping by 256 addresses. Blocks of length 24 or
/// longer are returned unchanged.
pub fn split_to_24(net: Ipv4Net) -> Vec<Ipv4Net> {
    let net = net.trunc();
    let prefix_len = net.prefix_len();
    if prefix_len >= V4_BLOCK_LEN {
        return vec![net];
    }

    let count = 1u32 << (V4_BLOCK_LEN - prefix_len);
    let base = u32::from(net.network());

    // base is aligned to the block size, so base + (count - 1) * 256 never wraps
    (0..count)
        .map(|i| {
            let addr = Ipv4Addr::from(base + i * V4_BLOCK_SIZE);
            Ipv4Net::new(addr, V4_BLOCK_LEN).expect("24 is a valid IPv4 prefix length")
        })
        .collect()
}

/// Normalize blocks of one family with the default IPv6 policy.
pub fn normalize(blocks: &[NetworkBlock], family: Family) -> NormalizedBlockSet {
    normalize_with(blocks, family, Ipv6Policy::default())
}

/// Normalize blocks of one family.
///
/// Blocks of the other family are ignored. An empty input yields an empty set.
pub fn normalize_with(
    blocks: &[NetworkBlock],
    family: Family,
    ipv6_policy: Ipv6Policy,
) -> NormalizedBlockSet {
    let mut merged = BTreeSet::new();
    for block in blocks.iter().filter(|b| b.family() == family) {
        merged.extend(decompose(block));
    }
    finish(family, merged, ipv6_policy, blocks.len())
}

/// Normalize on a pool of blocking workers.
///
/// Input is split into `workers` chunks that decompose independently; the
/// caller's task is the only writer of the merged set and merges each
/// worker's output after it joins. Arrival order has no effect on the result.
pub async fn normalize_parallel(
    blocks: Vec<NetworkBlock>,
    family: Family,
    ipv6_policy: Ipv6Policy,
    workers: usize,
) -> Result<NormalizedBlockSet> {
    let input_len = blocks.len();
    let chunk_size = input_len.div_ceil(workers.max(1)).max(1);

    let handles: Vec<_> = blocks
        .chunks(chunk_size)
        .map(|chunk| {
            let chunk = chunk.to_vec();
            tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .filter(|b| b.family() == family)
                    .flat_map(decompose)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    debug!(
        family = family.label(),
        workers = handles.len(),
        input = input_len,
        "Decomposing blocks"
    );

    let mut merged = BTreeSet::new();
    for handle in handles {
        let part = handle
            .await
            .context("Block decomposition worker failed")?;
        merged.extend(part);
    }

    Ok(finish(family, merged, ipv6_policy, input_len))
}

/// Total number of addresses covered by a set.
///
/// Uses saturating arithmetic so `::/0` does not overflow.
pub fn count_addresses(set: &NormalizedBlockSet) -> u128 {
    set.iter()
        .map(|block| {
            let shift = block.family().bit_width() - block.prefix_len();
            if shift >= 128 {
                u128::MAX
            } else {
                1u128 << shift
            }
        })
        .fold(0u128, |acc, count| acc.saturating_add(count))
}

fn decompose(block: &NetworkBlock) -> Vec<NetworkBlock> {
    match block.as_ipnet() {
        IpNet::V4(net) => split_to_24(net).into_iter().map(NetworkBlock::from).collect(),
        IpNet::V6(_) => vec![*block],
    }
}

fn finish(
    family: Family,
    merged: BTreeSet<NetworkBlock>,
    ipv6_policy: Ipv6Policy,
    input_len: usize,
) -> NormalizedBlockSet {
    let unique = merged.len();
    let canonical = match (family, ipv6_policy) {
        (Family::V4, _) | (Family::V6, Ipv6Policy::CollapseOverlaps) => drop_covered(merged),
        (Family::V6, Ipv6Policy::Exact) => merged,
    };

    debug!(
        family = family.label(),
        input = input_len,
        unique,
        output = canonical.len(),
        "Normalized blocks"
    );

    NormalizedBlockSet::from_canonical(family, canonical)
}

/// Drop every block covered by a broader block of the set.
///
/// Canonical order visits broader blocks first, so a block is kept only if
/// none of its supernets was kept before it.
fn drop_covered(blocks: BTreeSet<NetworkBlock>) -> BTreeSet<NetworkBlock> {
    let mut accepted = BTreeSet::new();
    for block in blocks {
        if !is_covered(&accepted, &block) {
            accepted.insert(block);
        }
    }
    accepted
}

fn is_covered(accepted: &BTreeSet<NetworkBlock>, block: &NetworkBlock) -> bool {
    (0..block.prefix_len()).any(|len| {
        IpNet::new(block.network(), len)
            .map(|supernet| accepted.contains(&NetworkBlock::new(supernet)))
            .unwrap_or(false)
    })
}
