//! Filtering routing-table records by operator and splitting by family.

use std::collections::HashSet;

use crate::prefix::{Family, NetworkBlock, PrefixRecord};

/// Blocks announced by the target ASNs, in fetch order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classified {
    pub v4: Vec<NetworkBlock>,
    pub v6: Vec<NetworkBlock>,
}

impl Classified {
    pub fn total(&self) -> usize {
        self.v4.len() + self.v6.len()
    }
}

/// Keep records whose ASN is in `target_asns` and split them by family.
///
/// Output order is input order; canonicalization belongs to the aggregator.
pub fn classify<'a, I>(records: I, target_asns: &[u32]) -> Classified
where
    I: IntoIterator<Item = &'a PrefixRecord>,
{
    let targets: HashSet<u32> = target_asns.iter().copied().collect();

    let mut out = Classified::default();
    for record in records {
        if !targets.contains(&record.asn) {
            continue;
        }
        match record.block.family() {
            Family::V4 => out.v4.push(record.block),
            Family::V6 => out.v6.push(record.block),
        }
    }
    out
}
