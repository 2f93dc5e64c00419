//! Network blocks, routing-table records and the canonical block set.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::cmp::Ordering;
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Address family of a network block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Address width in bits (32 or 128)
    pub fn bit_width(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    /// Short label used in log fields
    pub fn label(self) -> &'static str {
        match self {
            Family::V4 => "v4",
            Family::V6 => "v6",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}

/// A CIDR block: network address plus prefix length.
///
/// Host bits are always cleared on construction, so `198.51.100.7/23`
/// becomes `198.51.100.0/23`.
///
/// Ordering is the canonical one used for every persisted or rendered list:
/// address width first (IPv4 before IPv6), then prefix length ascending,
/// then numeric address ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkBlock(IpNet);

impl NetworkBlock {
    pub fn new(net: IpNet) -> Self {
        Self(net.trunc())
    }

    pub fn family(&self) -> Family {
        match self.0 {
            IpNet::V4(_) => Family::V4,
            IpNet::V6(_) => Family::V6,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    pub fn network(&self) -> IpAddr {
        self.0.network()
    }

    pub fn as_ipnet(&self) -> IpNet {
        self.0
    }

    /// Whether `other` lies entirely inside this block.
    pub fn contains(&self, other: &NetworkBlock) -> bool {
        self.0.contains(&other.0)
    }

    /// Two blocks overlap if either contains the other's network address.
    pub fn overlaps(&self, other: &NetworkBlock) -> bool {
        self.0.contains(&other.network()) || other.0.contains(&self.network())
    }

    fn numeric_address(&self) -> u128 {
        match self.0.network() {
            IpAddr::V4(addr) => u128::from(u32::from(addr)),
            IpAddr::V6(addr) => u128::from(addr),
        }
    }
}

impl Ord for NetworkBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.family()
            .bit_width()
            .cmp(&other.family().bit_width())
            .then_with(|| self.prefix_len().cmp(&other.prefix_len()))
            .then_with(|| self.numeric_address().cmp(&other.numeric_address()))
    }
}

impl PartialOrd for NetworkBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<IpNet> for NetworkBlock {
    fn from(net: IpNet) -> Self {
        Self::new(net)
    }
}

impl From<Ipv4Net> for NetworkBlock {
    fn from(net: Ipv4Net) -> Self {
        Self::new(IpNet::V4(net))
    }
}

impl From<Ipv6Net> for NetworkBlock {
    fn from(net: Ipv6Net) -> Self {
        Self::new(IpNet::V6(net))
    }
}

impl FromStr for NetworkBlock {
    type Err = ipnet::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<IpNet>().map(Self::new)
    }
}

impl fmt::Display for NetworkBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One routing-table entry: a block announced by an ASN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixRecord {
    pub block: NetworkBlock,
    pub asn: u32,
}

/// Canonically ordered, duplicate-free blocks of one family.
///
/// IPv4 sets are also overlap-free. Only the aggregator builds non-empty
/// sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBlockSet {
    family: Family,
    blocks: BTreeSet<NetworkBlock>,
}

impl NormalizedBlockSet {
    pub fn empty(family: Family) -> Self {
        Self {
            family,
            blocks: BTreeSet::new(),
        }
    }

    pub(crate) fn from_canonical(family: Family, blocks: BTreeSet<NetworkBlock>) -> Self {
        debug_assert!(blocks.iter().all(|b| b.family() == family));
        Self { family, blocks }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in canonical order
    pub fn iter(&self) -> btree_set::Iter<'_, NetworkBlock> {
        self.blocks.iter()
    }

    pub fn to_vec(&self) -> Vec<NetworkBlock> {
        self.blocks.iter().copied().collect()
    }
}

impl<'a> IntoIterator for &'a NormalizedBlockSet {
    type Item = &'a NetworkBlock;
    type IntoIter = btree_set::Iter<'a, NetworkBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
