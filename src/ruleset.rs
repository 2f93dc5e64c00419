//! nftables ruleset rendering.
//!
//! The document is assembled from an ordered list of optional sections by a
//! pure function: identical inputs always give byte-identical output, which
//! is what makes "did the ruleset change" a meaningful question.

use std::fmt;

use crate::error::AsnwallError;
use crate::prefix::{Family, NormalizedBlockSet};

pub const SET_V4: &str = "allowed_ipv4";
pub const SET_V6: &str = "allowed_ipv6";

const TABLE: &str = "inet filter";

/// Generated nftables configuration text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesetDocument(String);

impl RulesetDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RulesetDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named allow-list set plus the match expression that references it
struct AllowSet<'a> {
    name: &'static str,
    addr_type: &'static str,
    selector: &'static str,
    blocks: &'a NormalizedBlockSet,
}

impl<'a> AllowSet<'a> {
    fn for_family(blocks: &'a NormalizedBlockSet) -> Self {
        match blocks.family() {
            Family::V4 => Self {
                name: SET_V4,
                addr_type: "ipv4_addr",
                selector: "ip",
                blocks,
            },
            Family::V6 => Self {
                name: SET_V6,
                addr_type: "ipv6_addr",
                selector: "ip6",
                blocks,
            },
        }
    }

    fn write(&self, doc: &mut Builder) {
        doc.open(&format!("set {}", self.name));
        doc.line(&format!(
            "type {}; flags interval; auto-merge;",
            self.addr_type
        ));
        doc.open("elements =");
        let last = self.blocks.len().saturating_sub(1);
        for (i, block) in self.blocks.iter().enumerate() {
            if i < last {
                doc.line(&format!("{},", block));
            } else {
                doc.line(&block.to_string());
            }
        }
        doc.close();
        doc.close();
    }

    fn accept_rule(&self) -> String {
        format!("{} saddr @{} accept", self.selector, self.name)
    }
}

/// Tab-indented line writer
struct Builder {
    out: String,
    depth: usize,
}

impl Builder {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn open(&mut self, header: &str) {
        self.line(&format!("{} {{", header));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn finish(self) -> RulesetDocument {
        RulesetDocument(self.out)
    }
}

/// Render the allow-list ruleset.
///
/// Input traffic is dropped unless it belongs to an established connection,
/// arrives on loopback, targets `ssh_port`, or comes from an allowed block.
/// A set (and its accept rule) is emitted only for a non-empty family; if
/// both are empty rendering fails with [`AsnwallError::EmptyAllowList`].
pub fn render(
    v4: &NormalizedBlockSet,
    v6: &NormalizedBlockSet,
    ssh_port: u16,
) -> Result<RulesetDocument, AsnwallError> {
    debug_assert_eq!(v4.family(), Family::V4);
    debug_assert_eq!(v6.family(), Family::V6);

    if v4.is_empty() && v6.is_empty() {
        return Err(AsnwallError::EmptyAllowList);
    }

    let sets: Vec<AllowSet> = [v4, v6]
        .into_iter()
        .filter(|blocks| !blocks.is_empty())
        .map(AllowSet::for_family)
        .collect();

    let mut doc = Builder::new();
    doc.line("#!/usr/sbin/nft -f");
    doc.blank();
    doc.line("flush ruleset");
    doc.blank();

    doc.open(&format!("table {}", TABLE));

    for set in &sets {
        set.write(&mut doc);
        doc.blank();
    }

    doc.open("chain input");
    doc.line("type filter hook input priority filter; policy drop;");
    doc.line("ct state established,related accept");
    doc.line("iif lo accept");
    doc.line(&format!("tcp dport {} accept", ssh_port));
    for set in &sets {
        doc.line(&set.accept_rule());
    }
    doc.close();
    doc.blank();

    doc.open("chain forward");
    doc.line("type filter hook forward priority filter; policy drop;");
    doc.close();
    doc.blank();

    doc.open("chain output");
    doc.line("type filter hook output priority filter; policy accept;");
    doc.close();

    doc.close();

    Ok(doc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::normalize;
    use crate::prefix::NetworkBlock;

    fn set(list: &[&str], family: Family) -> NormalizedBlockSet {
        let blocks: Vec<NetworkBlock> = list.iter().map(|s| s.parse().unwrap()).collect();
        normalize(&blocks, family)
    }

    #[test]
    fn test_render_full_document() {
        let v4 = set(&["198.51.100.0/23"], Family::V4);
        let v6 = set(&["2001:db8::/32"], Family::V6);
        let doc = render(&v4, &v6, 22).unwrap();

        let expected = "\
#!/usr/sbin/nft -f

flush ruleset

table inet filter {
\tset allowed_ipv4 {
\t\ttype ipv4_addr; flags interval; auto-merge;
\t\telements = {
\t\t\t198.51.100.0/24,
\t\t\t198.51.101.0/24
\t\t}
\t}

\tset allowed_ipv6 {
\t\ttype ipv6_addr; flags interval; auto-merge;
\t\telements = {
\t\t\t2001:db8::/32
\t\t}
\t}

\tchain input {
\t\ttype filter hook input priority filter; policy drop;
\t\tct state established,related accept
\t\tiif lo accept
\t\ttcp dport 22 accept
\t\tip saddr @allowed_ipv4 accept
\t\tip6 saddr @allowed_ipv6 accept
\t}

\tchain forward {
\t\ttype filter hook forward priority filter; policy drop;
\t}

\tchain output {
\t\ttype filter hook output priority filter; policy accept;
\t}
}
";
        assert_eq!(doc.as_str(), expected);
    }

    #[test]
    fn test_render_uses_discovered_port() {
        let v4 = set(&["192.0.2.0/24"], Family::V4);
        let doc = render(&v4, &NormalizedBlockSet::empty(Family::V6), 2222).unwrap();
        assert!(doc.as_str().contains("\t\ttcp dport 2222 accept\n"));
        assert!(!doc.as_str().contains("dport 22 "));
    }

    #[test]
    fn test_render_v4_only() {
        let v4 = set(&["192.0.2.0/24"], Family::V4);
        let doc = render(&v4, &NormalizedBlockSet::empty(Family::V6), 22).unwrap();
        assert!(doc.as_str().contains("set allowed_ipv4"));
        assert!(doc.as_str().contains("ip saddr @allowed_ipv4 accept"));
        assert!(!doc.as_str().contains("allowed_ipv6"));
    }

    #[test]
    fn test_render_v6_only() {
        let v6 = set(&["2001:db8::/32"], Family::V6);
        let doc = render(&NormalizedBlockSet::empty(Family::V4), &v6, 22).unwrap();
        assert!(!doc.as_str().contains("allowed_ipv4"));
        assert!(doc.as_str().contains("ip6 saddr @allowed_ipv6 accept"));
    }

    #[test]
    fn test_render_both_empty_is_fatal() {
        let result = render(
            &NormalizedBlockSet::empty(Family::V4),
            &NormalizedBlockSet::empty(Family::V6),
            22,
        );
        assert!(matches!(result, Err(AsnwallError::EmptyAllowList)));
    }

    #[test]
    fn test_render_deterministic() {
        let v4 = set(&["10.0.0.0/20", "192.0.2.0/24", "203.0.113.64/26"], Family::V4);
        let v6 = set(&["2001:db8::/32", "2a00:1::/48"], Family::V6);
        let first = render(&v4, &v6, 22).unwrap();
        let second = render(&v4.clone(), &v6.clone(), 22).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_render_rule_order() {
        let v4 = set(&["192.0.2.0/24"], Family::V4);
        let v6 = set(&["2001:db8::/32"], Family::V6);
        let doc = render(&v4, &v6, 22).unwrap().into_string();

        let positions: Vec<usize> = [
            "policy drop;",
            "ct state established,related accept",
            "iif lo accept",
            "tcp dport 22 accept",
            "ip saddr @allowed_ipv4 accept",
            "ip6 saddr @allowed_ipv6 accept",
            "chain forward",
            "chain output",
        ]
        .iter()
        .map(|needle| doc.find(needle).unwrap())
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_elements_separated_by_commas_except_last() {
        let v4 = set(&["10.0.0.0/22"], Family::V4);
        let doc = render(&v4, &NormalizedBlockSet::empty(Family::V6), 22).unwrap();
        assert_eq!(doc.as_str().matches("/24,\n").count(), 3);
        assert!(doc.as_str().contains("10.0.3.0/24\n"));
    }
}
