//! Used-block bookkeeping for one hierarchy level

use crate::cidr;
use crate::error::IpamResult;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Ordered blocks already handed out at one level.
///
/// Grows monotonically during a provisioning run. Each level owns its own
/// set; siblings never share one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsedSet {
    blocks: Vec<Ipv4Net>,
}

impl UsedSet {
    /// Nothing used yet
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Build from CIDR strings supplied by a tracking store
    pub fn from_cidrs<I, S>(cidrs: I) -> IpamResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            blocks: cidr::parse_blocks(cidrs)?,
        })
    }

    /// Append a newly allocated block
    pub fn record(&mut self, block: Ipv4Net) {
        self.blocks.push(block.trunc());
    }

    /// Blocks in recording order
    pub fn as_slice(&self) -> &[Ipv4Net] {
        &self.blocks
    }

    /// Iterate in recording order
    pub fn iter(&self) -> std::slice::Iter<'_, Ipv4Net> {
        self.blocks.iter()
    }

    /// Number of recorded blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True before the first allocation
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// True if exactly `block` was recorded
    pub fn contains(&self, block: &Ipv4Net) -> bool {
        self.blocks.contains(&block.trunc())
    }
}

impl FromIterator<Ipv4Net> for UsedSet {
    fn from_iter<I: IntoIterator<Item = Ipv4Net>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().map(|b| b.trunc()).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a UsedSet {
    type Item = &'a Ipv4Net;
    type IntoIter = std::slice::Iter<'a, Ipv4Net>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_order() {
        let mut used = UsedSet::new();
        used.record("10.0.16.0/20".parse().unwrap());
        used.record("10.0.0.0/20".parse().unwrap());

        let listed: Vec<String> = used.iter().map(|b| b.to_string()).collect();
        assert_eq!(listed, vec!["10.0.16.0/20", "10.0.0.0/20"]);
        assert_eq!(used.len(), 2);
    }

    #[test]
    fn test_from_cidrs() {
        let used = UsedSet::from_cidrs(["10.0.0.9/24"]).unwrap();
        assert!(used.contains(&"10.0.0.0/24".parse().unwrap()));
        assert!(UsedSet::from_cidrs(["bogus"]).is_err());
    }

    #[test]
    fn test_serializes_as_list() {
        let used = UsedSet::from_cidrs(["10.0.0.0/24"]).unwrap();
        let json = serde_json::to_string(&used).unwrap();
        assert_eq!(json, r#"["10.0.0.0/24"]"#);
    }
}
