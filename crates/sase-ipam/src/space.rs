//! Address space
//!
//! A set of IPv4 ranges held as the minimal sorted list of disjoint CIDR
//! blocks. Removal carves holes; subdivision enumerates fixed-size
//! candidates in ascending address order.

use crate::cidr::{self, MAX_PREFIX_LEN};
use crate::error::{AllocationError, IpamResult};
use ipnet::{Ipv4Net, Ipv4Subnets};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized set of disjoint IPv4 blocks
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Ipv4Net>", from = "Vec<Ipv4Net>")]
pub struct AddressSpace {
    /// Sorted, aggregated, non-overlapping
    blocks: Vec<Ipv4Net>,
}

impl AddressSpace {
    /// Empty space
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Build from arbitrary (possibly overlapping) blocks
    pub fn from_blocks<I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = Ipv4Net>,
    {
        let mut space = Self {
            blocks: blocks.into_iter().map(|b| b.trunc()).collect(),
        };
        space.normalize();
        space
    }

    /// Build from CIDR strings
    pub fn from_cidrs<I, S>(cidrs: I) -> IpamResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::from_blocks(cidr::parse_blocks(cidrs)?))
    }

    /// Member blocks in ascending address order
    pub fn blocks(&self) -> &[Ipv4Net] {
        &self.blocks
    }

    /// True if no addresses remain
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total address count
    pub fn size(&self) -> u64 {
        self.blocks.iter().map(cidr::block_size).sum()
    }

    /// Shortest prefix length among the members (the widest block)
    pub fn widest_prefix_len(&self) -> Option<u8> {
        self.blocks.iter().map(|b| b.prefix_len()).min()
    }

    /// True if `block` lies entirely inside one member
    pub fn contains(&self, block: &Ipv4Net) -> bool {
        let block = block.trunc();
        self.blocks.iter().any(|m| m.contains(&block))
    }

    /// Remove `block` from the space.
    ///
    /// The block must nest inside a single member. Anything else (partial
    /// overlap, a block already removed, a block outside the space) is
    /// reported as [`AllocationError::Inconsistent`] and leaves the space
    /// untouched.
    pub fn remove(&mut self, block: Ipv4Net) -> IpamResult<()> {
        let block = block.trunc();
        let idx = self
            .blocks
            .iter()
            .position(|m| m.contains(&block))
            .ok_or(AllocationError::Inconsistent { block })?;

        let member = self.blocks.remove(idx);
        self.blocks.extend(carve_out(&member, &block));
        self.normalize();
        Ok(())
    }

    /// Every `/prefix_len` block that fits evenly inside a member, in
    /// ascending address order. Members narrower than the request
    /// contribute nothing.
    pub fn subdivide(&self, prefix_len: u8) -> IpamResult<Subdivide<'_>> {
        if prefix_len > MAX_PREFIX_LEN {
            return Err(AllocationError::InvalidPrefix(prefix_len));
        }
        Ok(Subdivide {
            members: self.blocks.iter(),
            current: None,
            prefix_len,
        })
    }

    /// Addresses covered by the candidates `subdivide(prefix_len)` yields
    pub fn capacity(&self, prefix_len: u8) -> u64 {
        if prefix_len > MAX_PREFIX_LEN {
            return 0;
        }
        self.blocks
            .iter()
            .filter(|m| m.prefix_len() <= prefix_len)
            .map(cidr::block_size)
            .sum()
    }

    fn normalize(&mut self) {
        let mut merged = Ipv4Net::aggregate(&self.blocks);
        merged.sort();
        self.blocks = merged;
    }
}

impl From<Vec<Ipv4Net>> for AddressSpace {
    fn from(blocks: Vec<Ipv4Net>) -> Self {
        Self::from_blocks(blocks)
    }
}

impl From<AddressSpace> for Vec<Ipv4Net> {
    fn from(space: AddressSpace) -> Self {
        space.blocks
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.blocks.iter().map(|b| b.to_string()).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Pieces of `container` left after cutting out `hole`.
/// `hole` must nest inside `container`.
fn carve_out(container: &Ipv4Net, hole: &Ipv4Net) -> Vec<Ipv4Net> {
    let mut pieces = Vec::new();
    let mut current = *container;

    while current.prefix_len() < hole.prefix_len() {
        let (low, high) = match cidr::split(&current) {
            Some(halves) => halves,
            None => break,
        };
        if low.contains(hole) {
            pieces.push(high);
            current = low;
        } else {
            pieces.push(low);
            current = high;
        }
    }

    pieces
}

/// Lazy candidate enumeration returned by [`AddressSpace::subdivide`].
/// Clone it to restart from the same point.
#[derive(Clone, Debug)]
pub struct Subdivide<'a> {
    members: std::slice::Iter<'a, Ipv4Net>,
    current: Option<Ipv4Subnets>,
    prefix_len: u8,
}

impl Iterator for Subdivide<'_> {
    type Item = Ipv4Net;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(subnets) = self.current.as_mut() {
                if let Some(candidate) = subnets.next() {
                    return Some(candidate);
                }
            }
            let member = self.members.next()?;
            self.current = member.subnets(self.prefix_len).ok();
        }
    }
}
