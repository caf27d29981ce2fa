//! CIDR block helpers
//!
//! Blocks are plain [`Ipv4Net`] values. Everything entering the allocator
//! goes through [`parse_block`] so host bits are always truncated.

use crate::error::{AllocationError, IpamResult};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Longest IPv4 prefix
pub const MAX_PREFIX_LEN: u8 = 32;

/// Parse a CIDR string. A bare address is treated as a /32.
pub fn parse_block(input: &str) -> IpamResult<Ipv4Net> {
    let trimmed = input.trim();
    let net = if trimmed.contains('/') {
        trimmed
            .parse::<Ipv4Net>()
            .map_err(|_| AllocationError::InvalidCidr(trimmed.to_string()))?
    } else {
        let addr: Ipv4Addr = trimmed
            .parse()
            .map_err(|_| AllocationError::InvalidCidr(trimmed.to_string()))?;
        Ipv4Net::from(addr)
    };
    Ok(net.trunc())
}

/// Parse a list of CIDR strings, failing on the first bad entry
pub fn parse_blocks<I, S>(inputs: I) -> IpamResult<Vec<Ipv4Net>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    inputs.into_iter().map(|s| parse_block(s.as_ref())).collect()
}

/// Number of addresses covered by a block
pub fn block_size(net: &Ipv4Net) -> u64 {
    1u64 << (MAX_PREFIX_LEN - net.prefix_len())
}

/// True if the two blocks share at least one address
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Split a block into its two halves. `None` for a /32.
pub(crate) fn split(net: &Ipv4Net) -> Option<(Ipv4Net, Ipv4Net)> {
    if net.prefix_len() >= MAX_PREFIX_LEN {
        return None;
    }
    let child_len = net.prefix_len() + 1;
    let base = u32::from(net.network());
    let half = 1u32 << (MAX_PREFIX_LEN - child_len);

    let low = Ipv4Net::new(Ipv4Addr::from(base), child_len).ok()?;
    let high = Ipv4Net::new(Ipv4Addr::from(base + half), child_len).ok()?;
    Some((low, high))
}
