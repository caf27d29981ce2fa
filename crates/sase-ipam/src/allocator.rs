//! Next-free-block selection
//!
//! Lowest-address-first: remove every used block from a working copy of
//! the scope, subdivide what is left into candidates of the requested
//! size, take the first one. Same inputs always give the same block.

use crate::cidr::{self, MAX_PREFIX_LEN};
use crate::error::{AllocationError, IpamResult};
use crate::monitor;
use crate::space::AddressSpace;
use crate::used::UsedSet;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// One allocation request against a scope
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationRequest {
    /// Space to carve from
    pub scope: AddressSpace,
    /// Blocks already handed out inside `scope`
    pub used: UsedSet,
    /// Size of the block wanted
    pub prefix_len: u8,
}

impl AllocationRequest {
    /// Request a `/prefix_len` block from `scope`
    pub fn new(scope: AddressSpace, used: UsedSet, prefix_len: u8) -> Self {
        Self { scope, used, prefix_len }
    }
}

/// Selected block plus the sizes the utilization check needs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Chosen block
    pub block: Ipv4Net,
    /// Addresses in the unreduced scope
    pub total_size: u64,
    /// Addresses still available as requested-size candidates, including `block`
    pub free_size: u64,
}

impl Allocation {
    /// Percentage of the scope consumed before this selection
    pub fn used_percent(&self) -> u8 {
        monitor::used_percent(self.total_size, self.free_size)
    }
}

/// Allocate one block for `request`
pub fn allocate(request: &AllocationRequest) -> IpamResult<Allocation> {
    allocate_from(&request.scope, request.used.as_slice(), request.prefix_len)
}

/// Lowest free `/prefix_len` block of `space` not covered by `used`
pub fn select_free_block(
    space: &AddressSpace,
    used: &[Ipv4Net],
    prefix_len: u8,
) -> IpamResult<Ipv4Net> {
    allocate_from(space, used, prefix_len).map(|a| a.block)
}

/// String-level entry point: supernets and used blocks in, CIDR out
pub fn select_free_cidr<S: AsRef<str>>(
    supernets: &[S],
    used: &[S],
    prefix_len: u8,
) -> IpamResult<String> {
    let space = AddressSpace::from_cidrs(supernets)?;
    let used = cidr::parse_blocks(used)?;
    select_free_block(&space, &used, prefix_len).map(|b| b.to_string())
}

/// What remains of `space` once `used` is removed
pub fn free_space(space: &AddressSpace, used: &[Ipv4Net]) -> IpamResult<AddressSpace> {
    let mut working = space.clone();
    for block in used {
        working.remove(*block)?;
    }
    Ok(working)
}

/// Borrowing form of [`allocate`]
pub fn allocate_from(
    space: &AddressSpace,
    used: &[Ipv4Net],
    prefix_len: u8,
) -> IpamResult<Allocation> {
    if prefix_len > MAX_PREFIX_LEN {
        return Err(AllocationError::InvalidPrefix(prefix_len));
    }
    if let Some(widest) = space.widest_prefix_len() {
        if prefix_len < widest {
            return Err(AllocationError::PrefixTooShort {
                requested: prefix_len,
                container: widest,
            });
        }
    }

    let total_size = space.size();
    let working = free_space(space, used)?;
    let free_size = working.capacity(prefix_len);

    let block = working
        .subdivide(prefix_len)?
        .next()
        .ok_or(AllocationError::Exhausted { prefix_len })?;

    tracing::debug!(
        %block,
        used = used.len(),
        total_size,
        free_size,
        "selected free block"
    );

    Ok(Allocation {
        block,
        total_size,
        free_size,
    })
}
