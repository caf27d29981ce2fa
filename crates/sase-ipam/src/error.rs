//! Error types for IPAM allocation

use ipnet::Ipv4Net;
use thiserror::Error;

/// Allocation error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Input could not be parsed as an IPv4 block
    #[error("invalid CIDR block: {0}")]
    InvalidCidr(String),

    /// Prefix length outside 0..=32
    #[error("invalid prefix length: /{0}")]
    InvalidPrefix(u8),

    /// Requested block is larger than every container in scope
    #[error("requested /{requested} is larger than the widest block in scope (/{container})")]
    PrefixTooShort {
        /// Requested prefix length
        requested: u8,
        /// Prefix length of the widest block in scope
        container: u8,
    },

    /// Used block does not nest inside the working space.
    /// Points at stale or corrupted tracking data.
    #[error("used block {block} does not nest inside the address space")]
    Inconsistent {
        /// Offending used block
        block: Ipv4Net,
    },

    /// No free block of the requested size remains
    #[error("no free /{prefix_len} block remains in the address space")]
    Exhausted {
        /// Requested prefix length
        prefix_len: u8,
    },
}

impl AllocationError {
    /// Capacity condition rather than a data problem
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Result type for IPAM allocation
pub type IpamResult<T> = Result<T, AllocationError>;
