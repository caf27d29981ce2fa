//! OpenSASE IPAM Allocator
//!
//! Carves IPv4 supernets into fixed-size blocks and warns before a pool
//! runs dry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        IPAM ALLOCATOR                           │
//! │                                                                 │
//! │   supernet CIDRs        used CIDRs          prefix length       │
//! │        │                    │                     │             │
//! │        ▼                    ▼                     │             │
//! │  ┌────────────┐   remove  ┌──────────┐            │             │
//! │  │AddressSpace│◄──────────│ UsedSet  │            │             │
//! │  └─────┬──────┘           └──────────┘            │             │
//! │        │ subdivide(prefix) ◄──────────────────────┘             │
//! │        ▼                                                        │
//! │  ┌────────────┐  lowest address first  ┌───────────────────┐    │
//! │  │ Candidates │───────────────────────►│    Allocation     │    │
//! │  └────────────┘                        └─────────┬─────────┘    │
//! │                                                  │              │
//! │                                                  ▼              │
//! │                                      ┌───────────────────────┐  │
//! │                                      │  UtilizationMonitor   │  │
//! │                                      │  (> 80% → AlertSink)  │  │
//! │                                      └───────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use sase_ipam::select_free_cidr;
//!
//! let next = select_free_cidr(&["10.0.0.0/16"], &["10.0.0.0/20"], 20).unwrap();
//! assert_eq!(next, "10.0.16.0/20");
//! ```

#![warn(missing_docs)]

pub mod allocator;
pub mod cidr;
pub mod error;
pub mod monitor;
pub mod space;
pub mod used;

pub use allocator::{
    allocate, allocate_from, free_space, select_free_block, select_free_cidr, Allocation,
    AllocationRequest,
};
pub use cidr::{block_size, parse_block, parse_blocks};
pub use error::{AllocationError, IpamResult};
pub use monitor::{
    used_percent, AlertError, AlertSink, LogAlertSink, RecordingAlertSink, ThresholdPolicy,
    UtilizationAlert, UtilizationMonitor, DEFAULT_THRESHOLD_PERCENT,
};
pub use space::{AddressSpace, Subdivide};
pub use used::UsedSet;

/// Re-exported block type
pub use ipnet::Ipv4Net;
