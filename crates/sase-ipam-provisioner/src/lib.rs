//! OpenSASE IPAM Pool Provisioner
//!
//! Builds the region → environment pool hierarchy on top of the
//! allocator in `sase-ipam`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      POOL PROVISIONER                            │
//! │                                                                  │
//! │  LifecycleSignal ──► ProvisioningDriver ──► LifecycleResponder   │
//! │  (Create/Delete)            │               (SUCCESS / FAILED)   │
//! │                             │                                    │
//! │            ┌────────────────┴─────────────────┐                  │
//! │            ▼                                  ▼                  │
//! │  ┌───────────────────────┐ PoolPlan ┌──────────────────┐         │
//! │  │HierarchicalProvisioner│─────────►│  commit          │         │
//! │  │  plan (dry run)       │          │  create_pool     │         │
//! │  │  region  /16          │          │  wait_until_ready│         │
//! │  │   └─ env /20          │          │  provision_cidr  │         │
//! │  └───────────────────────┘          └────────┬─────────┘         │
//! │                                              │                   │
//! │                                              ▼                   │
//! │                                      ┌──────────────┐            │
//! │                                      │ PoolBackend  │            │
//! │                                      └──────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod readiness;

pub use backend::{
    BackendError, CreatePoolRequest, InMemoryPoolBackend, PoolBackend, PoolHandle, PoolRecord,
    PoolState, ENV_TAG,
};
pub use config::{ConfigError, ProvisionerConfig};
pub use error::{ProvisionError, ProvisionResult};
pub use hierarchy::{
    EnvironmentPlan, HierarchicalProvisioner, HierarchySpec, PoolPlan, RegionPlan,
    REGION_SCOPE_LABEL,
};
pub use lifecycle::{
    CommitReport, LifecycleResponder, LifecycleResponse, LifecycleSignal, LogResponder,
    ProvisionedPool, ProvisioningDriver, ProvisioningRequest, RecordingResponder,
    ResponderError, ResponseStatus,
};
pub use readiness::{wait_until_ready, BackoffPolicy};
