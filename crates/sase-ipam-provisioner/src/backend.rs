//! IPAM pool backend
//!
//! External collaborator that owns the actual pool resources. Calls are
//! network-bound and slow; the driver serializes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sase_ipam::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Tag key carrying the environment name on environment pools
pub const ENV_TAG: &str = "Env";

/// Request to create one pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePoolRequest {
    /// Region the pool is usable in
    pub locale: String,
    /// Parent pool the CIDR is drawn from
    pub source_pool_id: String,
    /// Allocation resource tags
    pub tags: BTreeMap<String, String>,
}

impl CreatePoolRequest {
    /// Region-level pool drawn from the top-level pool
    pub fn region(locale: impl Into<String>, source_pool_id: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            source_pool_id: source_pool_id.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Environment pool drawn from a region pool, tagged with the environment
    pub fn environment(
        locale: impl Into<String>,
        source_pool_id: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(ENV_TAG.to_string(), environment.into());
        Self {
            locale: locale.into(),
            source_pool_id: source_pool_id.into(),
            tags,
        }
    }

    pub fn environment_tag(&self) -> Option<&str> {
        self.tags.get(ENV_TAG).map(String::as_str)
    }
}

/// Handle returned on creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHandle {
    pub pool_id: String,
    pub locale: String,
}

/// Pool lifecycle state as reported by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    Pending,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Pool resource backend
#[async_trait]
pub trait PoolBackend: Send + Sync {
    /// Create a pool; it starts out pending
    async fn create_pool(&self, request: &CreatePoolRequest) -> Result<PoolHandle, BackendError>;

    /// Current state of a pool
    async fn pool_state(&self, pool_id: &str) -> Result<PoolState, BackendError>;

    /// Seed a ready pool with a CIDR block
    async fn provision_cidr(&self, pool_id: &str, block: Ipv4Net) -> Result<(), BackendError>;
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Stored pool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolRecord {
    pub handle: PoolHandle,
    pub request: CreatePoolRequest,
    pub state: PoolState,
    /// State polls seen so far
    pub polls: u32,
    pub cidrs: Vec<Ipv4Net>,
    pub created_at: DateTime<Utc>,
}

/// In-memory pool backend (for testing and dry runs)
pub struct InMemoryPoolBackend {
    pools: RwLock<HashMap<String, PoolRecord>>,
    /// Creation order, for stable listing
    order: RwLock<Vec<String>>,
    polls_until_ready: u32,
    create_limit: Option<usize>,
}

impl InMemoryPoolBackend {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            polls_until_ready: 1,
            create_limit: None,
        }
    }

    /// Pools report pending until polled this many times
    pub fn with_polls_until_ready(mut self, polls: u32) -> Self {
        self.polls_until_ready = polls.max(1);
        self
    }

    /// Reject creations once `limit` pools exist
    pub fn with_create_limit(mut self, limit: usize) -> Self {
        self.create_limit = Some(limit);
        self
    }

    /// Register an externally managed, already ready pool (e.g. the top-level pool)
    pub fn register_ready_pool(&self, pool_id: &str, locale: &str, cidrs: Vec<Ipv4Net>) {
        let record = PoolRecord {
            handle: PoolHandle {
                pool_id: pool_id.to_string(),
                locale: locale.to_string(),
            },
            request: CreatePoolRequest::region(locale, ""),
            state: PoolState::Ready,
            polls: 0,
            cidrs,
            created_at: Utc::now(),
        };
        self.pools.write().insert(pool_id.to_string(), record);
    }

    /// Force a pool into the failed state
    pub fn fail_pool(&self, pool_id: &str, reason: &str) {
        if let Some(record) = self.pools.write().get_mut(pool_id) {
            record.state = PoolState::Failed(reason.to_string());
        }
    }

    pub fn pool(&self, pool_id: &str) -> Option<PoolRecord> {
        self.pools.read().get(pool_id).cloned()
    }

    /// Pools created through this backend, in creation order
    pub fn created_pools(&self) -> Vec<PoolRecord> {
        let pools = self.pools.read();
        self.order
            .read()
            .iter()
            .filter_map(|id| pools.get(id).cloned())
            .collect()
    }
}

impl Default for InMemoryPoolBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolBackend for InMemoryPoolBackend {
    async fn create_pool(&self, request: &CreatePoolRequest) -> Result<PoolHandle, BackendError> {
        if let Some(limit) = self.create_limit {
            if self.order.read().len() >= limit {
                return Err(BackendError::Rejected(format!("pool limit {} reached", limit)));
            }
        }

        let handle = PoolHandle {
            pool_id: format!("ipam-pool-{}", Uuid::new_v4().simple()),
            locale: request.locale.clone(),
        };
        let record = PoolRecord {
            handle: handle.clone(),
            request: request.clone(),
            state: PoolState::Pending,
            polls: 0,
            cidrs: Vec::new(),
            created_at: Utc::now(),
        };

        self.pools.write().insert(handle.pool_id.clone(), record);
        self.order.write().push(handle.pool_id.clone());
        Ok(handle)
    }

    async fn pool_state(&self, pool_id: &str) -> Result<PoolState, BackendError> {
        let mut pools = self.pools.write();
        let record = pools
            .get_mut(pool_id)
            .ok_or_else(|| BackendError::PoolNotFound(pool_id.to_string()))?;

        record.polls += 1;
        if record.state == PoolState::Pending && record.polls >= self.polls_until_ready {
            record.state = PoolState::Ready;
        }
        Ok(record.state.clone())
    }

    async fn provision_cidr(&self, pool_id: &str, block: Ipv4Net) -> Result<(), BackendError> {
        let mut pools = self.pools.write();

        let source_id = {
            let record = pools
                .get(pool_id)
                .ok_or_else(|| BackendError::PoolNotFound(pool_id.to_string()))?;
            if record.state != PoolState::Ready {
                return Err(BackendError::Rejected(format!("pool {} is not ready", pool_id)));
            }
            record.request.source_pool_id.clone()
        };

        // Block must come out of the parent when the parent is known here
        if let Some(source) = pools.get(&source_id) {
            if !source.cidrs.is_empty() && !source.cidrs.iter().any(|c| c.contains(&block)) {
                return Err(BackendError::Rejected(format!(
                    "{} is outside source pool {}",
                    block, source_id
                )));
            }
        }

        if let Some(record) = pools.get_mut(pool_id) {
            record.cidrs.push(block);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_provision() {
        let backend = InMemoryPoolBackend::new();
        let handle = backend
            .create_pool(&CreatePoolRequest::environment("us-east-1", "root", "prod"))
            .await
            .unwrap();

        assert!(handle.pool_id.starts_with("ipam-pool-"));
        assert_eq!(backend.pool_state(&handle.pool_id).await.unwrap(), PoolState::Ready);

        backend.provision_cidr(&handle.pool_id, net("10.0.0.0/20")).await.unwrap();
        let record = backend.pool(&handle.pool_id).unwrap();
        assert_eq!(record.cidrs, vec![net("10.0.0.0/20")]);
        assert_eq!(record.request.environment_tag(), Some("prod"));
    }

    #[tokio::test]
    async fn test_provision_requires_ready() {
        let backend = InMemoryPoolBackend::new().with_polls_until_ready(2);
        let handle = backend
            .create_pool(&CreatePoolRequest::region("us-east-1", "root"))
            .await
            .unwrap();

        let err = backend.provision_cidr(&handle.pool_id, net("10.0.0.0/16")).await;
        assert!(matches!(err, Err(BackendError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_provision_checks_source_pool() {
        let backend = InMemoryPoolBackend::new();
        backend.register_ready_pool("root", "us-east-1", vec![net("10.0.0.0/8")]);

        let handle = backend
            .create_pool(&CreatePoolRequest::region("us-east-1", "root"))
            .await
            .unwrap();
        backend.pool_state(&handle.pool_id).await.unwrap();

        assert!(backend.provision_cidr(&handle.pool_id, net("172.16.0.0/16")).await.is_err());
        assert!(backend.provision_cidr(&handle.pool_id, net("10.4.0.0/16")).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_limit() {
        let backend = InMemoryPoolBackend::new().with_create_limit(1);
        let request = CreatePoolRequest::region("us-east-1", "root");

        backend.create_pool(&request).await.unwrap();
        assert!(matches!(
            backend.create_pool(&request).await,
            Err(BackendError::Rejected(_))
        ));
        assert_eq!(backend.created_pools().len(), 1);
    }
}
