//! Provisioning lifecycle driver
//!
//! Create → plan the whole hierarchy, then commit it pool by pool.
//! Delete → acknowledge; blocks are not reclaimed.
//! Anything else → logged, no response.
//!
//! A failed create is reported as a failure for the whole request. Pools
//! committed before the failure are left in place.

use crate::backend::{CreatePoolRequest, PoolBackend};
use crate::error::{ProvisionError, ProvisionResult};
use crate::hierarchy::{HierarchicalProvisioner, HierarchySpec, PoolPlan};
use crate::readiness::{wait_until_ready, BackoffPolicy};
use async_trait::async_trait;
use parking_lot::Mutex;
use sase_ipam::{Ipv4Net, UsedSet, UtilizationAlert, UtilizationMonitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Signals and responses
// =============================================================================

/// External lifecycle signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleSignal {
    Create,
    Delete,
    /// Anything unrecognized, kept verbatim for logging
    Unknown(String),
}

impl LifecycleSignal {
    pub fn parse(request_type: &str) -> Self {
        match request_type {
            "Create" => Self::Create,
            "Delete" => Self::Delete,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Delete => write!(f, "Delete"),
            Self::Unknown(op) => write!(f, "{}", op),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Outcome reported back to whoever sent the signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub status: ResponseStatus,
    pub message: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResponderError {
    #[error("response rejected: {0}")]
    Rejected(String),
}

/// Two-outcome callback
#[async_trait]
pub trait LifecycleResponder: Send + Sync {
    async fn respond(&self, response: &LifecycleResponse) -> Result<(), ResponderError>;
}

/// Logs responses
#[derive(Debug, Default, Clone, Copy)]
pub struct LogResponder;

#[async_trait]
impl LifecycleResponder for LogResponder {
    async fn respond(&self, response: &LifecycleResponse) -> Result<(), ResponderError> {
        tracing::info!(status = ?response.status, "Sending {} to requester", response.message);
        Ok(())
    }
}

/// Keeps responses in memory (for testing and dry runs)
#[derive(Debug, Default)]
pub struct RecordingResponder {
    responses: Mutex<Vec<LifecycleResponse>>,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> Vec<LifecycleResponse> {
        self.responses.lock().clone()
    }
}

#[async_trait]
impl LifecycleResponder for RecordingResponder {
    async fn respond(&self, response: &LifecycleResponse) -> Result<(), ResponderError> {
        self.responses.lock().push(response.clone());
        Ok(())
    }
}

// =============================================================================
// Driver
// =============================================================================

/// One provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub signal: LifecycleSignal,
    pub spec: HierarchySpec,
    pub top_level_pool_id: String,
    pub top_used: UsedSet,
}

/// Pool created during commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedPool {
    pub pool_id: String,
    pub locale: String,
    /// `None` for region pools
    pub environment: Option<String>,
    pub block: Ipv4Net,
}

/// Result of a commit pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub pools: Vec<ProvisionedPool>,
    pub alerts_raised: usize,
    pub alerts_delivered: usize,
}

/// Applies lifecycle signals against a pool backend
pub struct ProvisioningDriver {
    backend: Arc<dyn PoolBackend>,
    monitor: UtilizationMonitor,
    responder: Arc<dyn LifecycleResponder>,
    backoff: BackoffPolicy,
}

impl ProvisioningDriver {
    pub fn new(
        backend: Arc<dyn PoolBackend>,
        monitor: UtilizationMonitor,
        responder: Arc<dyn LifecycleResponder>,
    ) -> Self {
        Self {
            backend,
            monitor,
            responder,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Handle one request. `Ok(None)` means the signal was not recognized
    /// and no response was sent.
    pub async fn handle(
        &self,
        request: &ProvisioningRequest,
    ) -> ProvisionResult<Option<ResponseStatus>> {
        match &request.signal {
            LifecycleSignal::Create => match self.create(request).await {
                Ok(report) => {
                    let message = format!(
                        "provisioned {} pools across {} regions",
                        report.pools.len(),
                        request.spec.regions.len()
                    );
                    let data = serde_json::to_value(&report).unwrap_or_default();
                    self.send(ResponseStatus::Success, message, data).await?;
                    Ok(Some(ResponseStatus::Success))
                }
                Err(e) => {
                    tracing::error!(error = %e, "create failed");
                    if let Err(send_err) = self
                        .send(ResponseStatus::Failed, e.to_string(), serde_json::Value::Null)
                        .await
                    {
                        tracing::error!(error = %send_err, "failure response not delivered");
                    }
                    Err(e)
                }
            },
            LifecycleSignal::Delete => {
                self.send(
                    ResponseStatus::Success,
                    "delete acknowledged, no pools reclaimed".to_string(),
                    serde_json::Value::Null,
                )
                .await?;
                Ok(Some(ResponseStatus::Success))
            }
            LifecycleSignal::Unknown(op) => {
                tracing::error!("Unknown operation: {}", op);
                Ok(None)
            }
        }
    }

    /// Plan then commit
    ///
    /// Alerts raised while planning are delivered whatever the outcome.
    pub async fn create(&self, request: &ProvisioningRequest) -> ProvisionResult<CommitReport> {
        let planned = HierarchicalProvisioner::new(request.spec.clone())
            .with_policy(self.monitor.policy())
            .plan(&request.top_used);
        match planned {
            Ok(plan) => self.commit(&plan, &request.top_level_pool_id).await,
            Err(e) => {
                self.deliver_alerts(e.pending_alerts()).await;
                Err(e)
            }
        }
    }

    /// Create and seed every pool in `plan`, strictly in order, then
    /// deliver the alerts the plan raised. Alerts go out even when a pool
    /// fails partway.
    pub async fn commit(
        &self,
        plan: &PoolPlan,
        top_level_pool_id: &str,
    ) -> ProvisionResult<CommitReport> {
        let created = self.create_pools(plan, top_level_pool_id).await;
        let alerts_delivered = self.deliver_alerts(&plan.alerts).await;

        Ok(CommitReport {
            pools: created?,
            alerts_raised: plan.alerts.len(),
            alerts_delivered,
        })
    }

    async fn create_pools(
        &self,
        plan: &PoolPlan,
        top_level_pool_id: &str,
    ) -> ProvisionResult<Vec<ProvisionedPool>> {
        let mut pools = Vec::with_capacity(plan.pool_count());

        for region in &plan.regions {
            tracing::info!(region = %region.region, block = %region.block, "creating region pool");
            let region_pool_id = self
                .create_seeded(
                    CreatePoolRequest::region(&region.region, top_level_pool_id),
                    region.block,
                )
                .await?;
            pools.push(ProvisionedPool {
                pool_id: region_pool_id.clone(),
                locale: region.region.clone(),
                environment: None,
                block: region.block,
            });

            for env in &region.environments {
                tracing::info!(
                    region = %region.region,
                    environment = %env.environment,
                    block = %env.block,
                    "creating environment pool"
                );
                let pool_id = self
                    .create_seeded(
                        CreatePoolRequest::environment(
                            &region.region,
                            &region_pool_id,
                            &env.environment,
                        ),
                        env.block,
                    )
                    .await?;
                pools.push(ProvisionedPool {
                    pool_id,
                    locale: region.region.clone(),
                    environment: Some(env.environment.clone()),
                    block: env.block,
                });
            }
        }

        Ok(pools)
    }

    /// Returns how many the sink accepted
    async fn deliver_alerts(&self, alerts: &[UtilizationAlert]) -> usize {
        let mut delivered = 0;
        for alert in alerts {
            if self.monitor.dispatch(alert).await {
                delivered += 1;
            }
        }
        delivered
    }

    async fn create_seeded(
        &self,
        request: CreatePoolRequest,
        block: Ipv4Net,
    ) -> ProvisionResult<String> {
        let handle = self.backend.create_pool(&request).await?;
        wait_until_ready(self.backend.as_ref(), &handle.pool_id, &self.backoff).await?;
        self.backend.provision_cidr(&handle.pool_id, block).await?;
        tracing::debug!(pool_id = %handle.pool_id, %block, "pool seeded");
        Ok(handle.pool_id)
    }

    async fn send(
        &self,
        status: ResponseStatus,
        message: String,
        data: serde_json::Value,
    ) -> Result<(), ProvisionError> {
        let response = LifecycleResponse {
            status,
            message,
            data,
        };
        self.responder.respond(&response).await?;
        Ok(())
    }
}
