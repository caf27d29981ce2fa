//! Pool readiness polling
//!
//! Newly created pools start out pending. Poll their state with bounded
//! attempts and exponential backoff instead of sleeping a fixed interval.

use crate::backend::{PoolBackend, PoolState};
use crate::error::{ProvisionError, ProvisionResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Backoff settings for readiness polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Polls before giving up
    pub max_attempts: u32,
    /// Delay after the first pending poll
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    /// Delay after poll number `attempt` (zero based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(5);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Poll `pool_id` until the backend reports it ready
pub async fn wait_until_ready(
    backend: &dyn PoolBackend,
    pool_id: &str,
    policy: &BackoffPolicy,
) -> ProvisionResult<()> {
    for attempt in 0..policy.max_attempts {
        match backend.pool_state(pool_id).await? {
            PoolState::Ready => {
                tracing::debug!(pool_id, attempt, "pool ready");
                return Ok(());
            }
            PoolState::Failed(reason) => {
                return Err(ProvisionError::PoolFailed {
                    pool_id: pool_id.to_string(),
                    reason,
                });
            }
            PoolState::Pending => {
                if attempt + 1 < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(pool_id, attempt, ?delay, "pool pending, backing off");
                    sleep(delay).await;
                }
            }
        }
    }

    tracing::warn!(pool_id, attempts = policy.max_attempts, "pool never became ready");
    Err(ProvisionError::NotReady {
        pool_id: pool_id.to_string(),
        attempts: policy.max_attempts,
    })
}
