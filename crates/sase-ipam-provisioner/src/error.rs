//! Error types for pool provisioning

use crate::backend::BackendError;
use crate::lifecycle::ResponderError;
use sase_ipam::{AllocationError, UtilizationAlert};
use thiserror::Error;

/// Provisioning error type
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Allocation failed while carving `scope`. Fatal to the whole request.
    ///
    /// `alerts` holds the utilization alerts raised by the run up to and
    /// including the failing carve; they still have to be delivered.
    #[error("allocation failed for {scope}: {source}")]
    Allocation {
        scope: String,
        #[source]
        source: AllocationError,
        alerts: Vec<UtilizationAlert>,
    },

    /// Pool backend call failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Pool never reached the ready state
    #[error("pool {pool_id} not ready after {attempts} attempts")]
    NotReady { pool_id: String, attempts: u32 },

    /// Pool reported a terminal failure while waiting for it
    #[error("pool {pool_id} failed: {reason}")]
    PoolFailed { pool_id: String, reason: String },

    /// Lifecycle responder rejected the outcome
    #[error("responder error: {0}")]
    Responder(#[from] ResponderError),
}

impl ProvisionError {
    pub(crate) fn allocation(scope: impl Into<String>, source: AllocationError) -> Self {
        Self::Allocation {
            scope: scope.into(),
            source,
            alerts: Vec::new(),
        }
    }

    /// Attach the alerts raised before this error
    pub(crate) fn with_alerts(mut self, raised: Vec<UtilizationAlert>) -> Self {
        if let Self::Allocation { alerts, .. } = &mut self {
            *alerts = raised;
        }
        self
    }

    /// Alerts raised by the failed run that still need delivering
    pub fn pending_alerts(&self) -> &[UtilizationAlert] {
        match self {
            Self::Allocation { alerts, .. } => alerts,
            _ => &[],
        }
    }

    /// Underlying allocation error, if this is one
    pub fn allocation_error(&self) -> Option<&AllocationError> {
        match self {
            Self::Allocation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for provisioning
pub type ProvisionResult<T> = Result<T, ProvisionError>;
