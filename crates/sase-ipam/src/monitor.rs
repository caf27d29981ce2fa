//! Pool Utilization Monitoring
//!
//! Advisory exhaustion warnings. An alert is raised when the used share of
//! a scope goes above the threshold (80% by default). Delivery goes to an
//! [`AlertSink`] and is best effort: a failed delivery is logged and never
//! fails the allocation that triggered it.

use crate::allocator::Allocation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default alert threshold in percent
pub const DEFAULT_THRESHOLD_PERCENT: u8 = 80;

/// Subject line used for every exhaustion alert
pub const ALERT_SUBJECT: &str = "WARNING free CIDR ranges running low";

/// `round(100 - free/total * 100)`, clamped to 0..=100.
///
/// An empty scope counts as fully used.
pub fn used_percent(total_size: u64, free_size: u64) -> u8 {
    if total_size == 0 {
        return 100;
    }
    let used = total_size - free_size.min(total_size);
    // Integer round-half-up of used * 100 / total
    let pct = (used as u128 * 200 + total_size as u128) / (total_size as u128 * 2);
    pct.min(100) as u8
}

// =============================================================================
// Alerts
// =============================================================================

/// Exhaustion alert for one (region, environment) scope
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilizationAlert {
    /// Share of the scope in use, 0..=100
    pub used_percent: u8,
    /// Region the scope belongs to
    pub region: String,
    /// Environment name, or a scope label for region-level alerts
    pub environment: String,
    /// When the threshold check fired
    pub raised_at: DateTime<Utc>,
}

impl UtilizationAlert {
    /// Alert stamped with the current time
    pub fn new(used_percent: u8, region: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            used_percent,
            region: region.into(),
            environment: environment.into(),
            raised_at: Utc::now(),
        }
    }

    /// Human-readable body
    pub fn message(&self) -> String {
        format!(
            "WARNING: {} in region {} has used {}% of available CIDR addresses",
            self.environment, self.region, self.used_percent
        )
    }

    /// Subject line for mail-style sinks
    pub fn subject(&self) -> &'static str {
        ALERT_SUBJECT
    }
}

/// Alert delivery error
#[derive(Debug, Clone, thiserror::Error)]
pub enum AlertError {
    /// Sink could not accept the alert
    #[error("alert delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Notification sink for exhaustion alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert
    async fn deliver(&self, alert: &UtilizationAlert) -> Result<(), AlertError>;
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, alert: &UtilizationAlert) -> Result<(), AlertError> {
        tracing::warn!(
            region = %alert.region,
            environment = %alert.environment,
            used_percent = alert.used_percent,
            "{}",
            alert.message()
        );
        Ok(())
    }
}

/// Keeps delivered alerts in memory (for testing and dry runs)
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    delivered: Mutex<Vec<UtilizationAlert>>,
    fail: bool,
}

impl RecordingAlertSink {
    /// Sink that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects every delivery
    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Alerts accepted so far
    pub fn delivered(&self) -> Vec<UtilizationAlert> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn deliver(&self, alert: &UtilizationAlert) -> Result<(), AlertError> {
        if self.fail {
            return Err(AlertError::DeliveryFailed("sink unavailable".into()));
        }
        self.delivered.lock().push(alert.clone());
        Ok(())
    }
}

// =============================================================================
// Threshold policy
// =============================================================================

/// Pure threshold check, no delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// Alert when usage goes above this percentage
    pub threshold_percent: u8,
}

impl ThresholdPolicy {
    /// Policy alerting above `threshold_percent`
    pub fn new(threshold_percent: u8) -> Self {
        Self { threshold_percent }
    }

    /// Strictly greater than the threshold alerts
    pub fn exceeded(&self, used_percent: u8) -> bool {
        used_percent > self.threshold_percent
    }

    /// Alert for a scope of `total_size` addresses with `free_size` left, if over the threshold
    pub fn evaluate(
        &self,
        total_size: u64,
        free_size: u64,
        region: &str,
        environment: &str,
    ) -> Option<UtilizationAlert> {
        let pct = used_percent(total_size, free_size);
        self.exceeded(pct)
            .then(|| UtilizationAlert::new(pct, region, environment))
    }

    /// [`evaluate`](Self::evaluate) for an allocation result
    pub fn evaluate_allocation(
        &self,
        allocation: &Allocation,
        region: &str,
        environment: &str,
    ) -> Option<UtilizationAlert> {
        self.evaluate(allocation.total_size, allocation.free_size, region, environment)
    }

    /// Alert for a scope that has no free block left
    pub fn evaluate_exhausted(
        &self,
        total_size: u64,
        region: &str,
        environment: &str,
    ) -> Option<UtilizationAlert> {
        self.evaluate(total_size, 0, region, environment)
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PERCENT)
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Threshold policy bound to a delivery sink
pub struct UtilizationMonitor {
    policy: ThresholdPolicy,
    sink: Arc<dyn AlertSink>,
}

impl UtilizationMonitor {
    /// Monitor with the default 80% threshold
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            policy: ThresholdPolicy::default(),
            sink,
        }
    }

    /// Replace the threshold
    pub fn with_threshold(mut self, threshold_percent: u8) -> Self {
        self.policy = ThresholdPolicy::new(threshold_percent);
        self
    }

    /// Threshold policy in use
    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    /// Evaluate and deliver. Returns the alert that was raised, whether or
    /// not delivery succeeded.
    pub async fn check_utilization(
        &self,
        total_size: u64,
        free_size: u64,
        region: &str,
        environment: &str,
    ) -> Option<UtilizationAlert> {
        let alert = self.policy.evaluate(total_size, free_size, region, environment)?;
        self.dispatch(&alert).await;
        Some(alert)
    }

    /// Same as [`check_utilization`](Self::check_utilization) for an allocation result
    pub async fn observe(
        &self,
        allocation: &Allocation,
        region: &str,
        environment: &str,
    ) -> Option<UtilizationAlert> {
        self.check_utilization(allocation.total_size, allocation.free_size, region, environment)
            .await
    }

    /// Report a scope that came back exhausted
    pub async fn observe_exhausted(
        &self,
        total_size: u64,
        region: &str,
        environment: &str,
    ) -> Option<UtilizationAlert> {
        self.check_utilization(total_size, 0, region, environment).await
    }

    /// Deliver an already-evaluated alert. Returns false if the sink failed.
    pub async fn dispatch(&self, alert: &UtilizationAlert) -> bool {
        match self.sink.deliver(alert).await {
            Ok(()) => {
                tracing::debug!(
                    region = %alert.region,
                    environment = %alert.environment,
                    used_percent = alert.used_percent,
                    "utilization alert delivered"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    region = %alert.region,
                    environment = %alert.environment,
                    error = %e,
                    "utilization alert not delivered"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_percent() {
        assert_eq!(used_percent(1000, 150), 85);
        assert_eq!(used_percent(100, 20), 80);
        assert_eq!(used_percent(100, 19), 81);
        assert_eq!(used_percent(100, 100), 0);
        assert_eq!(used_percent(100, 0), 100);
        assert_eq!(used_percent(0, 0), 100);
        // Rounds half up
        assert_eq!(used_percent(200, 101), 50);
        assert_eq!(used_percent(1000, 995), 1);
    }

    #[test]
    fn test_threshold_boundary() {
        let policy = ThresholdPolicy::default();
        assert!(!policy.exceeded(80));
        assert!(policy.exceeded(81));
        assert!(policy.evaluate(100, 20, "us-east-1", "prod").is_none());
        assert!(policy.evaluate(100, 19, "us-east-1", "prod").is_some());
    }

    #[test]
    fn test_alert_message_fields() {
        let alert = ThresholdPolicy::default()
            .evaluate(1000, 150, "eu-west-1", "staging")
            .unwrap();

        assert_eq!(alert.used_percent, 85);
        let message = alert.message();
        assert!(message.contains("85"));
        assert!(message.contains("eu-west-1"));
        assert!(message.contains("staging"));
        assert_eq!(alert.subject(), ALERT_SUBJECT);
    }

    #[test]
    fn test_evaluate_allocation() {
        let allocation = Allocation {
            block: "10.0.0.0/24".parse().unwrap(),
            total_size: 1024,
            free_size: 256,
        };
        let alert = ThresholdPolicy::new(70)
            .evaluate_allocation(&allocation, "ap-southeast-2", "dev")
            .unwrap();
        assert_eq!(alert.used_percent, 75);
    }

    #[tokio::test]
    async fn test_monitor_delivers_over_threshold() {
        let sink = Arc::new(RecordingAlertSink::new());
        let monitor = UtilizationMonitor::new(sink.clone());

        assert!(monitor.check_utilization(1000, 500, "us-west-2", "prod").await.is_none());
        let alert = monitor.check_utilization(1000, 150, "us-west-2", "prod").await;

        assert_eq!(alert.map(|a| a.used_percent), Some(85));
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_not_fatal() {
        let monitor = UtilizationMonitor::new(Arc::new(RecordingAlertSink::failing()));

        let alert = monitor.check_utilization(1000, 10, "us-west-2", "prod").await;
        assert_eq!(alert.as_ref().map(|a| a.used_percent), Some(99));
        assert!(!monitor.dispatch(&alert.unwrap()).await);
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let sink = Arc::new(RecordingAlertSink::new());
        let monitor = UtilizationMonitor::new(sink.clone()).with_threshold(50);

        monitor.check_utilization(100, 40, "r", "e").await;
        assert_eq!(sink.delivered()[0].used_percent, 60);
        assert_eq!(monitor.policy().threshold_percent, 50);
    }

    #[tokio::test]
    async fn test_exhausted_scope_alerts_at_full() {
        let sink = Arc::new(RecordingAlertSink::new());
        let monitor = UtilizationMonitor::new(sink.clone());

        let alert = monitor.observe_exhausted(4096, "us-east-1", "dev").await.unwrap();
        assert_eq!(alert.used_percent, 100);
        assert_eq!(sink.delivered(), vec![alert]);

        // A 100% threshold never fires, even on exhaustion
        assert!(ThresholdPolicy::new(100).evaluate_exhausted(4096, "r", "e").is_none());
    }

    #[tokio::test]
    async fn test_log_sink_accepts() {
        let alert = UtilizationAlert::new(90, "us-east-1", "prod");
        assert!(LogAlertSink.deliver(&alert).await.is_ok());
    }
}
