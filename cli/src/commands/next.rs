//! Next free block

use super::ConsoleAlertSink;
use crate::output::OutputFormat;
use sase_ipam::{allocate_from, AddressSpace, UsedSet, UtilizationMonitor};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

pub struct NextArgs {
    pub supernets: Vec<String>,
    pub used: Vec<String>,
    pub prefix: u8,
    pub region: String,
    pub environment: String,
    pub threshold: u8,
}

#[derive(Debug, Serialize, Tabled)]
pub struct AllocationRow {
    pub cidr: String,
    pub total: u64,
    pub free: u64,
    pub used_percent: u8,
    pub alert: bool,
}

/// Select the block and run the utilization check. An exhausted scope is
/// reported to `monitor` as fully used before the error is returned.
pub async fn select(args: &NextArgs, monitor: &UtilizationMonitor) -> anyhow::Result<AllocationRow> {
    let space = AddressSpace::from_cidrs(&args.supernets)?;
    let used = UsedSet::from_cidrs(&args.used)?;

    let allocation = match allocate_from(&space, used.as_slice(), args.prefix) {
        Ok(allocation) => allocation,
        Err(e) => {
            if e.is_exhausted() {
                monitor
                    .observe_exhausted(space.size(), &args.region, &args.environment)
                    .await;
            }
            return Err(e.into());
        }
    };

    let alert = monitor
        .observe(&allocation, &args.region, &args.environment)
        .await;

    Ok(AllocationRow {
        cidr: allocation.block.to_string(),
        total: allocation.total_size,
        free: allocation.free_size,
        used_percent: allocation.used_percent(),
        alert: alert.is_some(),
    })
}

pub async fn handle(args: NextArgs, format: OutputFormat) -> anyhow::Result<()> {
    let monitor = UtilizationMonitor::new(Arc::new(ConsoleAlertSink)).with_threshold(args.threshold);
    let row = select(&args, &monitor).await?;
    format.print_rows(&[row]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sase_ipam::{AllocationError, RecordingAlertSink};

    fn args(supernets: &[&str], used: &[&str], prefix: u8) -> NextArgs {
        NextArgs {
            supernets: supernets.iter().map(|s| s.to_string()).collect(),
            used: used.iter().map(|s| s.to_string()).collect(),
            prefix,
            region: "us-east-1".into(),
            environment: "prod".into(),
            threshold: 80,
        }
    }

    #[tokio::test]
    async fn test_next_block_after_used() {
        let sink = Arc::new(RecordingAlertSink::new());
        let monitor = UtilizationMonitor::new(sink.clone());

        let row = select(&args(&["10.0.0.0/16"], &[], 20), &monitor).await.unwrap();
        assert_eq!(row.cidr, "10.0.0.0/20");

        let row = select(&args(&["10.0.0.0/16"], &["10.0.0.0/20"], 20), &monitor)
            .await
            .unwrap();
        assert_eq!(row.cidr, "10.0.16.0/20");
        assert_eq!(row.total, 65_536);
        assert_eq!(row.free, 61_440);
        assert_eq!(row.used_percent, 6);
        assert!(!row.alert);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_alert_over_threshold() {
        let sink = Arc::new(RecordingAlertSink::new());
        let monitor = UtilizationMonitor::new(sink.clone());
        let used: Vec<String> = (0..13).map(|i| format!("10.0.{}.0/20", i * 16)).collect();
        let used_refs: Vec<&str> = used.iter().map(String::as_str).collect();

        let row = select(&args(&["10.0.0.0/16"], &used_refs, 20), &monitor)
            .await
            .unwrap();
        assert_eq!(row.cidr, "10.0.208.0/20");
        assert_eq!(row.used_percent, 81);
        assert!(row.alert);
        assert_eq!(sink.delivered()[0].region, "us-east-1");
    }

    #[tokio::test]
    async fn test_exhausted_scope_alerts_then_fails() {
        let sink = Arc::new(RecordingAlertSink::new());
        let monitor = UtilizationMonitor::new(sink.clone());

        let err = select(&args(&["10.0.0.0/24"], &["10.0.0.0/24"], 24), &monitor)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<AllocationError>(),
            Some(&AllocationError::Exhausted { prefix_len: 24 })
        );
        assert_eq!(sink.delivered()[0].used_percent, 100);
    }

    #[tokio::test]
    async fn test_bad_cidr_is_rejected() {
        let monitor = UtilizationMonitor::new(Arc::new(RecordingAlertSink::new()));
        let err = select(&args(&["10.0.0.0/40"], &[], 24), &monitor).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AllocationError>(),
            Some(AllocationError::InvalidCidr(_))
        ));
    }
}
