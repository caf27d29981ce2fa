//! Utilization check

use super::ConsoleAlertSink;
use crate::output::OutputFormat;
use sase_ipam::{used_percent, UtilizationMonitor};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Debug, Serialize, Tabled)]
pub struct UsageRow {
    pub total: u64,
    pub free: u64,
    pub used_percent: u8,
    pub threshold: u8,
    pub alert: bool,
}

pub async fn check(total: u64, free: u64, monitor: &UtilizationMonitor) -> anyhow::Result<UsageRow> {
    anyhow::ensure!(free <= total, "free ({}) exceeds total ({})", free, total);

    let alert = monitor.check_utilization(total, free, "-", "-").await;
    Ok(UsageRow {
        total,
        free,
        used_percent: used_percent(total, free),
        threshold: monitor.policy().threshold_percent,
        alert: alert.is_some(),
    })
}

pub async fn handle(total: u64, free: u64, threshold: u8, format: OutputFormat) -> anyhow::Result<()> {
    let monitor = UtilizationMonitor::new(Arc::new(ConsoleAlertSink)).with_threshold(threshold);
    let row = check(total, free, &monitor).await?;
    format.print_rows(&[row]);
    Ok(())
}
