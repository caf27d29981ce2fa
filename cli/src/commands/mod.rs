//! CLI Commands

pub mod next;
pub mod plan;
pub mod simulate;
pub mod usage;

use async_trait::async_trait;
use colored::Colorize;
use sase_ipam::{AlertError, AlertSink, UtilizationAlert};

/// Operator-facing alert line on stderr
pub fn warn_alert(alert: &UtilizationAlert) {
    eprintln!("{} {}", alert.subject().yellow().bold(), alert.message().as_str().yellow());
}

/// Alert sink for interactive use
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAlertSink;

#[async_trait]
impl AlertSink for ConsoleAlertSink {
    async fn deliver(&self, alert: &UtilizationAlert) -> Result<(), AlertError> {
        warn_alert(alert);
        Ok(())
    }
}
