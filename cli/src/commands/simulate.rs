//! Lifecycle simulation against the in-memory backend

use super::ConsoleAlertSink;
use crate::output::OutputFormat;
use colored::Colorize;
use sase_ipam::{AlertSink, UtilizationMonitor};
use sase_ipam_provisioner::{
    BackoffPolicy, InMemoryPoolBackend, LifecycleResponse, LifecycleSignal, ProvisionResult,
    ProvisionerConfig, ProvisioningDriver, RecordingResponder, ResponseStatus,
};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Debug, Serialize, Tabled)]
pub struct CreatedPoolRow {
    pub pool_id: String,
    pub locale: String,
    pub environment: String,
    pub source_pool_id: String,
    pub cidrs: String,
}

/// Everything a simulated run produced
pub struct Simulation {
    pub outcome: ProvisionResult<Option<ResponseStatus>>,
    pub responses: Vec<LifecycleResponse>,
    pub pools: Vec<CreatedPoolRow>,
}

pub async fn run(
    config: &ProvisionerConfig,
    signal: &str,
    poll_delay_ms: u64,
    sink: Arc<dyn AlertSink>,
) -> anyhow::Result<Simulation> {
    let request = config.request(LifecycleSignal::parse(signal))?;

    let backend = Arc::new(InMemoryPoolBackend::new().with_polls_until_ready(2));
    backend.register_ready_pool(
        &config.top_level_pool_id,
        "global",
        config.top_level_space()?.blocks().to_vec(),
    );

    let responder = Arc::new(RecordingResponder::new());
    let monitor = UtilizationMonitor::new(sink).with_threshold(config.alert_threshold_percent);
    let backoff = BackoffPolicy {
        initial_delay_ms: poll_delay_ms,
        max_delay_ms: poll_delay_ms.saturating_mul(8),
        ..config.readiness
    };
    let driver =
        ProvisioningDriver::new(backend.clone(), monitor, responder.clone()).with_backoff(backoff);

    let outcome = driver.handle(&request).await;

    let pools = backend
        .created_pools()
        .into_iter()
        .map(|record| CreatedPoolRow {
            environment: record.request.environment_tag().unwrap_or("-").to_string(),
            pool_id: record.handle.pool_id,
            locale: record.handle.locale,
            source_pool_id: record.request.source_pool_id,
            cidrs: record
                .cidrs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        })
        .collect();

    Ok(Simulation {
        outcome,
        responses: responder.responses(),
        pools,
    })
}

pub async fn handle(
    path: &str,
    signal: &str,
    poll_delay_ms: u64,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = ProvisionerConfig::load(path)?;
    let simulation = run(&config, signal, poll_delay_ms, Arc::new(ConsoleAlertSink)).await?;

    for response in &simulation.responses {
        let status = match response.status {
            ResponseStatus::Success => "SUCCESS".green().bold(),
            ResponseStatus::Failed => "FAILED".red().bold(),
        };
        eprintln!("{} {}", status, response.message);
    }
    if let Ok(None) = simulation.outcome {
        eprintln!("{} no response sent for signal {}", "IGNORED".yellow().bold(), signal);
    }

    format.print_rows(&simulation.pools);

    simulation.outcome?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sase_ipam::RecordingAlertSink;

    fn config(regions: &[&str], environments: &[&str]) -> ProvisionerConfig {
        ProvisionerConfig {
            regions: regions.iter().map(|s| s.to_string()).collect(),
            environments: environments.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_simulate_create() {
        let sink = Arc::new(RecordingAlertSink::new());
        let sim = run(&config(&["us-east-1", "eu-west-1"], &["prod", "dev"]), "Create", 1, sink)
            .await
            .unwrap();

        assert!(matches!(sim.outcome, Ok(Some(ResponseStatus::Success))));
        assert_eq!(sim.pools.len(), 6);
        assert_eq!(sim.pools[0].source_pool_id, "ipam-pool-root");
        assert_eq!(sim.pools[0].cidrs, "10.0.0.0/16");
        assert_eq!(sim.pools[0].environment, "-");
        assert_eq!(sim.pools[1].environment, "prod");
        assert_eq!(sim.pools[4].cidrs, "10.1.0.0/20");
    }

    #[tokio::test]
    async fn test_simulate_delete_and_unknown() {
        let cfg = config(&["us-east-1"], &["prod"]);

        let sim = run(&cfg, "Delete", 1, Arc::new(RecordingAlertSink::new())).await.unwrap();
        assert!(matches!(sim.outcome, Ok(Some(ResponseStatus::Success))));
        assert!(sim.pools.is_empty());

        let sim = run(&cfg, "Update", 1, Arc::new(RecordingAlertSink::new())).await.unwrap();
        assert!(matches!(sim.outcome, Ok(None)));
        assert!(sim.responses.is_empty());
    }

    #[tokio::test]
    async fn test_simulate_exhaustion_reports_failure() {
        let sink = Arc::new(RecordingAlertSink::new());
        let cfg = ProvisionerConfig {
            top_level_cidrs: vec!["10.0.0.0/16".into()],
            ..config(&["a", "b"], &["prod"])
        };

        let sim = run(&cfg, "Create", 1, sink.clone()).await.unwrap();
        assert!(sim.outcome.is_err());
        assert_eq!(sim.responses[0].status, ResponseStatus::Failed);
        assert_eq!(sink.delivered()[0].used_percent, 100);
    }
}
