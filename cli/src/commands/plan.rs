//! Hierarchy dry run

use super::warn_alert;
use crate::output::OutputFormat;
use sase_ipam::{ThresholdPolicy, UsedSet};
use sase_ipam_provisioner::{HierarchicalProvisioner, PoolPlan, ProvisionerConfig};
use serde::Serialize;
use tabled::Tabled;

/// Command-line overrides on top of the pools file
#[derive(Debug, Default)]
pub struct PlanOverrides {
    pub used: Vec<String>,
    pub region_prefix: Option<u8>,
    pub env_prefix: Option<u8>,
    pub regions: Vec<String>,
}

impl PlanOverrides {
    pub fn apply(self, mut config: ProvisionerConfig) -> anyhow::Result<ProvisionerConfig> {
        config.used_cidrs.extend(self.used);
        if let Some(p) = self.region_prefix {
            config.region_prefix_len = p;
        }
        if let Some(p) = self.env_prefix {
            config.environment_prefix_len = p;
        }
        if !self.regions.is_empty() {
            config.regions = self.regions;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PoolRow {
    pub region: String,
    pub environment: String,
    pub cidr: String,
    pub used_percent: u8,
}

pub fn rows(plan: &PoolPlan) -> Vec<PoolRow> {
    let mut rows = Vec::with_capacity(plan.pool_count());
    for region in &plan.regions {
        rows.push(PoolRow {
            region: region.region.clone(),
            environment: "-".into(),
            cidr: region.block.to_string(),
            used_percent: region.used_percent,
        });
        for env in &region.environments {
            rows.push(PoolRow {
                region: region.region.clone(),
                environment: env.environment.clone(),
                cidr: env.block.to_string(),
                used_percent: env.used_percent,
            });
        }
    }
    rows
}

pub fn build_plan(config: &ProvisionerConfig) -> anyhow::Result<(PoolPlan, UsedSet)> {
    let used = config.top_level_used()?;
    let plan = HierarchicalProvisioner::new(config.hierarchy_spec()?)
        .with_policy(ThresholdPolicy::new(config.alert_threshold_percent))
        .plan(&used)?;
    Ok((plan, used))
}

pub fn handle(path: &str, overrides: PlanOverrides, format: OutputFormat) -> anyhow::Result<()> {
    let config = overrides.apply(ProvisionerConfig::load(path)?)?;
    let (plan, _) = build_plan(&config)?;

    for alert in &plan.alerts {
        warn_alert(alert);
    }
    match format {
        OutputFormat::Table => format.print_rows(&rows(&plan)),
        _ => format.print(&plan),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_and_rows() {
        let overrides = PlanOverrides {
            used: vec!["10.0.0.0/16".into()],
            env_prefix: Some(24),
            regions: vec!["us-east-1".into(), "eu-west-1".into()],
            ..Default::default()
        };
        let config = overrides.apply(ProvisionerConfig::default()).unwrap();
        let (plan, used) = build_plan(&config).unwrap();

        assert_eq!(used.len(), 1);
        let rows = rows(&plan);
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].cidr, "10.1.0.0/16");
        assert_eq!(rows[1].cidr, "10.1.0.0/24");
        assert_eq!(rows[4].region, "eu-west-1");
        assert_eq!(rows[4].cidr, "10.2.0.0/16");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let overrides = PlanOverrides {
            env_prefix: Some(8),
            ..Default::default()
        };
        assert!(overrides.apply(ProvisionerConfig::default()).is_err());
    }
}
