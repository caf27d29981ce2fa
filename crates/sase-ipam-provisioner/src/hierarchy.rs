//! Hierarchical pool planning
//!
//! Top-level supernet → per-region blocks → per-environment blocks.
//!
//! Planning is a pure dry run: every block is chosen up front, nothing is
//! created. Each level keeps its own [`UsedSet`]; environment bookkeeping
//! starts empty for every region and never carries over to the next one.

use crate::error::{ProvisionError, ProvisionResult};
use sase_ipam::{
    allocate_from, AddressSpace, Allocation, Ipv4Net, ThresholdPolicy, UsedSet, UtilizationAlert,
};
use serde::{Deserialize, Serialize};

/// Environment label on alerts raised while carving region blocks
pub const REGION_SCOPE_LABEL: &str = "*";

/// What to carve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchySpec {
    pub top_level: AddressSpace,
    pub region_prefix_len: u8,
    pub environment_prefix_len: u8,
    pub regions: Vec<String>,
    pub environments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPlan {
    pub environment: String,
    pub block: Ipv4Net,
    /// Share of the region block used before this carve
    pub used_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPlan {
    pub region: String,
    pub block: Ipv4Net,
    /// Share of the top-level space used before this carve
    pub used_percent: u8,
    pub environments: Vec<EnvironmentPlan>,
}

/// Result of a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPlan {
    pub top_level: AddressSpace,
    pub regions: Vec<RegionPlan>,
    /// Raised during the carve, delivered on commit
    pub alerts: Vec<UtilizationAlert>,
}

impl PoolPlan {
    /// Top-level used-set after this plan is applied
    pub fn top_level_used(&self, prior: &UsedSet) -> UsedSet {
        let mut used = prior.clone();
        for region in &self.regions {
            used.record(region.block);
        }
        used
    }

    /// (region, environment, block) for every environment pool
    pub fn environment_blocks(&self) -> impl Iterator<Item = (&str, &str, Ipv4Net)> + '_ {
        self.regions.iter().flat_map(|r| {
            r.environments
                .iter()
                .map(move |e| (r.region.as_str(), e.environment.as_str(), e.block))
        })
    }

    pub fn pool_count(&self) -> usize {
        self.regions.iter().map(|r| 1 + r.environments.len()).sum()
    }
}

/// Drives the allocator across the pool hierarchy
pub struct HierarchicalProvisioner {
    spec: HierarchySpec,
    policy: ThresholdPolicy,
}

impl HierarchicalProvisioner {
    pub fn new(spec: HierarchySpec) -> Self {
        Self {
            spec,
            policy: ThresholdPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn spec(&self) -> &HierarchySpec {
        &self.spec
    }

    /// Choose every region and environment block.
    ///
    /// `top_used` lists blocks already taken from the top-level space. Any
    /// allocation failure aborts the whole plan; the error carries every
    /// alert raised so far, including a full-usage alert for the scope that
    /// ran out.
    pub fn plan(&self, top_used: &UsedSet) -> ProvisionResult<PoolPlan> {
        let mut alerts = Vec::new();
        match self.carve(top_used, &mut alerts) {
            Ok(regions) => Ok(PoolPlan {
                top_level: self.spec.top_level.clone(),
                regions,
                alerts,
            }),
            Err(e) => Err(e.with_alerts(alerts)),
        }
    }

    fn carve(
        &self,
        top_used: &UsedSet,
        alerts: &mut Vec<UtilizationAlert>,
    ) -> ProvisionResult<Vec<RegionPlan>> {
        let spec = &self.spec;
        let mut top_used = top_used.clone();
        let mut regions = Vec::with_capacity(spec.regions.len());

        for region in &spec.regions {
            let allocation = self.allocate_scoped(
                &spec.top_level,
                &top_used,
                spec.region_prefix_len,
                region,
                REGION_SCOPE_LABEL,
                alerts,
            )?;
            top_used.record(allocation.block);

            tracing::info!(region = %region, block = %allocation.block, "planned region pool");

            let region_space = AddressSpace::from_blocks([allocation.block]);
            let mut region_used = UsedSet::new();
            let mut environments = Vec::with_capacity(spec.environments.len());

            for environment in &spec.environments {
                let env_allocation = self.allocate_scoped(
                    &region_space,
                    &region_used,
                    spec.environment_prefix_len,
                    region,
                    environment,
                    alerts,
                )?;
                region_used.record(env_allocation.block);

                tracing::info!(
                    region = %region,
                    environment = %environment,
                    block = %env_allocation.block,
                    "planned environment pool"
                );

                environments.push(EnvironmentPlan {
                    environment: environment.clone(),
                    block: env_allocation.block,
                    used_percent: env_allocation.used_percent(),
                });
            }

            regions.push(RegionPlan {
                region: region.clone(),
                block: allocation.block,
                used_percent: allocation.used_percent(),
                environments,
            });
        }

        Ok(regions)
    }

    /// One carve plus its threshold check. Exhaustion counts as full usage.
    fn allocate_scoped(
        &self,
        space: &AddressSpace,
        used: &UsedSet,
        prefix_len: u8,
        region: &str,
        environment: &str,
        alerts: &mut Vec<UtilizationAlert>,
    ) -> ProvisionResult<Allocation> {
        match allocate_from(space, used.as_slice(), prefix_len) {
            Ok(allocation) => {
                alerts.extend(self.policy.evaluate_allocation(&allocation, region, environment));
                Ok(allocation)
            }
            Err(e) => {
                if e.is_exhausted() {
                    alerts.extend(self.policy.evaluate_exhausted(space.size(), region, environment));
                }
                let scope = match environment {
                    REGION_SCOPE_LABEL => format!("region {}", region),
                    _ => format!("environment {} in region {}", environment, region),
                };
                Err(ProvisionError::allocation(scope, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sase_ipam::{cidr::overlaps, AllocationError};

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn spec(top: &str, region_len: u8, env_len: u8, regions: &[&str], envs: &[&str]) -> HierarchySpec {
        HierarchySpec {
            top_level: AddressSpace::from_cidrs([top]).unwrap(),
            region_prefix_len: region_len,
            environment_prefix_len: env_len,
            regions: regions.iter().map(|s| s.to_string()).collect(),
            environments: envs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_two_regions_three_environments() {
        let provisioner = HierarchicalProvisioner::new(spec(
            "10.0.0.0/8",
            16,
            20,
            &["us-east-1", "eu-west-1"],
            &["prod", "staging", "dev"],
        ));
        let plan = provisioner.plan(&UsedSet::new()).unwrap();

        assert_eq!(plan.regions[0].block, net("10.0.0.0/16"));
        assert_eq!(plan.regions[1].block, net("10.1.0.0/16"));
        assert_eq!(plan.pool_count(), 8);

        let envs: Vec<_> = plan.environment_blocks().collect();
        assert_eq!(envs.len(), 6);
        assert_eq!(envs[0], ("us-east-1", "prod", net("10.0.0.0/20")));
        assert_eq!(envs[2], ("us-east-1", "dev", net("10.0.32.0/20")));
        assert_eq!(envs[3], ("eu-west-1", "prod", net("10.1.0.0/20")));

        // No two environment blocks overlap, each nests in its own region
        for (i, (region, _, block)) in envs.iter().enumerate() {
            let parent = plan.regions.iter().find(|r| r.region == *region).unwrap();
            assert!(parent.block.contains(block));
            for (_, _, other) in envs.iter().skip(i + 1) {
                assert!(!overlaps(block, other));
            }
        }
        assert!(plan.alerts.is_empty());
    }

    #[test]
    fn test_environment_bookkeeping_is_per_region() {
        let provisioner = HierarchicalProvisioner::new(spec(
            "10.0.0.0/8",
            16,
            24,
            &["a", "b", "c"],
            &["prod"],
        ));
        let plan = provisioner.plan(&UsedSet::new()).unwrap();

        // Every region starts carving at its own base address
        for region in &plan.regions {
            assert_eq!(region.environments[0].block.network(), region.block.network());
        }
    }

    #[test]
    fn test_respects_existing_top_level_usage() {
        let provisioner = HierarchicalProvisioner::new(spec(
            "10.0.0.0/8",
            16,
            20,
            &["us-east-1"],
            &["prod"],
        ));
        let prior = UsedSet::from_cidrs(["10.0.0.0/16", "10.1.0.0/16"]).unwrap();
        let plan = provisioner.plan(&prior).unwrap();

        assert_eq!(plan.regions[0].block, net("10.2.0.0/16"));
        assert_eq!(plan.top_level_used(&prior).len(), 3);
    }

    #[test]
    fn test_region_exhaustion_aborts() {
        let provisioner = HierarchicalProvisioner::new(spec(
            "10.0.0.0/15",
            16,
            20,
            &["a", "b", "c"],
            &["prod"],
        ));
        let err = provisioner.plan(&UsedSet::new()).unwrap_err();

        assert!(err.to_string().contains("region c"));
        assert_eq!(
            err.allocation_error(),
            Some(&AllocationError::Exhausted { prefix_len: 16 })
        );

        // The exhausted top-level scope reports full usage
        let alerts = err.pending_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].region, "c");
        assert_eq!(alerts[0].environment, REGION_SCOPE_LABEL);
        assert_eq!(alerts[0].used_percent, 100);
    }

    #[test]
    fn test_environment_exhaustion_aborts() {
        let provisioner = HierarchicalProvisioner::new(spec(
            "10.0.0.0/8",
            20,
            20,
            &["a"],
            &["prod", "dev"],
        ));
        let err = provisioner.plan(&UsedSet::new()).unwrap_err();
        assert!(err.to_string().contains("environment dev in region a"));
    }

    #[test]
    fn test_inconsistent_top_level_usage() {
        let provisioner =
            HierarchicalProvisioner::new(spec("10.0.0.0/8", 16, 20, &["a"], &["prod"]));
        let prior = UsedSet::from_cidrs(["192.168.0.0/16"]).unwrap();

        let err = provisioner.plan(&prior).unwrap_err();
        assert!(matches!(
            err.allocation_error(),
            Some(AllocationError::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_alerts_near_exhaustion() {
        let envs: Vec<String> = (0..16).map(|i| format!("env-{}", i)).collect();
        let env_refs: Vec<&str> = envs.iter().map(String::as_str).collect();
        let provisioner =
            HierarchicalProvisioner::new(spec("10.0.0.0/8", 16, 20, &["us-east-1"], &env_refs));

        let plan = provisioner.plan(&UsedSet::new()).unwrap();

        // env-13 sees 81%, env-14 88%, env-15 94%
        let alerted: Vec<_> = plan.alerts.iter().map(|a| a.environment.as_str()).collect();
        assert_eq!(alerted, vec!["env-13", "env-14", "env-15"]);
        assert_eq!(plan.regions[0].environments[15].used_percent, 94);
    }

    #[test]
    fn test_failed_plan_keeps_earlier_alerts() {
        let envs: Vec<String> = (0..17).map(|i| format!("env-{}", i)).collect();
        let env_refs: Vec<&str> = envs.iter().map(String::as_str).collect();
        let provisioner =
            HierarchicalProvisioner::new(spec("10.0.0.0/8", 16, 20, &["us-east-1"], &env_refs));

        let err = provisioner.plan(&UsedSet::new()).unwrap_err();
        assert!(err.to_string().contains("environment env-16 in region us-east-1"));

        let alerted: Vec<_> = err
            .pending_alerts()
            .iter()
            .map(|a| (a.environment.as_str(), a.used_percent))
            .collect();
        assert_eq!(
            alerted,
            vec![("env-13", 81), ("env-14", 88), ("env-15", 94), ("env-16", 100)]
        );
    }

    #[test]
    fn test_inconsistent_usage_raises_no_alert() {
        let provisioner =
            HierarchicalProvisioner::new(spec("10.0.0.0/8", 16, 20, &["a"], &["prod"]));
        let prior = UsedSet::from_cidrs(["192.168.0.0/16"]).unwrap();

        let err = provisioner.plan(&prior).unwrap_err();
        assert!(err.pending_alerts().is_empty());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let provisioner = HierarchicalProvisioner::new(spec(
            "172.16.0.0/12",
            16,
            22,
            &["a", "b"],
            &["x", "y"],
        ));
        let first = provisioner.plan(&UsedSet::new()).unwrap();
        let second = provisioner.plan(&UsedSet::new()).unwrap();
        assert_eq!(first.regions, second.regions);
    }
}
