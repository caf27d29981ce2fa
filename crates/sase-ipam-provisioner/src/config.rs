//! Provisioner Configuration
//!
//! Loaded from TOML. Everything the hierarchy carve needs is passed in
//! explicitly; nothing is read from process-wide state.

use crate::hierarchy::{HierarchySpec, REGION_SCOPE_LABEL};
use crate::lifecycle::{LifecycleSignal, ProvisioningRequest};
use crate::readiness::BackoffPolicy;
use sase_ipam::{AddressSpace, AllocationError, UsedSet, DEFAULT_THRESHOLD_PERCENT};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hierarchy provisioning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Top-level supernets to carve
    pub top_level_cidrs: Vec<String>,
    /// Pool the region pools are drawn from
    pub top_level_pool_id: String,
    /// Region pool size
    pub region_prefix_len: u8,
    /// Environment pool size
    pub environment_prefix_len: u8,
    /// Regions, in carve order
    pub regions: Vec<String>,
    /// Environments per region, in carve order
    pub environments: Vec<String>,
    /// Blocks already taken out of the top-level pool
    pub used_cidrs: Vec<String>,
    /// Alert when more than this share is used
    pub alert_threshold_percent: u8,
    /// Readiness polling
    pub readiness: BackoffPolicy,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            top_level_cidrs: vec!["10.0.0.0/8".into()],
            top_level_pool_id: "ipam-pool-root".into(),
            region_prefix_len: 16,
            environment_prefix_len: 20,
            regions: vec!["us-east-1".into()],
            environments: vec!["prod".into(), "staging".into(), "dev".into()],
            used_cidrs: Vec::new(),
            alert_threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            readiness: BackoffPolicy::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_level_cidrs.is_empty() {
            return Err(ConfigError::Invalid("top_level_cidrs is empty".into()));
        }
        if self.regions.is_empty() {
            return Err(ConfigError::Invalid("regions is empty".into()));
        }
        if self.region_prefix_len > 32 || self.environment_prefix_len > 32 {
            return Err(ConfigError::Invalid("prefix lengths must be at most 32".into()));
        }
        if self.environment_prefix_len < self.region_prefix_len {
            return Err(ConfigError::Invalid(format!(
                "environment prefix /{} is larger than region prefix /{}",
                self.environment_prefix_len, self.region_prefix_len
            )));
        }
        if self.alert_threshold_percent > 100 {
            return Err(ConfigError::Invalid("alert_threshold_percent above 100".into()));
        }
        if self.readiness.max_attempts == 0 {
            return Err(ConfigError::Invalid("readiness.max_attempts must be at least 1".into()));
        }
        if self.environments.iter().any(|e| e == REGION_SCOPE_LABEL) {
            return Err(ConfigError::Invalid(format!(
                "environment name {:?} is reserved",
                REGION_SCOPE_LABEL
            )));
        }

        let space = self.top_level_space()?;
        if let Some(widest) = space.widest_prefix_len() {
            if self.region_prefix_len < widest {
                return Err(ConfigError::Invalid(format!(
                    "region prefix /{} is larger than the top-level block /{}",
                    self.region_prefix_len, widest
                )));
            }
        }
        self.top_level_used()?;
        Ok(())
    }

    pub fn top_level_space(&self) -> Result<AddressSpace, ConfigError> {
        Ok(AddressSpace::from_cidrs(&self.top_level_cidrs)?)
    }

    pub fn top_level_used(&self) -> Result<UsedSet, ConfigError> {
        Ok(UsedSet::from_cidrs(&self.used_cidrs)?)
    }

    pub fn hierarchy_spec(&self) -> Result<HierarchySpec, ConfigError> {
        Ok(HierarchySpec {
            top_level: self.top_level_space()?,
            region_prefix_len: self.region_prefix_len,
            environment_prefix_len: self.environment_prefix_len,
            regions: self.regions.clone(),
            environments: self.environments.clone(),
        })
    }

    /// Build a provisioning request for `signal`
    pub fn request(&self, signal: LifecycleSignal) -> Result<ProvisioningRequest, ConfigError> {
        Ok(ProvisioningRequest {
            signal,
            spec: self.hierarchy_spec()?,
            top_level_pool_id: self.top_level_pool_id.clone(),
            top_used: self.top_level_used()?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid CIDR: {0}")]
    Cidr(#[from] AllocationError),

    #[error("invalid config: {0}")]
    Invalid(String),
}
