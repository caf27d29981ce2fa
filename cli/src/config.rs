//! CLI profile
//!
//! Optional per-user defaults in `~/.opensase/ipam.toml`
//! (`ipam.<profile>.toml` for named profiles).

use crate::output::OutputFormat;
use anyhow::{anyhow, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Profile {
    pub default_format: Option<String>,
    pub alert_threshold_percent: Option<u8>,
    /// Pools file used when `-f` is not given
    pub pools_file: Option<String>,
}

impl Profile {
    pub fn load(profile: Option<&str>) -> anyhow::Result<Self> {
        let path = Self::config_path(profile)?;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok())
            .unwrap_or(OutputFormat::Table)
    }

    /// Flag value, else profile value, else the library default
    pub fn threshold(&self, flag: Option<u8>) -> u8 {
        flag.or(self.alert_threshold_percent)
            .unwrap_or(sase_ipam::DEFAULT_THRESHOLD_PERCENT)
    }

    pub fn pools_file(&self, flag: Option<String>) -> anyhow::Result<String> {
        flag.or_else(|| self.pools_file.clone())
            .ok_or_else(|| anyhow!("no pools file: pass -f or set pools_file in the profile"))
    }

    fn config_path(profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot find home directory"))?;
        let filename = match profile {
            Some(p) => format!("ipam.{}.toml", p),
            None => "ipam.toml".to_string(),
        };
        Ok(home.join(".opensase").join(filename))
    }
}
