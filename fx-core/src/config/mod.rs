//! Runtime configuration loading (TOML), teacher-style.

pub mod types;

pub use types::{AnalyticsConfig, Config, ExecutionConfig, MonitoringConfig, OrderManagerConfig, SettlementConfig};

use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("reading config {:?}: {e}", path.as_ref()))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config {:?}: {e}", path.as_ref()))?;
        Ok(config)
    }

    pub fn load_default() -> Self {
        Config::default()
    }
}
