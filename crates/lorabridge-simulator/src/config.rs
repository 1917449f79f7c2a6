//! `simulator.toml` loading

use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{info, warn};
use lorabridge_core::config::GatewayConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "simulator.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Directory holding the daily CSV logs
    pub data_dir: PathBuf,
    /// Postcard settings blob, created on the first save
    pub settings_file: PathBuf,
    /// Start with the wall clock already synchronised
    pub start_synced: bool,
    /// Start with log storage unavailable, as if no card were inserted
    pub storage_missing: bool,
    pub gateway: GatewayConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("sim-data"),
            settings_file: PathBuf::from("sim-data/settings.bin"),
            start_synced: false,
            storage_missing: false,
            gateway: GatewayConfig::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Load `path`, falling back to defaults when it is missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(" No {} found, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!(" Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!(" {:#}, using defaults", e);
                Self::default()
            }
        }
    }
}
