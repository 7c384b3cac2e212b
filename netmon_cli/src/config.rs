//! CLI configuration management

use crate::monitor::{FilterType, PanelOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netmon")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".netmon")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.yml")
}

/// Ensure the config directory exists
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()).context("Failed to create config directory")?;
    Ok(())
}

/// Persisted panel preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Delay before queued network events are committed (ms)
    #[serde(default = "default_refresh_rate_ms")]
    pub refresh_rate_ms: u64,

    /// Width of the waterfall column (px)
    #[serde(default = "default_waterfall_width")]
    pub waterfall_width: f64,

    /// Request types shown when the panel opens
    #[serde(default = "default_filters")]
    pub filters: Vec<FilterType>,
}

fn default_refresh_rate_ms() -> u64 {
    50
}

fn default_waterfall_width() -> f64 {
    300.0
}

fn default_filters() -> Vec<FilterType> {
    vec![FilterType::All]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_rate_ms: default_refresh_rate_ms(),
            waterfall_width: default_waterfall_width(),
            filters: default_filters(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        self.save_to(&config_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Remember the filters active when a panel was torn down
    pub fn set_filters(&mut self, filters: Vec<FilterType>) {
        self.filters = if filters.is_empty() {
            default_filters()
        } else {
            filters
        };
    }

    pub fn panel_options(&self) -> PanelOptions {
        PanelOptions {
            refresh_rate: Duration::from_millis(self.refresh_rate_ms),
            lazy_update: true,
            filters: self.filters.clone(),
            waterfall_width: self.waterfall_width,
        }
    }
}
