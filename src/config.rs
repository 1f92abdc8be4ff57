//! Configuration management (TOML)

use crate::error::{Result, TracerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub render_interval_ms: u64,
    /// Tick frequency of the producers' elapsed-time clock.
    pub ticks_per_second: u64,
    /// Shown for processes that exited before their name could be read.
    pub placeholder_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    pub require_elevated: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            render_interval_ms: 1000,
            ticks_per_second: 10_000_000,
            placeholder_name: "<exited>".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| TracerError::Config(e.to_string()))?;
        if config.general.ticks_per_second == 0 {
            return Err(TracerError::Config("ticks_per_second must be positive".to_string()));
        }
        if config.general.render_interval_ms == 0 {
            return Err(TracerError::Config("render_interval_ms must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TracerError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "generator-tracer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
