use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::sync::mapping::SyncFields;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub board: BoardConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Source issue tracker credentials and scope.
#[derive(Debug, Deserialize)]
pub struct TrackerConfig {
    /// REST base URL, e.g. `https://jira.example.com/rest/api/latest`.
    pub base_url: String,
    pub pat: String,
    pub project_key: String,
}

/// Destination board credentials and workspace.
#[derive(Debug, Deserialize)]
pub struct BoardConfig {
    pub base_url: String,
    pub api_key: String,
    pub workspace_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// board status name -> accepted source status variants
    pub status_mapping: BTreeMap<String, Vec<String>>,
    /// Fallback board status when a source status has no mapping.
    pub default_status: String,
    /// Source statuses excluded from sync entirely.
    pub terminal_statuses: Vec<String>,
    /// Hours added to board UTC timestamps to align them with the source's
    /// locally-reported ones.
    pub local_offset_hours: i64,
    pub fields: SyncFields,
    pub write_timeout_secs: u64,
    pub write_parallelism: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            status_mapping: BTreeMap::new(),
            default_status: "Draft".to_string(),
            terminal_statuses: vec!["Done".to_string(), "Closed".to_string()],
            local_offset_hours: 0,
            fields: SyncFields::default(),
            write_timeout_secs: 30,
            write_parallelism: 4,
        }
    }
}

impl SyncConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".boardsync")
        .join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".boardsync")
        .join("data")
}

pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    if !path.exists() {
        bail!(
            "No config found. Add tracker and board credentials to {}",
            path.display()
        );
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?;
    Ok(config)
}
