//! TOML configuration for the example daemon: a list of folders to
//! synchronize and the process-wide puller pool sizing.

use foldersync_core::model::{FolderConfig, FolderType, PullerPoolConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub folder: Vec<FolderEntry>,
    #[serde(default)]
    pub pool: PoolEntry,
}

#[derive(Debug, Deserialize)]
pub struct FolderEntry {
    pub id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default = "default_rescan_secs")]
    pub rescan_interval_secs: u64,
    #[serde(default)]
    pub receive_only: bool,
}

fn default_rescan_secs() -> u64 {
    60
}

#[derive(Debug, Default, Deserialize)]
pub struct PoolEntry {
    pub copiers: Option<usize>,
    pub pullers: Option<usize>,
    pub finishers: Option<usize>,
}

impl DaemonConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&text)?)
    }

    pub fn pool_config(&self) -> PullerPoolConfig {
        let defaults = PullerPoolConfig::default();
        PullerPoolConfig {
            copiers: self.pool.copiers.unwrap_or(defaults.copiers),
            pullers: self.pool.pullers.unwrap_or(defaults.pullers),
            finishers: self.pool.finishers.unwrap_or(defaults.finishers),
        }
    }
}

impl From<&FolderEntry> for FolderConfig {
    fn from(entry: &FolderEntry) -> Self {
        let mut config = FolderConfig::new(entry.id.clone(), entry.path.clone());
        config.label = entry.label.clone().unwrap_or_else(|| entry.id.clone());
        config.paused = entry.paused;
        config.rescan_interval = Duration::from_secs(entry.rescan_interval_secs);
        if entry.receive_only {
            config.folder_type = FolderType::ReceiveOnly;
        }
        config
    }
}
