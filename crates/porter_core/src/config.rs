//! Engine configuration

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration, loaded from `fileporter.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub transfer: TransferConfig,
    pub events: EventConfig,
}

/// Transfer tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Cadence of periodic progress snapshots while a process runs.
    pub snapshot_interval_ms: u64,
    /// Chunk size for byte-level copy progress.
    pub copy_chunk_size: usize,
    /// Max sources of one batch transferred at once; 0 means unlimited.
    pub max_concurrent_sources: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: 300,
            copy_chunk_size: 1024 * 1024,
            max_concurrent_sources: 0,
        }
    }
}

/// Observer event channel tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Broadcast buffer; lagging observers drop old snapshots, never
    /// consistency (every event carries a full snapshot).
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

impl EngineConfig {
    /// Path of the config file under the platform config directory.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "FilePorter", "FilePorter")
            .map(|dirs| dirs.config_dir().join("fileporter.toml"))
    }

    /// Load from disk; a missing file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&text)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Persist to disk, creating the config directory if needed.
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::config_path() else {
            anyhow::bail!("No config directory available");
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
