//! Engine configuration stored at `.folio/config.toml`
//!
//! Every section uses `#[serde(default)]`, so a partial file only overrides
//! the keys it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub history: HistoryConfig,
    pub drafts: DraftsConfig,
    pub recovery: RecoveryConfig,
    pub watcher: WatchConfig,
}

/// Object store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd compression level (default: 3)
    pub compression_level: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { compression_level: 3 }
    }
}

/// Document checkpoint history configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum checkpoints kept per document (default: 200)
    pub max_checkpoints: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_checkpoints: 200 }
    }
}

/// Draft branch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftsConfig {
    /// Maximum checkpoints kept per draft (default: 20)
    pub max_checkpoints: usize,
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self { max_checkpoints: 20 }
    }
}

/// Write-ahead log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Snapshot interval in milliseconds (default: 500)
    pub interval_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

/// External change watcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a burst of events is processed (default: 500ms)
    pub debounce_ms: u64,
    /// File name patterns that count as documents
    pub include: Vec<String>,
    /// Path component patterns that are never watched
    pub exclude: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            include: vec![
                "*.md".to_string(),
                "*.markdown".to_string(),
                "*.txt".to_string(),
                "*.folio".to_string(),
            ],
            exclude: vec![".*".to_string(), crate::META_DIR.to_string()],
        }
    }
}

impl EngineConfig {
    /// Load configuration, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration as pretty TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let tmp_dir = path
            .parent()
            .map(|p| p.join("tmp"))
            .ok_or_else(|| anyhow::anyhow!("Config path has no parent: {}", path.display()))?;

        crate::store::atomic_write(&tmp_dir, path, content.as_bytes())
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }
}
