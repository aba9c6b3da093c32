use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deptsched_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Store seed used when --fixture is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<PathBuf>,

    /// Core settings (categories, personal source, refresh interval)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core: Option<CoreConfig>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if let Some(core) = &config.core {
            core.validate()
                .with_context(|| format!("Invalid core section in {}", path.display()))?;
        }
        Ok(config)
    }

    /// `<config dir>/deptsched/config.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("deptsched").join("config.json"))
    }

    /// Explicit path wins; otherwise the default location is used if present
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn core_config(&self) -> CoreConfig {
        self.core.clone().unwrap_or_default()
    }
}
