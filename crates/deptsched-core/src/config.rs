use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::AUTO_REFRESH_INTERVAL_SECS;
use crate::models::{builtin_categories, Category, PersonalSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Fixed set of categories, known at startup
    pub categories: Vec<Category>,
    pub personal_source: PersonalSource,
    pub auto_refresh_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            categories: builtin_categories(),
            personal_source: PersonalSource::default(),
            auto_refresh_secs: AUTO_REFRESH_INTERVAL_SECS,
        }
    }
}

impl CoreConfig {
    /// Load config from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auto_refresh_secs == 0 {
            bail!("autoRefreshSecs must be greater than zero");
        }
        let mut seen = std::collections::HashSet::new();
        for category in &self.categories {
            if !seen.insert(category.id.as_str()) {
                bail!("Duplicate category id: {}", category.id);
            }
        }
        Ok(())
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_secs)
    }
}
