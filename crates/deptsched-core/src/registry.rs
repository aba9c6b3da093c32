use crate::config::CoreConfig;
use crate::constants::FALLBACK_FEEDBACK_SOURCE;
use crate::models::{Category, PersonalSource};

/// The fixed set of categories plus the personal-activity source.
///
/// Lookups never fail: an unknown category id routes its messages to the
/// fallback feedback source so a transiently unrecognized category degrades
/// instead of breaking the discussion.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
    personal: PersonalSource,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<Category>, personal: PersonalSource) -> Self {
        Self {
            categories,
            personal,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.categories.clone(), config.personal_source.clone())
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn personal_source(&self) -> &PersonalSource {
        &self.personal
    }

    pub fn get(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub fn feedback_source(&self, category_id: &str) -> &str {
        self.get(category_id)
            .map(|c| c.feedback_source_name.as_str())
            .unwrap_or(FALLBACK_FEEDBACK_SOURCE)
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::from_config(&CoreConfig::default())
    }
}
