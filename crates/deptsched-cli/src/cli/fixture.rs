use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use deptsched_core::store::{Identity, Row};
use deptsched_core::MemoryStore;
use serde::{Deserialize, Serialize};

/// JSON seed for the in-memory store:
/// `{ "identity": {"id": "..."}, "sources": { "<source>": [ {row}, ... ] } }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub sources: BTreeMap<String, Vec<Row>>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture: {}", path.display()))
    }

    pub fn into_store(self) -> MemoryStore {
        let store = MemoryStore::new();
        store.set_identity(self.identity.as_ref().map(|i| i.id.as_str()));
        for (source, rows) in self.sources {
            store.seed(&source, rows);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_fixture_into_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{
                "identity": {"id": "u1"},
                "sources": {
                    "deliveries": [{"id": 1, "delivery_date": "2024-01-04"}],
                    "meetings": []
                }
            }"#,
        )
        .unwrap();

        let fixture = Fixture::load(&path).unwrap();
        assert_eq!(fixture.identity.as_ref().unwrap().id, "u1");
        let store = fixture.into_store();
        assert_eq!(store.rows("deliveries").len(), 1);
        assert!(store.rows("meetings").is_empty());
    }

    #[test]
    fn test_rows_must_be_objects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"sources": {"deliveries": [1, 2]}}"#).unwrap();
        assert!(Fixture::load(&path).is_err());
    }
}
