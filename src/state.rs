//! Achieved snapshot persisted between boots

use crate::resource::NodeSource;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// A node as it was achieved by a previous boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub source: NodeSource,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub script: Option<PathBuf>,
    pub path: PathBuf,
}

/// A model as it was achieved by a previous boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub url: String,
    pub filename: String,
    pub dir: String,
    pub path: PathBuf,
}

/// The achieved snapshot persisted between boots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootState {
    pub custom_nodes: Vec<NodeRecord>,
    pub models: Vec<ModelRecord>,
    /// Last time the state was written
    pub last_updated: Option<DateTime<Utc>>,
}

/// On-disk shape, read leniently so one bad record does not discard the rest
#[derive(Debug, Deserialize)]
struct RawState {
    #[serde(default)]
    custom_nodes: serde_json::Value,
    #[serde(default)]
    models: serde_json::Value,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// StateStore
// ============================================================================

/// Reads and writes the achieved snapshot at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous snapshot.
    ///
    /// Anything unusable at the path (a directory, unreadable or corrupt
    /// content) yields an empty snapshot, which means first-run semantics.
    pub fn load(&self) -> BootState {
        let path = &self.path;
        if path.is_dir() {
            log::warn!("Detected invalid previous state, removing {}", path.display());
            if let Err(e) = fs::remove_dir_all(path) {
                log::error!("Failed to remove invalid state: {e}");
            }
            return BootState::default();
        }
        if !path.is_file() {
            log::info!("No previous state found");
            return BootState::default();
        }

        log::info!("Detected previous state, loading...");
        match Self::read(path) {
            Ok(state) => {
                log::debug!("Loaded previous state: {state:?}");
                state
            }
            Err(e) => {
                log::error!("Failed to load previous state '{}': {e:#}", path.display());
                BootState::default()
            }
        }
    }

    fn read(path: &Path) -> Result<BootState> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let raw: RawState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        Ok(BootState {
            custom_nodes: records("custom_nodes", raw.custom_nodes),
            models: records("models", raw.models),
            last_updated: raw.last_updated,
        })
    }

    /// Overwrite the snapshot, stamping it with the current time
    pub fn save(&self, state: &BootState) -> Result<()> {
        let path = &self.path;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create state directory: {}", dir.display())
            })?;
        }

        let stamped = BootState {
            last_updated: Some(Utc::now()),
            ..state.clone()
        };
        let content =
            serde_json::to_string_pretty(&stamped).context("Failed to serialize state to JSON")?;
        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::info!("Current state saved to {}", path.display());
        log::debug!("Saved state file content: {content}");
        Ok(())
    }
}

fn records<T: DeserializeOwned>(category: &str, value: serde_json::Value) -> Vec<T> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => return Vec::new(),
        other => {
            log::warn!("Ignoring previous '{category}': expected a list, found {other}");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Ignoring malformed previous '{category}' entry: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> BootState {
        BootState {
            custom_nodes: vec![NodeRecord {
                name: "comfyui-kjnodes".to_string(),
                source: NodeSource::Registry,
                version: Some("nightly".to_string()),
                url: None,
                script: None,
                path: PathBuf::from("/app/custom_nodes/comfyui-kjnodes"),
            }],
            models: vec![ModelRecord {
                url: "https://example.com/a.safetensors".to_string(),
                filename: "a.safetensors".to_string(),
                dir: "models/checkpoints".to_string(),
                path: PathBuf::from("/app/models/checkpoints/a.safetensors"),
            }],
            last_updated: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("prev-state.json"));
        assert_eq!(store.load(), BootState::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join(".cache").join("prev-state.json"));
        store.save(&sample()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.custom_nodes, sample().custom_nodes);
        assert_eq!(loaded.models, sample().models);
        assert!(loaded.last_updated.is_some());
    }

    #[test]
    fn test_written_document_shape() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        store.save(&sample()).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(doc["custom_nodes"][0]["source"], "registry");
        assert_eq!(doc["models"][0]["dir"], "models/checkpoints");
        assert!(doc["last_updated"].is_string());
    }

    #[test]
    fn test_directory_at_path_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prev-state.json");
        fs::create_dir_all(path.join("junk")).unwrap();

        let store = StateStore::new(&path);
        assert_eq!(store.load(), BootState::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_content_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prev-state.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(StateStore::new(&path).load(), BootState::default());

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert_eq!(StateStore::new(&path).load(), BootState::default());
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prev-state.json");
        fs::write(
            &path,
            r#"{
                "custom_nodes": [
                    {"name": "a", "source": "git", "url": "https://github.com/o/a", "path": "/x/a"},
                    {"name": "b"}
                ],
                "models": "oops"
            }"#,
        )
        .unwrap();

        let state = StateStore::new(&path).load();
        assert_eq!(state.custom_nodes.len(), 1);
        assert_eq!(state.custom_nodes[0].name, "a");
        assert!(state.models.is_empty());
    }
}
