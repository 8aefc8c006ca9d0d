use crate::core::{Result, StoreError};
use crate::storage::{DurabilityMode, DurableStorage, InMemoryStorage, StorageEngine, WalManager};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store configuration
///
/// Without a `data_dir` the store is purely in-memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Container name, also the stem of the on-disk files
    pub name: String,

    /// Directory holding `<name>.wal` and `<name>.snapshot`
    pub data_dir: Option<PathBuf>,

    pub durability: DurabilityMode,

    /// WAL entries written before a snapshot is taken
    pub checkpoint_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: StoreConfig::DEFAULT_NAME.to_string(),
            data_dir: None,
            durability: DurabilityMode::default(),
            checkpoint_threshold: WalManager::DEFAULT_CHECKPOINT_THRESHOLD,
        }
    }
}

impl StoreConfig {
    pub const DEFAULT_NAME: &'static str = "EntityStore";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// In-memory store with the given name
    pub fn in_memory(name: &str) -> Self {
        Self::new(name)
    }

    /// Set the data directory (enables the durable engine)
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    pub fn checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    /// Load a configuration from a JSON file; missing keys take defaults.
    ///
    /// ```ignore
    /// { "name": "Chat", "data_dir": "/var/lib/chat", "durability": "sync" }
    /// ```
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(text)
            .map_err(|e| StoreError::InvalidQuery(format!("Invalid store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidQuery("Store name must not be empty".into()));
        }
        if self.checkpoint_threshold == 0 {
            return Err(StoreError::InvalidQuery(
                "Checkpoint threshold must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Build the storage engine this configuration describes.
    pub fn build_engine(&self) -> Box<dyn StorageEngine> {
        match &self.data_dir {
            Some(dir) => Box::new(
                DurableStorage::new(&self.name, dir, self.durability)
                    .with_checkpoint_threshold(self.checkpoint_threshold),
            ),
            None => Box::new(InMemoryStorage::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = StoreConfig::new("Chat")
            .data_dir("/tmp/chat")
            .durability(DurabilityMode::Sync)
            .checkpoint_threshold(10);
        assert_eq!(config.name, "Chat");
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/chat")));
        assert_eq!(config.durability, DurabilityMode::Sync);
        assert_eq!(config.checkpoint_threshold, 10);
    }

    #[test]
    fn test_from_json_with_defaults() {
        let config = StoreConfig::from_json_str(r#"{ "name": "Chat", "durability": "none" }"#).unwrap();
        assert_eq!(config.name, "Chat");
        assert_eq!(config.data_dir, None);
        assert_eq!(config.durability, DurabilityMode::None);
        assert_eq!(config.checkpoint_threshold, WalManager::DEFAULT_CHECKPOINT_THRESHOLD);
    }

    #[test]
    fn test_invalid_config() {
        assert!(StoreConfig::from_json_str(r#"{ "name": "" }"#).is_err());
        assert!(StoreConfig::from_json_str(r#"{ "checkpoint_threshold": 0 }"#).is_err());
        assert!(StoreConfig::from_json_str("not json").is_err());
    }
}
