//! [`StateStore`] implementations: one JSON file per key, or in memory.

use super::{StateStore, StoreError, StoreKey};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: StoreKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl StateStore for JsonFileStore {
    fn read(&self, key: StoreKey) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| StoreError::IoError(e.to_string()))?;
        let value = serde_json::from_str(&content).map_err(|e| StoreError::ParseError {
            key,
            message: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn write(&self, key: StoreKey, value: &Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::IoError(e.to_string()))?;

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;

        // Write then rename so readers never see a half-written file.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| StoreError::IoError(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// In-memory store, for tests and the replay demo.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StoreKey, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<StoreKey, Value>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn read(&self, key: StoreKey) -> Result<Option<Value>, StoreError> {
        Ok(self.entries().get(&key).cloned())
    }

    fn write(&self, key: StoreKey, value: &Value) -> Result<(), StoreError> {
        self.entries().insert(key, value.clone());
        Ok(())
    }
}
