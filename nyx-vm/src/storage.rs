//! # Nyx Storage
//!
//! Persistent key-value storage. The VM itself is stateless across runs;
//! storage exists so hosts (the REPL in particular) can persist personality
//! snapshots and reload them next session.

use crate::error::{self, Result};
use crate::personality::Personality;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Storage backend trait
pub trait StorageBackend: Send {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
    fn exists(&self, key: &str) -> bool;
    fn keys(&self) -> Vec<String>;
}

/// In-memory storage (volatile, but useful for testing)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorage {
    data: HashMap<String, serde_json::Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

/// File-based storage (persistent, one JSON file per key)
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)
            .map_err(|e| error::storage_failed(format!("failed to create storage dir: {}", e)))?;
        Ok(Self { base_path })
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        // Sanitize key for use as filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.base_path.join(format!("{}.json", safe_key))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let path = self.key_to_path(key);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        let path = self.key_to_path(key);
        let content = serde_json::to_string_pretty(&value)
            .map_err(|e| error::serialization_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| {
            error::storage_failed(format!("failed to write {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let path = self.key_to_path(key);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                error::storage_failed(format!("failed to delete {}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.key_to_path(key).exists()
    }

    fn keys(&self) -> Vec<String> {
        std::fs::read_dir(&self.base_path)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let path = e.path();
                        if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                            path.file_stem()
                                .and_then(|s| s.to_str())
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// High-level storage interface with key namespacing.
pub struct Storage {
    backend: Box<dyn StorageBackend>,
    /// Namespace prefix for keys
    namespace: Option<String>,
}

impl Storage {
    /// Create storage with in-memory backend
    pub fn memory() -> Self {
        Self {
            backend: Box::new(MemoryStorage::new()),
            namespace: None,
        }
    }

    /// Create storage with file backend
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            backend: Box::new(FileStorage::new(path)?),
            namespace: None,
        })
    }

    /// Set namespace for all operations
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn full_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    /// Get a value from storage
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.backend.get(&self.full_key(key))
    }

    /// Get a typed value from storage
    pub fn get_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Set a value in storage
    pub fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.backend.set(&self.full_key(key), value)
    }

    /// Set a typed value in storage
    pub fn set_typed<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)
            .map_err(|e| error::serialization_failed(e.to_string()))?;
        self.set(key, json)
    }

    /// Delete a value from storage
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.backend.delete(&self.full_key(key))
    }

    /// Check if a key exists
    pub fn exists(&self, key: &str) -> bool {
        self.backend.exists(&self.full_key(key))
    }

    // ========================================================================
    // Personality persistence
    // ========================================================================

    /// Persist a personality's trait vector under a session key.
    pub fn save_personality(&mut self, session: &str, personality: &Personality) -> Result<()> {
        let key = format!("personality:{}", session);
        self.set_typed(&key, &personality.snapshot())
    }

    /// Restore a personality saved with `save_personality`, if present.
    pub fn load_personality(&self, session: &str) -> Option<Personality> {
        let key = format!("personality:{}", session);
        let snapshot: BTreeMap<String, f64> = self.get_typed(&key)?;
        Some(Personality::from_snapshot(&snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personality::Trait;
    use serde_json::json;

    #[test]
    fn test_memory_storage() {
        let mut storage = Storage::memory();

        storage.set("key1", json!("value1")).unwrap();
        storage.set("key2", json!(42)).unwrap();

        assert_eq!(storage.get("key1"), Some(json!("value1")));
        assert_eq!(storage.get("key2"), Some(json!(42)));
        assert_eq!(storage.get("key3"), None);

        storage.delete("key1").unwrap();
        assert_eq!(storage.get("key1"), None);
    }

    #[test]
    fn test_namespace() {
        let mut storage = Storage::memory().with_namespace("repl");

        storage.set("key", json!("value")).unwrap();
        assert_eq!(storage.get("key"), Some(json!("value")));
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = Storage::file(dir.path()).unwrap();

        storage.set("session", json!({"lines": 3})).unwrap();
        assert!(storage.exists("session"));

        // A fresh handle over the same directory sees the data.
        let reopened = Storage::file(dir.path()).unwrap();
        assert_eq!(reopened.get("session"), Some(json!({"lines": 3})));
    }

    #[test]
    fn test_personality_persistence() {
        let mut storage = Storage::memory();

        let mut p = Personality::new();
        p.set(Trait::Curiosity, 0.8);
        p.set(Trait::Humor, 0.2);

        storage.save_personality("demo", &p).unwrap();
        let restored = storage.load_personality("demo").unwrap();
        assert_eq!(restored.vector(), p.vector());

        assert!(storage.load_personality("other").is_none());
    }
}
