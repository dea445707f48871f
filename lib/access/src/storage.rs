//! Key-value storage backends.
//!
//! Access control persists two kinds of records: the configuration, which
//! must survive restarts, and elevated session records, which must not.
//! Both go through [`KeyValueStore`]; the durability comes from the backend:
//! - `MemoryStore`: volatile, lives as long as the process (one browser context)
//! - `FileStore`: durable, a single JSON document on disk

use crate::error::StorageError;
use dentalis_core::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// A string key-value store.
///
/// Implementations are synchronous; every call either completes or fails
/// with a `StorageError` the caller recovers from locally.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Lists every key starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

fn poisoned() -> StorageError {
    StorageError::Unavailable {
        reason: "storage lock poisoned".to_string(),
    }
}

/// Volatile in-memory store.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Durable store backed by one JSON object on disk.
///
/// Writes go to a sibling temp file that is then renamed over the document,
/// so a crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store for the document at `path`. The file is created lazily.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StorageError::Unavailable {
                    reason: format!("read {}: {e}", self.path.display()),
                }
                .into());
            }
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            StorageError::Corrupt {
                key: self.path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn write_document(
        &self,
        document: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        let unavailable = |action: &str, e: &dyn fmt::Display| StorageError::Unavailable {
            reason: format!("{action} {}: {e}", self.path.display()),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable("create dir for", &e))?;
        }

        let json =
            serde_json::to_string_pretty(document).map_err(|e| unavailable("encode", &e))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| unavailable("write", &e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| unavailable("replace", &e))?;

        debug!(path = %self.path.display(), entries = document.len(), "document written");
        Ok(())
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;
        // A corrupt document is replaced rather than blocking every write.
        let mut document = self.read_document().unwrap_or_default();
        f(&mut document);
        self.write_document(&document)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_document()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.modify(|document| {
            document.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|document| {
            document.remove(key);
        })
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .read_document()?
            .into_keys()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").expect("get"), None);

        store.set("a", "1".to_string()).expect("set");
        assert_eq!(store.get("a").expect("get"), Some("1".to_string()));

        store.remove("a").expect("remove");
        assert_eq!(store.get("a").expect("get"), None);
    }

    #[test]
    fn memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", "v".to_string()).expect("set");
        assert_eq!(other.get("k").expect("get"), Some("v".to_string()));
    }

    #[test]
    fn memory_store_prefix_scan() {
        let store = MemoryStore::new();
        store.set("session.alice", "x".to_string()).expect("set");
        store.set("session.bob", "y".to_string()).expect("set");
        store.set("theme", "dark".to_string()).expect("set");

        let mut keys = store.keys_with_prefix("session.").expect("scan");
        keys.sort();
        assert_eq!(keys, vec!["session.alice", "session.bob"]);
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("access.json"));
        assert_eq!(store.get("anything").expect("get"), None);
        assert!(store.keys_with_prefix("").expect("scan").is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("access.json");

        FileStore::new(&path)
            .set("config", "{}".to_string())
            .expect("set");

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("config").expect("get"), Some("{}".to_string()));
    }

    #[test]
    fn file_store_remove_keeps_other_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("access.json"));
        store.set("a", "1".to_string()).expect("set");
        store.set("b", "2".to_string()).expect("set");

        store.remove("a").expect("remove");

        assert_eq!(store.get("a").expect("get"), None);
        assert_eq!(store.get("b").expect("get"), Some("2".to_string()));
    }

    #[test]
    fn file_store_reports_corrupt_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.json");
        std::fs::write(&path, "not json").expect("write");

        let store = FileStore::new(&path);
        assert!(store.get("config").is_err());

        // Writing replaces the corrupt document.
        store.set("config", "{}".to_string()).expect("set");
        assert_eq!(store.get("config").expect("get"), Some("{}".to_string()));
    }
}
