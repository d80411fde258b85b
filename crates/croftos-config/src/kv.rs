//! [`KvStore`] – whole-value JSON blob storage keyed by name.
//!
//! One store instance covers one namespace and is the single serializing
//! entry point for it: operations on a key are atomic, but there is no
//! multi-key transaction.  Values are small JSON documents read and written
//! whole; there is no querying.
//!
//! Two backends ship here: [`MemoryKvStore`] for tests and simulation, and
//! [`DirKvStore`] which keeps one `<key>.json` file per key (the on-flash
//! engine of a real device lives behind this same trait, out of scope).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use croftos_types::KernelError;
use serde_json::Value;
use tracing::trace;

/// Namespaced JSON blob store.
pub trait KvStore: Send + Sync {
    /// Read and parse the blob under `key`.  `Ok(None)` when the key is
    /// absent or the blob is empty; `Err` when the blob exists but cannot
    /// be read or parsed.
    fn get_json(&self, key: &str) -> Result<Option<Value>, KernelError>;

    /// Serialize `value` and write it under `key`, replacing any previous
    /// blob.
    fn set_json(&self, key: &str, value: &Value) -> Result<(), KernelError>;

    /// Remove the blob under `key`.  Returns whether a blob existed.
    fn remove(&self, key: &str) -> Result<bool, KernelError>;

    /// All keys currently present in the namespace, sorted.
    fn keys(&self) -> Result<Vec<String>, KernelError>;

    /// Whether a parseable blob exists under `key`.
    fn contains(&self, key: &str) -> Result<bool, KernelError> {
        Ok(self.get_json(key)?.is_some())
    }
}

fn parse_blob(key: &str, raw: &str) -> Result<Option<Value>, KernelError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| KernelError::Storage {
            key: key.to_string(),
            message: format!("invalid JSON blob: {e}"),
        })
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Map-backed store for tests and host simulation.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw blob without going through serialization.  Lets tests
    /// seed corrupt or hand-written data.
    pub fn insert_raw(&self, key: impl Into<String>, blob: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), blob.into());
    }
}

impl KvStore for MemoryKvStore {
    fn get_json(&self, key: &str) -> Result<Option<Value>, KernelError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(raw) => parse_blob(key, raw),
            None => Ok(None),
        }
    }

    fn set_json(&self, key: &str, value: &Value) -> Result<(), KernelError> {
        let raw = serde_json::to_string(value)?;
        trace!(key, "kv write");
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, KernelError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some())
    }

    fn keys(&self) -> Result<Vec<String>, KernelError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Directory backend
// ---------------------------------------------------------------------------

/// One `<key>.json` file per key under a namespace directory.
pub struct DirKvStore {
    dir: PathBuf,
}

impl DirKvStore {
    /// Open (creating if needed) the namespace directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, KernelError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| KernelError::Storage {
            key: dir.display().to_string(),
            message: format!("cannot create namespace directory: {e}"),
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, KernelError> {
        // Keys are flat names; path separators would escape the namespace.
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(KernelError::Storage {
                key: key.to_string(),
                message: "invalid key".to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvStore for DirKvStore {
    fn get_json(&self, key: &str) -> Result<Option<Value>, KernelError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| KernelError::Storage {
            key: key.to_string(),
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        parse_blob(key, &raw)
    }

    fn set_json(&self, key: &str, value: &Value) -> Result<(), KernelError> {
        let path = self.path_for(key)?;
        let raw = serde_json::to_string(value)?;
        trace!(key, path = %path.display(), "kv write");
        fs::write(&path, raw).map_err(|e| KernelError::Storage {
            key: key.to_string(),
            message: format!("cannot write {}: {e}", path.display()),
        })
    }

    fn remove(&self, key: &str) -> Result<bool, KernelError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| KernelError::Storage {
            key: key.to_string(),
            message: format!("cannot remove {}: {e}", path.display()),
        })?;
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>, KernelError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| KernelError::Storage {
            key: self.dir.display().to_string(),
            message: format!("cannot list namespace: {e}"),
        })?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| KernelError::Storage {
                key: self.dir.display().to_string(),
                message: e.to_string(),
            })?;
            let name = entry.file_name();
            if let Some(key) = name.to_string_lossy().strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
