use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

// Fixed key names, shared with the browser-side mock storage
pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const USER_DATA_KEY: &str = "userData";
pub const TRANSACTIONS_KEY: &str = "mockTransactions";
pub const SCANS_KEY: &str = "scans";
pub const USERS_KEY: &str = "users";

/// Small key/value store used when no real backend is wired up.
///
/// Values are JSON. With a backing file every mutation rewrites the whole file
/// through a temp file + rename, so a crash never leaves a half-written store.
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<Map<String, Value>>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Map::new()),
        }
    }

    /// Open (or lazily create) a file-backed store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| format!("Local store {} is corrupt: {}", path.display(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(format!("Failed to read local store {}: {}", path.display(), e)),
        };

        tracing::debug!("📂 Opened local store {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, String> {
        let entries = self.entries.lock().map_err(|_| "Local store lock poisoned".to_string())?;
        entries
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| format!("Local store value '{}' has wrong shape: {}", key, e))
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), String> {
        let value = serde_json::to_value(value).map_err(|e| e.to_string())?;
        let mut entries = self.entries.lock().map_err(|_| "Local store lock poisoned".to_string())?;
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<(), String> {
        let mut entries = self.entries.lock().map_err(|_| "Local store lock poisoned".to_string())?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    /// Read-modify-write a value under a single lock.
    /// The value is only written back when `f` succeeds.
    pub fn update<T, R, F>(&self, key: &str, f: F) -> Result<R, String>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> Result<R, String>,
    {
        let mut entries = self.entries.lock().map_err(|_| "Local store lock poisoned".to_string())?;

        let mut value: T = match entries.get(key) {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| format!("Local store value '{}' has wrong shape: {}", key, e))?,
            None => T::default(),
        };

        let out = f(&mut value)?;

        entries.insert(
            key.to_string(),
            serde_json::to_value(&value).map_err(|e| e.to_string())?,
        );
        self.flush(&entries)?;
        Ok(out)
    }

    /// Read and write several keys under one lock.
    /// Staged writes land together, and only when `f` returns `Ok`.
    pub fn transaction<R, F>(&self, f: F) -> Result<R, String>
    where
        F: FnOnce(&mut StoreTxn<'_>) -> Result<R, String>,
    {
        let mut entries = self.entries.lock().map_err(|_| "Local store lock poisoned".to_string())?;

        let mut txn = StoreTxn {
            staged: Map::new(),
            snapshot: &entries,
        };
        let out = f(&mut txn)?;
        let staged = txn.staged;

        if !staged.is_empty() {
            entries.extend(staged);
            self.flush(&entries)?;
        }
        Ok(out)
    }

    fn flush(&self, entries: &Map<String, Value>) -> Result<(), String> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| e.to_string())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .map_err(|e| format!("Failed to write local store {}: {}", tmp.display(), e))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| format!("Failed to replace local store {}: {}", path.display(), e))
    }
}

/// Staged view handed to [`LocalStore::transaction`]
pub struct StoreTxn<'a> {
    staged: Map<String, Value>,
    snapshot: &'a Map<String, Value>,
}

impl StoreTxn<'_> {
    /// Current value for `key`, including writes staged earlier in this transaction
    pub fn get<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, String> {
        match self.staged.get(key).or_else(|| self.snapshot.get(key)) {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| format!("Local store value '{}' has wrong shape: {}", key, e)),
            None => Ok(T::default()),
        }
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), String> {
        let value = serde_json::to_value(value).map_err(|e| e.to_string())?;
        self.staged.insert(key.to_string(), value);
        Ok(())
    }
}
