//! Key-value storage seam for wallet and history persistence.
//!
//! The pipeline depends only on the [`Storage`] trait, never on a concrete
//! mechanism. The default backend keeps one JSON file per key under the data
//! directory; an in-memory backend serves tests and ephemeral runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Errors from a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage read failed for '{key}': {source}")]
    Read {
        key: String,
        source: std::io::Error,
    },
    #[error("Storage write failed for '{key}': {source}")]
    Write {
        key: String,
        source: std::io::Error,
    },
}

/// Get/put over opaque string keys.
pub trait Storage {
    /// Fetch the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for &S {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).put(key, value)
    }
}

/// File-per-key storage rooted at a directory.
///
/// Filenames are derived from a sha256 hash of the key, so arbitrary key
/// strings (user emails, slash-separated namespaces) stay filesystem-safe.
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create a store under the platform data directory,
    /// e.g. `~/.local/share/reel-composer/store/`.
    pub fn with_default_dir() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".data"))
            .join("reel-composer")
            .join("store");
        Self::new(root)
    }

    /// Directory this store writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        // First 16 bytes keep filenames short while staying collision-safe.
        self.root.join(format!("{}.json", hex::encode(&digest[..16])))
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_string(),
                source: e,
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StorageError::Write {
            key: key.to_string(),
            source: e,
        })?;
        std::fs::write(self.path_for(key), value).map_err(|e| StorageError::Write {
            key: key.to_string(),
            source: e,
        })
    }
}

/// In-memory storage for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().expect("storage lock").get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .expect("storage lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
