use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::secure_storage::SecureStorage;

/// String key/value persistence, the client-side equivalent of browser
/// `localStorage`. Values are opaque strings.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
    /// Remove every key.
    fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// A JSON object on disk (`{"key": "value", ...}`), rewritten on every
/// mutation. A missing or corrupt file reads as empty.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_map(&self) -> HashMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), "storage file is corrupt, treating as empty: {e}");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    fn save_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write storage file: {}", self.path.display()))?;

        // Owner-only on Unix (0o600 = rw-------); the file may hold credentials.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .context("failed to set storage file permissions")?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_map().remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut map = self.load_map();
        map.insert(key.to_string(), value.to_string());
        self.save_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut map = self.load_map();
        if map.remove(key).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EncryptedStore
// ---------------------------------------------------------------------------

/// Wraps another store and encrypts every value with [`SecureStorage`]
/// before it reaches the inner store. Values that fail to decrypt (written
/// by another machine, or tampered with) read as absent.
pub struct EncryptedStore<K> {
    inner: K,
    crypto: SecureStorage,
}

impl<K: KeyValueStore> EncryptedStore<K> {
    pub fn new(inner: K, crypto: SecureStorage) -> Self {
        Self { inner, crypto }
    }

    pub fn inner(&self) -> &K {
        &self.inner
    }
}

impl<K: KeyValueStore> KeyValueStore for EncryptedStore<K> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(ciphertext) = self.inner.get(key)? else {
            return Ok(None);
        };
        match self.crypto.decrypt(&ciphertext) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                debug!(key, "discarding undecryptable value: {e}");
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let ciphertext = self.crypto.encrypt(value)?;
        self.inner.set(key, &ciphertext)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}
