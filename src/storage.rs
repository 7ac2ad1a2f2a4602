//! Persisted credential storage.
//!
//! DESIGN
//! ======
//! A flat string key/value store, the same shape browser `localStorage`
//! offers. The session layer only ever touches the two fixed keys below, so
//! other tools sharing the store can find the tokens by name.
//!
//! `FileStore` rewrites the whole JSON object through a temp file + rename,
//! so a crash mid-write leaves the previous contents intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Storage key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "token";
/// Storage key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Synchronous key/value store for credentials.
///
/// Calls are short and never held across `.await`.
pub trait TokenStore: Send + Sync {
    /// Read a value, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// The access/refresh pair issued at login.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Credentials {
    pub access: String,
    pub refresh: String,
}

pub fn load_access_token(store: &dyn TokenStore) -> Result<Option<String>, StorageError> {
    Ok(store.get(ACCESS_TOKEN_KEY)?.filter(|t| !t.is_empty()))
}

pub fn load_refresh_token(store: &dyn TokenStore) -> Result<Option<String>, StorageError> {
    Ok(store.get(REFRESH_TOKEN_KEY)?.filter(|t| !t.is_empty()))
}

/// Both tokens, or `None` if either is missing.
pub fn load_credentials(store: &dyn TokenStore) -> Result<Option<Credentials>, StorageError> {
    let access = load_access_token(store)?;
    let refresh = load_refresh_token(store)?;
    Ok(access.zip(refresh).map(|(access, refresh)| Credentials { access, refresh }))
}

pub fn store_credentials(store: &dyn TokenStore, credentials: &Credentials) -> Result<(), StorageError> {
    store.set(ACCESS_TOKEN_KEY, &credentials.access)?;
    store.set(REFRESH_TOKEN_KEY, &credentials.refresh)
}

pub fn clear_credentials(store: &dyn TokenStore) -> Result<(), StorageError> {
    store.remove(ACCESS_TOKEN_KEY)?;
    store.remove(REFRESH_TOKEN_KEY)
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with an access/refresh pair.
    #[must_use]
    pub fn with_credentials(access: &str, refresh: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
        entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
        Self { entries: Mutex::new(entries) }
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// Store persisted as a JSON object on disk, shared across CLI invocations.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.read_all()?;
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl TokenStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
