//! Credential persistence
//!
//! [`CredentialStore`] is the raw key-value surface (browser-storage style).
//! [`CredentialVault`] layers the credential pair on top of it and keeps the
//! pair atomic: both tokens are written as one value under one key.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use super::credentials::Credentials;

/// Store key holding the serialized credential pair
pub const CREDENTIALS_KEY: &str = "stratezone.credentials";

/// Errors that can occur during credential storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error during storage operations
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Durable key-value surface for credentials.
///
/// Calls are synchronous from the caller's point of view.
pub trait CredentialStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value; removing a missing key is not an error
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// JSON file store in the platform config directory
#[derive(Debug)]
pub struct FileCredentialStore {
    storage_path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl Default for FileCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileCredentialStore {
    /// Create a store at the default path (platform-specific config directory)
    #[must_use]
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stratezone");

        Self::with_path(config_dir.join("credentials.json"))
    }

    /// Create a store at a custom path
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            storage_path: path,
            write_lock: Mutex::new(()),
        }
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.storage_path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.storage_path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.storage_path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(map)?;

        // Write to a sibling file and rename so readers never see a torn file
        let tmp_path = self.storage_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp_path, perms)?;
        }

        std::fs::rename(&tmp_path, &self.storage_path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Credential-pair view over a [`CredentialStore`]
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Wrap a store
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Load the stored pair.
    ///
    /// A value that does not decode to a full pair is removed and reported as
    /// absent.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub fn load(&self) -> Result<Option<Credentials>, StoreError> {
        let Some(raw) = self.store.get(CREDENTIALS_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<Credentials>(&raw) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable stored credentials");
                self.store.remove(CREDENTIALS_KEY)?;
                Ok(None)
            }
        }
    }

    /// Replace the stored pair
    ///
    /// # Errors
    /// Returns an error if serialization or the backing store fails.
    pub fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let raw = serde_json::to_string(credentials)?;
        self.store.set(CREDENTIALS_KEY, &raw)
    }

    /// Remove the stored pair
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CREDENTIALS_KEY)
    }

    /// Check if a full pair is stored
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        match self.load() {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Credential store unreadable, treating as signed out");
                false
            }
        }
    }
}
