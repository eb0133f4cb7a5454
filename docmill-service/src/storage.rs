//! Storage backends for uploaded document bytes.
//!
//! The pipeline only ever sees opaque locators; which backend is active is
//! decided once at startup from configuration.

use dashmap::DashMap;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageKind};
use crate::error::{ServiceResult, StorageError};

/// Closed set of storage backend implementations.
pub enum StorageBackend {
    Local(LocalStorage),
    Memory(MemoryStorage),
}

impl StorageBackend {
    /// Resolve the configured backend. Called once at startup.
    pub fn from_config(config: &StorageConfig) -> ServiceResult<Self> {
        match config.backend {
            StorageKind::Local => Ok(StorageBackend::Local(LocalStorage::new(
                config.data_dir.join("files"),
            )?)),
            StorageKind::Memory => Ok(StorageBackend::Memory(MemoryStorage::new())),
        }
    }

    /// Read the full byte content behind a locator
    pub async fn read(&self, locator: &str) -> ServiceResult<Vec<u8>> {
        match self {
            StorageBackend::Local(s) => s.read(locator).await,
            StorageBackend::Memory(s) => s.read(locator),
        }
    }

    /// Store bytes under a fresh locator derived from the given name
    pub async fn write(&self, bytes: &[u8], name: &str) -> ServiceResult<String> {
        match self {
            StorageBackend::Local(s) => s.write(bytes, name).await,
            StorageBackend::Memory(s) => s.write(bytes, name),
        }
    }

    pub async fn exists(&self, locator: &str) -> bool {
        match self {
            StorageBackend::Local(s) => s.exists(locator).await,
            StorageBackend::Memory(s) => s.exists(locator),
        }
    }

    pub async fn delete(&self, locator: &str) -> ServiceResult<bool> {
        match self {
            StorageBackend::Local(s) => s.delete(locator).await,
            StorageBackend::Memory(s) => s.delete(locator),
        }
    }

    pub async fn list(&self) -> ServiceResult<Vec<String>> {
        match self {
            StorageBackend::Local(s) => s.list().await,
            StorageBackend::Memory(s) => Ok(s.list()),
        }
    }
}

/// Local filesystem storage rooted at a data directory
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> ServiceResult<Self> {
        std::fs::create_dir_all(&root).map_err(StorageError::Io)?;
        Ok(Self { root })
    }

    fn path_for(&self, locator: &str) -> PathBuf {
        self.root.join(locator)
    }

    async fn read(&self, locator: &str) -> ServiceResult<Vec<u8>> {
        let path = self.path_for(locator);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    locator: locator.to_string(),
                }
                .into()
            } else {
                StorageError::Io(e).into()
            }
        })
    }

    async fn write(&self, bytes: &[u8], name: &str) -> ServiceResult<String> {
        let locator = make_locator(name);
        let path = self.path_for(&locator);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(StorageError::Io)?;
        debug!(locator = %locator, bytes = bytes.len(), "Stored file");
        Ok(locator)
    }

    async fn exists(&self, locator: &str) -> bool {
        tokio::fs::try_exists(self.path_for(locator))
            .await
            .unwrap_or(false)
    }

    async fn delete(&self, locator: &str) -> ServiceResult<bool> {
        match tokio::fs::remove_file(self.path_for(locator)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }

    async fn list(&self) -> ServiceResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(StorageError::Io)?;
        let mut locators = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(StorageError::Io)? {
            if let Some(name) = entry.file_name().to_str() {
                locators.push(name.to_string());
            }
        }
        Ok(locators)
    }
}

/// In-memory storage, used by tests and throwaway deployments
pub struct MemoryStorage {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    fn read(&self, locator: &str) -> ServiceResult<Vec<u8>> {
        self.objects
            .get(locator)
            .map(|v| v.clone())
            .ok_or_else(|| {
                StorageError::NotFound {
                    locator: locator.to_string(),
                }
                .into()
            })
    }

    fn write(&self, bytes: &[u8], name: &str) -> ServiceResult<String> {
        let locator = make_locator(name);
        self.objects.insert(locator.clone(), bytes.to_vec());
        Ok(locator)
    }

    fn exists(&self, locator: &str) -> bool {
        self.objects.contains_key(locator)
    }

    fn delete(&self, locator: &str) -> ServiceResult<bool> {
        Ok(self.objects.remove(locator).is_some())
    }

    fn list(&self) -> Vec<String> {
        self.objects.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Locators are uuid-prefixed sanitized file names, unique per write
fn make_locator(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    format!("{}_{}", Uuid::new_v4(), sanitized.trim_matches('_'))
}
