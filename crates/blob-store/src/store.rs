//! Routing facade over the primary and legacy backends.

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{BlobStoreError, Result};
use crate::legacy::LegacyStore;
use crate::locator::BlobLocator;
use crate::primary::{PrimaryStore, PrimaryStoreConfig};

/// Configuration for the legacy chunk store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyStoreConfig {
    /// Path to the legacy SQLite database file
    pub path: PathBuf,
}

/// Combined blob storage configuration: the primary backend plus an
/// optional legacy chunk store for migrated records.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlobStoreConfig {
    #[serde(flatten)]
    pub primary: PrimaryStoreConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyStoreConfig>,
}

/// Blob storage facade.
///
/// Writes always land in the primary backend; reads and deletes route on
/// the locator tag. A deployment without migrated records runs without a
/// legacy store at all, in which case `legacy:` locators are a
/// configuration error rather than a miss.
#[derive(Debug, Clone)]
pub struct BlobStore {
    primary: PrimaryStore,
    legacy: Option<LegacyStore>,
}

impl BlobStore {
    pub fn new(primary: PrimaryStore, legacy: Option<LegacyStore>) -> Self {
        Self { primary, legacy }
    }

    /// Build the facade from configuration, failing fast on unreachable
    /// backends.
    pub async fn from_config(config: &BlobStoreConfig) -> Result<Self> {
        match &config.primary {
            PrimaryStoreConfig::Memory => {
                tracing::info!("blob store: in-memory primary backend");
            }
            PrimaryStoreConfig::Local { path } => {
                tracing::info!(path = %path.display(), "blob store: local filesystem primary backend");
            }
            PrimaryStoreConfig::S3 {
                endpoint, bucket, ..
            } => {
                tracing::info!(%endpoint, %bucket, "blob store: S3 primary backend");
            }
        }
        let primary = PrimaryStore::from_config(&config.primary).await?;

        let legacy = match &config.legacy {
            Some(legacy_config) => {
                tracing::info!(path = %legacy_config.path.display(), "blob store: legacy chunk store attached");
                Some(LegacyStore::new(&legacy_config.path).await?)
            }
            None => None,
        };

        Ok(Self { primary, legacy })
    }

    /// In-memory facade with no legacy store, for tests and dev runs.
    pub fn memory() -> Self {
        Self {
            primary: PrimaryStore::memory(),
            legacy: None,
        }
    }

    /// Store a payload. New writes go to the primary backend only; the
    /// returned locator is what callers persist.
    pub async fn put(&self, data: Bytes, hint: &str) -> Result<BlobLocator> {
        let key = self.primary.put(hint, data).await?;
        Ok(BlobLocator::primary(key))
    }

    /// Fetch a payload by locator. Absent objects are `None`.
    pub async fn get(&self, locator: &BlobLocator) -> Result<Option<Bytes>> {
        match locator {
            BlobLocator::Primary { key } => self.primary.get(key).await,
            BlobLocator::Legacy { id } => self.legacy(locator)?.get(*id).await,
        }
    }

    /// Delete a payload by locator. Returns whether anything was removed;
    /// deleting an already-absent object is not an error.
    pub async fn delete(&self, locator: &BlobLocator) -> Result<bool> {
        match locator {
            BlobLocator::Primary { key } => self.primary.delete(key).await,
            BlobLocator::Legacy { id } => self.legacy(locator)?.delete(*id).await,
        }
    }

    pub fn has_legacy(&self) -> bool {
        self.legacy.is_some()
    }

    fn legacy(&self, locator: &BlobLocator) -> Result<&LegacyStore> {
        self.legacy
            .as_ref()
            .ok_or_else(|| BlobStoreError::LegacyUnavailable(locator.to_string()))
    }
}
