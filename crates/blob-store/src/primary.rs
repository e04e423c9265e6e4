//! Primary payload backend (S3/MinIO/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BlobStoreError, Result};

/// Configuration for the primary object storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimaryStoreConfig {
    /// Objects held in process memory. For tests and throwaway runs.
    #[default]
    Memory,

    /// Objects spilled under a directory on local disk.
    Local {
        /// Root of the storage directory, created on startup if absent.
        path: PathBuf,
    },

    /// Any S3-compatible service (AWS S3, MinIO, Garage).
    S3 {
        /// Endpoint URL, e.g. "http://localhost:9000" for a local MinIO.
        endpoint: String,
        access_key: String,
        secret_key: String,
        /// Bucket that receives capsule payloads. Must already exist.
        bucket: String,
        /// Defaults to "us-east-1" when unset.
        region: Option<String>,
    },
}

impl PrimaryStoreConfig {
    async fn connect(&self) -> Result<Arc<dyn ObjectStore>> {
        match self {
            Self::Memory => Ok(Arc::new(InMemory::new())),

            Self::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                let fs = LocalFileSystem::new_with_prefix(path)
                    .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?;
                Ok(Arc::new(fs))
            }

            Self::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let store = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"))
                    .build()
                    .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?;
                let store: Arc<dyn ObjectStore> = Arc::new(store);
                verify_bucket(store.as_ref(), bucket).await?;
                Ok(store)
            }
        }
    }
}

/// Fail fast on a missing or unreachable bucket instead of erroring on the
/// first capsule write. One page of listing is enough to prove the bucket
/// answers.
async fn verify_bucket(store: &dyn ObjectStore, bucket: &str) -> Result<()> {
    use futures::TryStreamExt;

    let probe = ObjectPath::from("");
    match store.list(Some(&probe)).try_next().await {
        Ok(_) => Ok(()),
        Err(object_store::Error::NotFound { .. }) => {
            Err(BlobStoreError::BucketNotFound(bucket.to_string()))
        }
        Err(e) => {
            // S3 implementations disagree on how a missing bucket surfaces.
            let msg = e.to_string();
            if msg.contains("NoSuchBucket") || (msg.contains("bucket") && msg.contains("not")) {
                Err(BlobStoreError::BucketNotFound(bucket.to_string()))
            } else {
                Err(e.into())
            }
        }
    }
}

/// Wrapper around the configured object storage backend.
///
/// Objects are write-once: every put mints a fresh key under the caller's
/// hint, so a payload replacement writes a new object rather than mutating
/// the old one in place.
#[derive(Debug, Clone)]
pub struct PrimaryStore {
    inner: Arc<dyn ObjectStore>,
}

impl PrimaryStore {
    /// Create a new storage backend from configuration.
    pub async fn from_config(config: &PrimaryStoreConfig) -> Result<Self> {
        let inner = config.connect().await?;
        Ok(Self { inner })
    }

    /// Create an in-memory backend without going through config.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }

    /// Store a payload under a fresh key scoped by `hint`, returning the key.
    pub async fn put(&self, hint: &str, data: Bytes) -> Result<String> {
        let key = format!("{}/{}", hint.trim_matches('/'), Uuid::new_v4());
        let path = ObjectPath::from(key.as_str());
        self.inner.put(&path, data.into()).await?;
        Ok(key)
    }

    /// Fetch a payload by key. Absent objects are `None`, not an error.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = ObjectPath::from(key);
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a payload by key. Returns whether anything was removed;
    /// an already-absent object is not an error.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let path = ObjectPath::from(key);
        match self.inner.delete(&path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
impl PrimaryStore {
    /// Check whether a key holds an object (test-only).
    pub async fn has(&self, key: &str) -> Result<bool> {
        let path = ObjectPath::from(key);
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List all keys under a prefix (test-only).
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        use futures::TryStreamExt;

        let prefix = ObjectPath::from(prefix);
        let stream = self.inner.list(Some(&prefix));
        let items: Vec<_> = stream.try_collect().await?;

        Ok(items
            .into_iter()
            .map(|meta| meta.location.as_ref().to_string())
            .collect())
    }
}
