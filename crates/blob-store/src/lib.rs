//! Payload storage for capsules.
//!
//! Ciphertext lives in one of two backends: the primary object store
//! (S3/MinIO/local filesystem/memory) where all new writes land, and a
//! read-mostly legacy chunk store in SQLite that holds records migrated
//! from older deployments. A [`BlobLocator`] tags which backend owns an
//! object; the [`BlobStore`] facade routes by that tag.

mod error;
mod legacy;
mod locator;
mod primary;
mod store;

pub use error::{BlobStoreError, Result};
pub use legacy::{LegacyStore, CHUNK_SIZE};
pub use locator::BlobLocator;
pub use primary::{PrimaryStore, PrimaryStoreConfig};
pub use store::{BlobStore, BlobStoreConfig, LegacyStoreConfig};
