use std::io;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("no legacy store configured, cannot read {0}")]
    LegacyUnavailable(String),
}

pub type Result<T> = std::result::Result<T, BlobStoreError>;
