use time::OffsetDateTime;

use blob_store::BlobStoreError;

use crate::crypto::CipherError;
use crate::directory::DirectoryError;

use super::store::StoreError;

/// Errors surfaced by the capsule engine.
///
/// Every variant is a distinct caller-visible kind; backend detail stays in
/// the source chain and the logs, never in the message shown to callers.
#[derive(Debug, thiserror::Error)]
pub enum CapsuleError {
    /// Malformed or incomplete input: missing recipient, self-send,
    /// disallowed extension, oversized payload, empty update.
    #[error("{0}")]
    Validation(String),
    /// The capsule does not exist, or the requester has no relation to it.
    #[error("capsule not found")]
    NotFound,
    /// The requester is on the capsule but lacks this particular right.
    #[error("not allowed")]
    Forbidden,
    /// Unlock attempted before the release date.
    #[error("capsule is not ready to be unlocked until {unlock_at}")]
    NotYetDue { unlock_at: OffsetDateTime },
    /// Update attempted on a capsule that has already been released.
    #[error("capsule is already unlocked and can no longer be updated")]
    Frozen,
    /// A blob or metadata backend fault.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The stored payload failed authentication.
    #[error("payload could not be decrypted: {0}")]
    Decryption(#[source] CipherError),
}

impl CapsuleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CapsuleError::Validation(msg.into())
    }
}

impl From<StoreError> for CapsuleError {
    fn from(err: StoreError) -> Self {
        CapsuleError::Storage(Box::new(err))
    }
}

impl From<BlobStoreError> for CapsuleError {
    fn from(err: BlobStoreError) -> Self {
        CapsuleError::Storage(Box::new(err))
    }
}

impl From<DirectoryError> for CapsuleError {
    fn from(err: DirectoryError) -> Self {
        CapsuleError::Storage(Box::new(err))
    }
}
