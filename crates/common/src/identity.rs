use async_trait::async_trait;
use uuid::Uuid;

/// An authenticated caller: the resolved identity every engine operation
/// is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
#[error("identity backend error: {0}")]
pub struct IdentityError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl IdentityError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Resolves a bearer token to a principal. `Ok(None)` means the token is
/// unknown or revoked.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn resolve(&self, token: &str) -> Result<Option<Principal>, IdentityError>;
}
