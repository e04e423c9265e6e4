use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

/// A registered user as the directory sees them. Accounts are provisioned
/// out-of-band; this crate only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("user directory error: {0}")]
pub struct DirectoryError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl DirectoryError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Lookup of registered users, used to resolve capsule recipients and to
/// personalize outbound notices.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn lookup(&self, id: Uuid) -> Result<Option<UserRecord>, DirectoryError>;

    /// Email matching is case-insensitive.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError>;

    async fn find_by_display_name(&self, name: &str) -> Result<Option<UserRecord>, DirectoryError>;

    /// Substring search over email and display name for recipient pickers.
    ///
    /// # Arguments
    /// * `query` - Matched case-insensitively; a blank query matches nothing
    /// * `exclude` - A user never appears in their own search results
    /// * `limit` - Cap on returned records
    async fn search(
        &self,
        query: &str,
        exclude: Uuid,
        limit: u32,
    ) -> Result<Vec<UserRecord>, DirectoryError>;
}

/// In-memory directory for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<HashMap<Uuid, UserRecord>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with a fresh id and hand back the record.
    pub fn register(&self, email: &str, display_name: &str) -> UserRecord {
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        };
        self.inner.write().insert(record.id, record.clone());
        record
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn lookup(&self, id: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.inner.read().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self
            .inner
            .read()
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_display_name(&self, name: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self
            .inner
            .read()
            .values()
            .find(|u| u.display_name == name)
            .cloned())
    }

    async fn search(
        &self,
        query: &str,
        exclude: Uuid,
        limit: u32,
    ) -> Result<Vec<UserRecord>, DirectoryError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<UserRecord> = self
            .inner
            .read()
            .values()
            .filter(|u| u.id != exclude)
            .filter(|u| {
                u.email.to_lowercase().contains(&query)
                    || u.display_name.to_lowercase().contains(&query)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        matches.truncate(limit as usize);

        Ok(matches)
    }
}
