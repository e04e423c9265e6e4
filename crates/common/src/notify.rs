use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

/// An entry in a user's in-app notification feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Capsule the notice refers to, when there is one.
    pub capsule_id: Option<Uuid>,
    pub message: String,
    pub read: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
#[error("notifier error: {0}")]
pub struct NotifyError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl NotifyError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Appends to a user's notification feed. Reading the feed back is an
/// implementation concern, not part of this trait.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(
        &self,
        user_id: Uuid,
        message: &str,
        capsule_id: Option<Uuid>,
    ) -> Result<(), NotifyError>;
}

/// Records notifications in memory for test assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().clone()
    }

    pub fn for_user(&self, user_id: Uuid) -> Vec<Notification> {
        self.sent
            .read()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        message: &str,
        capsule_id: Option<Uuid>,
    ) -> Result<(), NotifyError> {
        self.sent.write().push(Notification {
            id: Uuid::new_v4(),
            user_id,
            capsule_id,
            message: message.to_string(),
            read: false,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }
}
