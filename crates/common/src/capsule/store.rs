use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use blob_store::BlobLocator;

use super::{Capsule, ContentKind};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Error from a capsule store backend.
///
/// Kept concrete so the store trait stays object safe; the underlying
/// driver error rides along as the source.
#[derive(Debug, thiserror::Error)]
#[error("capsule store error: {0}")]
pub struct StoreError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Outcome of the conditional LOCKED -> UNLOCKED flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockFlip {
    /// This call performed the transition.
    Flipped,
    /// Another path got there first; re-read for the canonical `unlocked_at`.
    AlreadyUnlocked,
    /// The record no longer exists.
    Gone,
}

/// Replacement payload coordinates. These five fields always change together.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadChange {
    pub filename: String,
    pub content_kind: ContentKind,
    pub payload_size: u64,
    pub locator: BlobLocator,
    pub iv: Vec<u8>,
}

/// Partial update to a capsule record. Absent fields are left untouched;
/// `updated_at` refreshes whenever anything changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapsuleChanges {
    pub description: Option<String>,
    pub unlock_at: Option<OffsetDateTime>,
    pub payload: Option<PayloadChange>,
}

impl CapsuleChanges {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.unlock_at.is_none() && self.payload.is_none()
    }
}

/// 1-based page coordinates for list queries.
///
/// Out-of-range values fall back to the defaults rather than erroring, so a
/// sloppy query string never breaks a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        let page = if page >= 1 {
            page.min(u32::MAX as i64) as u32
        } else {
            1
        };
        let limit = if (1..=MAX_PAGE_LIMIT as i64).contains(&limit) {
            limit as u32
        } else {
            DEFAULT_PAGE_LIMIT
        };
        Self { page, limit }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of results plus enough bookkeeping to render pagination.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matching records across all pages.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit as u64)
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Per-kind capsule counts for the stats view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindBreakdown {
    pub text: u64,
    pub image: u64,
    pub video: u64,
    pub audio: u64,
    pub other: u64,
}

impl KindBreakdown {
    pub fn bump(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Text => self.text += 1,
            ContentKind::Image => self.image += 1,
            ContentKind::Video => self.video += 1,
            ContentKind::Audio => self.audio += 1,
            ContentKind::Other => self.other += 1,
        }
    }
}

/// Aggregate counts over every capsule a user is on, as owner or recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapsuleStats {
    pub total: u64,
    pub locked: u64,
    pub unlocked: u64,
    /// Locked capsules due within the next seven days.
    pub unlocking_soon: u64,
    pub by_kind: KindBreakdown,
}

/// Metadata persistence for capsules.
///
/// Implementations: the daemon's SQLite store and [`MemoryCapsuleStore`]
/// for tests.
///
/// [`MemoryCapsuleStore`]: super::MemoryCapsuleStore
#[async_trait]
pub trait CapsuleStore: Send + Sync + 'static {
    async fn insert(&self, capsule: &Capsule) -> Result<(), StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Capsule>, StoreError>;

    /// Apply a partial update.
    ///
    /// # Returns
    /// * `Ok(true)` - The row existed and was updated
    /// * `Ok(false)` - The row is gone
    async fn update_fields(&self, id: Uuid, changes: CapsuleChanges) -> Result<bool, StoreError>;

    /// Remove a record. Returns whether a row was actually deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Capsules where the user is owner or recipient, newest first.
    ///
    /// # Arguments
    /// * `user_id` - Matched against owner and recipient columns
    /// * `include_locked` - When false, narrows to UNLOCKED capsules only
    /// * `page` - 1-based page coordinates
    async fn list_for_user(
        &self,
        user_id: Uuid,
        include_locked: bool,
        page: PageRequest,
    ) -> Result<Page<Capsule>, StoreError>;

    /// Locked capsules whose release date has passed, oldest `unlock_at`
    /// first. This is the sweep's work query and must stay cheap.
    async fn due_for_unlock(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<Capsule>, StoreError>;

    /// Conditionally flip a capsule to UNLOCKED.
    ///
    /// Must be a single atomic compare-and-set on the state column: under
    /// concurrent callers exactly one observes [`UnlockFlip::Flipped`].
    async fn mark_unlocked(&self, id: Uuid, at: OffsetDateTime) -> Result<UnlockFlip, StoreError>;

    async fn stats_for_user(&self, user_id: Uuid) -> Result<CapsuleStats, StoreError>;
}
