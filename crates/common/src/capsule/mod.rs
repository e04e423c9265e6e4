//! Capsule domain model and lifecycle
//!
//! A capsule is an encrypted payload addressed to a recipient, held shut
//! until its release date:
//!
//! - **LOCKED**: metadata (including the plaintext description) is visible to
//!   owner and recipient; payload bytes are readable by no one.
//! - **UNLOCKED**: the payload is released, `unlocked_at` is pinned, and the
//!   record is frozen against further edits (though still deletable).
//!
//! The flip from LOCKED to UNLOCKED happens exactly once per capsule, won by
//! whichever path (recipient request or background sweep) performs the
//! store's conditional update first.

mod content;
mod engine;
mod error;
mod memory;
mod scheduler;
mod store;

pub use content::{
    ContentKind, AUDIO_EXTENSIONS, DESCRIPTION_FILENAME, IMAGE_EXTENSIONS, TEXT_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
pub use engine::{
    CapsuleEngine, CreateCapsule, EngineLimits, PayloadUpload, UnlockedPayload, UpdateCapsule,
    UpdateOutcome,
};
pub use error::CapsuleError;
pub use memory::MemoryCapsuleStore;
pub use scheduler::{
    SchedulerConfig, SchedulerState, SchedulerStatus, SweepReason, SweepSummary, UnlockScheduler,
};
pub use store::{
    CapsuleChanges, CapsuleStats, CapsuleStore, KindBreakdown, Page, PageRequest, PayloadChange,
    StoreError, UnlockFlip, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};

use time::OffsetDateTime;
use uuid::Uuid;

use blob_store::BlobLocator;

use crate::identity::Principal;

/// Whether a capsule is still sealed or has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapsuleState {
    #[default]
    Locked,
    Unlocked,
}

impl CapsuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapsuleState::Locked => "locked",
            CapsuleState::Unlocked => "unlocked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "locked" => CapsuleState::Locked,
            "unlocked" => CapsuleState::Unlocked,
            // A row we cannot interpret stays sealed.
            _ => CapsuleState::Locked,
        }
    }
}

/// A stored capsule record. Payload bytes live in the blob store behind
/// `locator`; everything here is metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Capsule {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Registered recipient, when one resolved at creation.
    pub recipient_id: Option<Uuid>,
    /// Address lifecycle notices go to. For registered recipients this is
    /// their directory address; for external recipients the supplied one.
    pub recipient_email: Option<String>,
    /// Plaintext teaser, visible while locked.
    pub description: Option<String>,
    pub filename: String,
    pub content_kind: ContentKind,
    /// Plaintext size in bytes.
    pub payload_size: u64,
    pub locator: BlobLocator,
    /// Nonce the payload was sealed under.
    pub iv: Vec<u8>,
    pub state: CapsuleState,
    pub unlock_at: OffsetDateTime,
    pub unlocked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Capsule {
    pub fn is_locked(&self) -> bool {
        self.state == CapsuleState::Locked
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == CapsuleState::Unlocked
    }

    /// Still locked and past its release date.
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.is_locked() && self.unlock_at <= now
    }

    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Whether the principal is this capsule's recipient, matched by
    /// registered id or by email (case-insensitive).
    pub fn is_recipient(&self, principal: &Principal) -> bool {
        if self.recipient_id == Some(principal.id) {
            return true;
        }
        match &self.recipient_email {
            Some(email) => email.eq_ignore_ascii_case(&principal.email),
            None => false,
        }
    }

    /// Owner or recipient; everyone else is told the capsule does not exist.
    pub fn involves(&self, principal: &Principal) -> bool {
        self.is_owner(principal.id) || self.is_recipient(principal)
    }
}
