use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use blob_store::{BlobLocator, BlobStore};

use crate::crypto::Cipher;
use crate::directory::UserDirectory;
use crate::identity::Principal;
use crate::outbox::{DispatchReceipt, Outbox};

use super::content::DESCRIPTION_FILENAME;
use super::error::CapsuleError;
use super::store::{
    CapsuleChanges, CapsuleStats, CapsuleStore, Page, PageRequest, PayloadChange, UnlockFlip,
};
use super::{Capsule, CapsuleState, ContentKind};

/// Caps enforced at create and update time.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_payload_bytes: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// An uploaded file: the original name plus raw bytes.
#[derive(Debug, Clone)]
pub struct PayloadUpload {
    pub filename: String,
    pub data: Bytes,
}

/// Inputs for creating a capsule.
#[derive(Debug, Clone)]
pub struct CreateCapsule {
    pub unlock_at: OffsetDateTime,
    pub description: Option<String>,
    pub recipient_id: Option<Uuid>,
    pub recipient_email: Option<String>,
    pub payload: Option<PayloadUpload>,
}

/// Inputs for updating a capsule. Everything is optional, but at least one
/// field must be provided; a blank description counts as not provided.
#[derive(Debug, Clone, Default)]
pub struct UpdateCapsule {
    pub description: Option<String>,
    pub unlock_at: Option<OffsetDateTime>,
    pub payload: Option<PayloadUpload>,
}

/// A released payload together with its record.
#[derive(Debug, Clone)]
pub struct UnlockedPayload {
    pub capsule: Capsule,
    pub data: Bytes,
    /// True when this call performed the release.
    pub freshly_unlocked: bool,
    /// What the release dispatched; empty unless `freshly_unlocked`.
    pub receipt: DispatchReceipt,
}

/// Result of an update: the new record plus the date it replaced.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub capsule: Capsule,
    pub previous_unlock_at: OffsetDateTime,
}

/// Drives every capsule state transition.
///
/// The engine owns the ordering guarantees: a payload is sealed and stored
/// before its record exists, decryption always precedes the unlock flip, and
/// release notices go out exactly once, from whichever caller wins that flip.
#[derive(Clone)]
pub struct CapsuleEngine {
    store: Arc<dyn CapsuleStore>,
    blobs: BlobStore,
    cipher: Cipher,
    directory: Arc<dyn UserDirectory>,
    outbox: Arc<Outbox>,
    limits: EngineLimits,
}

impl CapsuleEngine {
    pub fn new(
        store: Arc<dyn CapsuleStore>,
        blobs: BlobStore,
        cipher: Cipher,
        directory: Arc<dyn UserDirectory>,
        outbox: Arc<Outbox>,
        limits: EngineLimits,
    ) -> Self {
        Self {
            store,
            blobs,
            cipher,
            directory,
            outbox,
            limits,
        }
    }

    /// Create a LOCKED capsule: validate, seal the payload, store the blob,
    /// insert the record, then notify the recipient.
    ///
    /// `unlock_at` may be any timestamp. A date already in the past simply
    /// makes the capsule due on the next sweep.
    pub async fn create(
        &self,
        owner: &Principal,
        input: CreateCapsule,
    ) -> Result<Capsule, CapsuleError> {
        let description = normalize_text(input.description);
        let supplied_email = normalize_text(input.recipient_email);

        if input.recipient_id.is_none() && supplied_email.is_none() {
            return Err(CapsuleError::validation(
                "a recipient id or recipient email is required",
            ));
        }
        if input.recipient_id == Some(owner.id) {
            return Err(CapsuleError::validation(
                "you cannot address a capsule to yourself",
            ));
        }
        if let Some(email) = &supplied_email {
            if email.eq_ignore_ascii_case(&owner.email) {
                return Err(CapsuleError::validation(
                    "you cannot address a capsule to yourself",
                ));
            }
        }

        let (recipient_id, recipient_email) = self
            .resolve_recipient(owner, input.recipient_id, supplied_email)
            .await?;

        let (filename, content_kind, plaintext) =
            match (&input.payload, description.as_deref()) {
                (Some(upload), _) => {
                    let kind = self.validate_upload(upload)?;
                    (upload.filename.clone(), kind, upload.data.clone())
                }
                (None, Some(text)) => (
                    DESCRIPTION_FILENAME.to_string(),
                    ContentKind::Text,
                    Bytes::copy_from_slice(text.as_bytes()),
                ),
                (None, None) => {
                    return Err(CapsuleError::validation(
                        "a capsule needs content: a file, a description, or both",
                    ))
                }
            };

        let sealed = self
            .cipher
            .encrypt(&plaintext)
            .map_err(|e| CapsuleError::Storage(Box::new(e)))?;
        let hint = format!("capsules/{}", owner.id);
        let locator = self.blobs.put(Bytes::from(sealed.ciphertext), &hint).await?;

        let now = OffsetDateTime::now_utc();
        let capsule = Capsule {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            recipient_id,
            recipient_email,
            description,
            filename,
            content_kind,
            payload_size: plaintext.len() as u64,
            locator: locator.clone(),
            iv: sealed.iv.to_vec(),
            state: CapsuleState::Locked,
            unlock_at: input.unlock_at,
            unlocked_at: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.store.insert(&capsule).await {
            // The record never existed; reclaim the blob rather than orphan it.
            self.discard_blob(&locator).await;
            return Err(err.into());
        }

        let receipt = self.outbox.capsule_created(&capsule).await;
        tracing::info!(
            capsule_id = %capsule.id,
            kind = content_kind.as_str(),
            emailed = receipt.emailed,
            "capsule created"
        );

        Ok(capsule)
    }

    /// Metadata for owner or recipient. Anyone else gets NotFound,
    /// indistinguishable from a nonexistent id.
    pub async fn get_metadata(
        &self,
        requester: &Principal,
        id: Uuid,
    ) -> Result<Capsule, CapsuleError> {
        let capsule = self.store.fetch(id).await?.ok_or(CapsuleError::NotFound)?;
        if !capsule.involves(requester) {
            return Err(CapsuleError::NotFound);
        }
        Ok(capsule)
    }

    /// Recipient-triggered release.
    ///
    /// The owner can watch the countdown but not skip it; before `unlock_at`
    /// the call carries the date back in [`CapsuleError::NotYetDue`].
    /// Unlocking an already-released capsule is idempotent.
    pub async fn unlock(
        &self,
        requester: &Principal,
        id: Uuid,
    ) -> Result<UnlockedPayload, CapsuleError> {
        let capsule = self.store.fetch(id).await?.ok_or(CapsuleError::NotFound)?;
        if !capsule.involves(requester) {
            return Err(CapsuleError::NotFound);
        }
        if !capsule.is_recipient(requester) {
            return Err(CapsuleError::Forbidden);
        }

        let now = OffsetDateTime::now_utc();
        if capsule.is_locked() && capsule.unlock_at > now {
            return Err(CapsuleError::NotYetDue {
                unlock_at: capsule.unlock_at,
            });
        }

        self.release(capsule).await
    }

    /// Scheduler-triggered release: no requester gates, no due-ness check.
    /// The sweep's due query is the gate.
    pub async fn unlock_unattended(&self, id: Uuid) -> Result<UnlockedPayload, CapsuleError> {
        let capsule = self.store.fetch(id).await?.ok_or(CapsuleError::NotFound)?;
        self.release(capsule).await
    }

    /// Fetch the payload of an already-released capsule.
    pub async fn download(
        &self,
        requester: &Principal,
        id: Uuid,
    ) -> Result<UnlockedPayload, CapsuleError> {
        let capsule = self.store.fetch(id).await?.ok_or(CapsuleError::NotFound)?;
        if !capsule.involves(requester) {
            return Err(CapsuleError::NotFound);
        }
        if capsule.is_locked() {
            return Err(CapsuleError::NotYetDue {
                unlock_at: capsule.unlock_at,
            });
        }

        let data = self.read_payload(&capsule).await?;
        Ok(UnlockedPayload {
            capsule,
            data,
            freshly_unlocked: false,
            receipt: DispatchReceipt::default(),
        })
    }

    /// Owner-only edit of a still-LOCKED capsule.
    ///
    /// Description changes are metadata only; the sealed text of a
    /// text-only capsule stays what it was at creation. Moving `unlock_at`
    /// notifies the recipient of the new date.
    pub async fn update(
        &self,
        requester: &Principal,
        id: Uuid,
        input: UpdateCapsule,
    ) -> Result<UpdateOutcome, CapsuleError> {
        let capsule = self.store.fetch(id).await?.ok_or(CapsuleError::NotFound)?;
        if !capsule.involves(requester) {
            return Err(CapsuleError::NotFound);
        }
        if !capsule.is_owner(requester.id) {
            return Err(CapsuleError::Forbidden);
        }
        if capsule.is_unlocked() {
            return Err(CapsuleError::Frozen);
        }

        let description = normalize_text(input.description);
        if description.is_none() && input.unlock_at.is_none() && input.payload.is_none() {
            return Err(CapsuleError::validation("nothing to update"));
        }

        let previous_unlock_at = capsule.unlock_at;

        // Write the replacement blob before touching the record, so the
        // record never points at a locator that does not exist.
        let mut replaced_locator = None;
        let payload_change = match &input.payload {
            Some(upload) => {
                let kind = self.validate_upload(upload)?;
                let sealed = self
                    .cipher
                    .encrypt(&upload.data)
                    .map_err(|e| CapsuleError::Storage(Box::new(e)))?;
                let hint = format!("capsules/{}", capsule.owner_id);
                let locator = self.blobs.put(Bytes::from(sealed.ciphertext), &hint).await?;
                replaced_locator = Some(capsule.locator.clone());
                Some(PayloadChange {
                    filename: upload.filename.clone(),
                    content_kind: kind,
                    payload_size: upload.data.len() as u64,
                    locator,
                    iv: sealed.iv.to_vec(),
                })
            }
            None => None,
        };

        let new_locator = payload_change.as_ref().map(|p| p.locator.clone());
        let changes = CapsuleChanges {
            description,
            unlock_at: input.unlock_at,
            payload: payload_change,
        };
        match self.store.update_fields(id, changes).await {
            Ok(true) => {}
            Ok(false) => {
                if let Some(locator) = &new_locator {
                    self.discard_blob(locator).await;
                }
                return Err(CapsuleError::NotFound);
            }
            Err(err) => {
                if let Some(locator) = &new_locator {
                    self.discard_blob(locator).await;
                }
                return Err(err.into());
            }
        }

        // The old payload is unreferenced now; a failed delete only leaks
        // a blob, so log and move on.
        if let Some(old) = replaced_locator {
            if let Err(err) = self.blobs.delete(&old).await {
                tracing::warn!(capsule_id = %id, locator = %old, "failed to delete replaced blob: {err}");
            }
        }

        let updated = self.store.fetch(id).await?.ok_or(CapsuleError::NotFound)?;

        if let Some(new_date) = input.unlock_at {
            if new_date != previous_unlock_at {
                let receipt = self.outbox.unlock_date_changed(&updated, previous_unlock_at).await;
                tracing::info!(
                    capsule_id = %id,
                    emailed = receipt.emailed,
                    "unlock date changed"
                );
            }
        }

        Ok(UpdateOutcome {
            capsule: updated,
            previous_unlock_at,
        })
    }

    /// Owner-only removal. Works on UNLOCKED capsules too.
    pub async fn delete(&self, requester: &Principal, id: Uuid) -> Result<(), CapsuleError> {
        let capsule = self.store.fetch(id).await?.ok_or(CapsuleError::NotFound)?;
        if !capsule.involves(requester) {
            return Err(CapsuleError::NotFound);
        }
        if !capsule.is_owner(requester.id) {
            return Err(CapsuleError::Forbidden);
        }

        // Blob cleanup is best effort; the record delete is authoritative.
        if let Err(err) = self.blobs.delete(&capsule.locator).await {
            tracing::warn!(capsule_id = %id, locator = %capsule.locator, "failed to delete payload blob: {err}");
        }
        if !self.store.delete(id).await? {
            return Err(CapsuleError::NotFound);
        }

        tracing::info!(capsule_id = %id, "capsule deleted");
        Ok(())
    }

    /// Capsules the requester is on, newest first.
    pub async fn list(
        &self,
        requester: &Principal,
        include_locked: bool,
        page: PageRequest,
    ) -> Result<Page<Capsule>, CapsuleError> {
        Ok(self
            .store
            .list_for_user(requester.id, include_locked, page)
            .await?)
    }

    pub async fn stats(&self, requester: &Principal) -> Result<CapsuleStats, CapsuleError> {
        Ok(self.store.stats_for_user(requester.id).await?)
    }

    /// The sweep's work query: locked capsules past their release date.
    pub async fn due_for_unlock(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<Capsule>, CapsuleError> {
        Ok(self.store.due_for_unlock(now, limit).await?)
    }

    /// Shared release path: decrypt first, then take the conditional flip,
    /// and dispatch notices only when this call won it. A payload that fails
    /// authentication leaves the capsule LOCKED.
    async fn release(&self, mut capsule: Capsule) -> Result<UnlockedPayload, CapsuleError> {
        let plaintext = self.read_payload(&capsule).await?;

        let now = OffsetDateTime::now_utc();
        match self.store.mark_unlocked(capsule.id, now).await? {
            UnlockFlip::Flipped => {
                capsule.state = CapsuleState::Unlocked;
                capsule.unlocked_at = Some(now);
                capsule.updated_at = now;

                let receipt = self.outbox.capsule_unlocked(&capsule).await;
                tracing::info!(
                    capsule_id = %capsule.id,
                    emailed = receipt.emailed,
                    notified = receipt.notified,
                    "capsule unlocked"
                );

                Ok(UnlockedPayload {
                    capsule,
                    data: plaintext,
                    freshly_unlocked: true,
                    receipt,
                })
            }
            UnlockFlip::AlreadyUnlocked => {
                // Another path won the flip; its timestamp and notices stand.
                let capsule = self
                    .store
                    .fetch(capsule.id)
                    .await?
                    .ok_or(CapsuleError::NotFound)?;
                Ok(UnlockedPayload {
                    capsule,
                    data: plaintext,
                    freshly_unlocked: false,
                    receipt: DispatchReceipt::default(),
                })
            }
            UnlockFlip::Gone => Err(CapsuleError::NotFound),
        }
    }

    async fn read_payload(&self, capsule: &Capsule) -> Result<Bytes, CapsuleError> {
        let ciphertext = self.blobs.get(&capsule.locator).await?.ok_or_else(|| {
            tracing::error!(
                capsule_id = %capsule.id,
                locator = %capsule.locator,
                "payload blob missing for live capsule"
            );
            CapsuleError::Storage(
                format!("payload blob missing for capsule {}", capsule.id).into(),
            )
        })?;

        let plaintext = self.cipher.decrypt(&capsule.iv, &ciphertext).map_err(|err| {
            tracing::error!(
                capsule_id = %capsule.id,
                "payload failed authentication, capsule stays locked: {err}"
            );
            CapsuleError::Decryption(err)
        })?;

        Ok(plaintext.into())
    }

    fn validate_upload(&self, upload: &PayloadUpload) -> Result<ContentKind, CapsuleError> {
        let kind = ContentKind::from_filename(&upload.filename).ok_or_else(|| {
            CapsuleError::validation(format!(
                "file type not allowed for '{}'; allowed extensions: {}",
                upload.filename,
                ContentKind::allowed_extensions().join(", ")
            ))
        })?;
        if upload.data.len() as u64 > self.limits.max_payload_bytes {
            return Err(CapsuleError::validation(format!(
                "payload exceeds the limit of {} bytes",
                self.limits.max_payload_bytes
            )));
        }
        Ok(kind)
    }

    /// Settle recipient coordinates. Referenced ids must exist; bare emails
    /// attach to the matching account when there is one, and the directory
    /// address wins over whatever was typed in.
    async fn resolve_recipient(
        &self,
        owner: &Principal,
        recipient_id: Option<Uuid>,
        recipient_email: Option<String>,
    ) -> Result<(Option<Uuid>, Option<String>), CapsuleError> {
        if let Some(id) = recipient_id {
            let record = self
                .directory
                .lookup(id)
                .await?
                .ok_or(CapsuleError::NotFound)?;
            return Ok((Some(record.id), Some(record.email)));
        }

        let Some(email) = recipient_email else {
            return Err(CapsuleError::validation(
                "a recipient id or recipient email is required",
            ));
        };
        match self.directory.find_by_email(&email).await? {
            Some(record) => {
                if record.id == owner.id {
                    return Err(CapsuleError::validation(
                        "you cannot address a capsule to yourself",
                    ));
                }
                Ok((Some(record.id), Some(record.email)))
            }
            None => Ok((None, Some(email))),
        }
    }

    /// Best-effort cleanup of a blob that never made it into a record.
    async fn discard_blob(&self, locator: &BlobLocator) {
        if let Err(err) = self.blobs.delete(locator).await {
            tracing::warn!(locator = %locator, "failed to discard orphaned blob: {err}");
        }
    }
}

/// Blank strings count as "not provided".
fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
