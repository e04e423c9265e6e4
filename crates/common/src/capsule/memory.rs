use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::store::{
    CapsuleChanges, CapsuleStats, CapsuleStore, Page, PageRequest, StoreError, UnlockFlip,
};
use super::{Capsule, CapsuleState};

/// In-memory capsule store backed by a locked map.
///
/// Mirrors the daemon's SQLite store closely enough that engine and
/// scheduler tests can run against it without a database file.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapsuleStore {
    inner: Arc<RwLock<HashMap<Uuid, Capsule>>>,
}

impl MemoryCapsuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait]
impl CapsuleStore for MemoryCapsuleStore {
    async fn insert(&self, capsule: &Capsule) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.contains_key(&capsule.id) {
            return Err(StoreError::new(format!(
                "capsule {} already exists",
                capsule.id
            )));
        }
        inner.insert(capsule.id, capsule.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Capsule>, StoreError> {
        Ok(self.inner.read().get(&id).cloned())
    }

    async fn update_fields(&self, id: Uuid, changes: CapsuleChanges) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let Some(capsule) = inner.get_mut(&id) else {
            return Ok(false);
        };

        if let Some(description) = changes.description {
            capsule.description = Some(description);
        }
        if let Some(unlock_at) = changes.unlock_at {
            capsule.unlock_at = unlock_at;
        }
        if let Some(payload) = changes.payload {
            capsule.filename = payload.filename;
            capsule.content_kind = payload.content_kind;
            capsule.payload_size = payload.payload_size;
            capsule.locator = payload.locator;
            capsule.iv = payload.iv;
        }
        capsule.updated_at = OffsetDateTime::now_utc();

        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.inner.write().remove(&id).is_some())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        include_locked: bool,
        page: PageRequest,
    ) -> Result<Page<Capsule>, StoreError> {
        let inner = self.inner.read();

        let mut matching: Vec<Capsule> = inner
            .values()
            .filter(|c| c.owner_id == user_id || c.recipient_id == Some(user_id))
            .filter(|c| include_locked || c.is_unlocked())
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page: page.page(),
            limit: page.limit(),
        })
    }

    async fn due_for_unlock(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<Capsule>, StoreError> {
        let inner = self.inner.read();

        let mut due: Vec<Capsule> = inner.values().filter(|c| c.is_due(now)).cloned().collect();
        due.sort_by(|a, b| a.unlock_at.cmp(&b.unlock_at));
        due.truncate(limit as usize);

        Ok(due)
    }

    async fn mark_unlocked(&self, id: Uuid, at: OffsetDateTime) -> Result<UnlockFlip, StoreError> {
        let mut inner = self.inner.write();
        let Some(capsule) = inner.get_mut(&id) else {
            return Ok(UnlockFlip::Gone);
        };
        if capsule.is_unlocked() {
            return Ok(UnlockFlip::AlreadyUnlocked);
        }

        capsule.state = CapsuleState::Unlocked;
        capsule.unlocked_at = Some(at);
        capsule.updated_at = at;

        Ok(UnlockFlip::Flipped)
    }

    async fn stats_for_user(&self, user_id: Uuid) -> Result<CapsuleStats, StoreError> {
        let inner = self.inner.read();
        let now = OffsetDateTime::now_utc();
        let soon = now + Duration::days(7);

        let mut stats = CapsuleStats::default();
        for capsule in inner
            .values()
            .filter(|c| c.owner_id == user_id || c.recipient_id == Some(user_id))
        {
            stats.total += 1;
            match capsule.state {
                CapsuleState::Locked => stats.locked += 1,
                CapsuleState::Unlocked => stats.unlocked += 1,
            }
            if capsule.is_locked() && capsule.unlock_at >= now && capsule.unlock_at <= soon {
                stats.unlocking_soon += 1;
            }
            stats.by_kind.bump(capsule.content_kind);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::{ContentKind, PayloadChange, DESCRIPTION_FILENAME};
    use blob_store::BlobLocator;

    fn capsule_for(owner_id: Uuid, recipient_id: Option<Uuid>) -> Capsule {
        let now = OffsetDateTime::now_utc();
        Capsule {
            id: Uuid::new_v4(),
            owner_id,
            recipient_id,
            recipient_email: Some("recipient@example.com".to_string()),
            description: Some("a teaser".to_string()),
            filename: DESCRIPTION_FILENAME.to_string(),
            content_kind: ContentKind::Text,
            payload_size: 16,
            locator: BlobLocator::primary(format!("capsules/{}", Uuid::new_v4())),
            iv: vec![1; 12],
            state: CapsuleState::Locked,
            unlock_at: now + Duration::days(30),
            unlocked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_fetch_round_trip() {
        let store = MemoryCapsuleStore::new();
        let capsule = capsule_for(Uuid::new_v4(), None);

        store.insert(&capsule).await.unwrap();
        let fetched = store.fetch(capsule.id).await.unwrap().unwrap();

        assert_eq!(fetched, capsule);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let store = MemoryCapsuleStore::new();
        let capsule = capsule_for(Uuid::new_v4(), None);

        store.insert(&capsule).await.unwrap();
        assert!(store.insert(&capsule).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_fields_is_partial() {
        let store = MemoryCapsuleStore::new();
        let capsule = capsule_for(Uuid::new_v4(), None);
        store.insert(&capsule).await.unwrap();

        let new_date = capsule.unlock_at + Duration::days(365);
        let updated = store
            .update_fields(
                capsule.id,
                CapsuleChanges {
                    unlock_at: Some(new_date),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let fetched = store.fetch(capsule.id).await.unwrap().unwrap();
        assert_eq!(fetched.unlock_at, new_date);
        // Untouched fields survive.
        assert_eq!(fetched.description, capsule.description);
        assert_eq!(fetched.filename, capsule.filename);
        assert!(fetched.updated_at >= capsule.updated_at);
    }

    #[tokio::test]
    async fn test_update_payload_refreshes_all_coordinates() {
        let store = MemoryCapsuleStore::new();
        let capsule = capsule_for(Uuid::new_v4(), None);
        store.insert(&capsule).await.unwrap();

        let locator = BlobLocator::primary("capsules/replacement");
        store
            .update_fields(
                capsule.id,
                CapsuleChanges {
                    payload: Some(PayloadChange {
                        filename: "sunset.png".to_string(),
                        content_kind: ContentKind::Image,
                        payload_size: 2048,
                        locator: locator.clone(),
                        iv: vec![9; 12],
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = store.fetch(capsule.id).await.unwrap().unwrap();
        assert_eq!(fetched.filename, "sunset.png");
        assert_eq!(fetched.content_kind, ContentKind::Image);
        assert_eq!(fetched.payload_size, 2048);
        assert_eq!(fetched.locator, locator);
        assert_eq!(fetched.iv, vec![9; 12]);
    }

    #[tokio::test]
    async fn test_update_missing_row_reports_gone() {
        let store = MemoryCapsuleStore::new();
        let updated = store
            .update_fields(
                Uuid::new_v4(),
                CapsuleChanges {
                    description: Some("ghost".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = MemoryCapsuleStore::new();
        let capsule = capsule_for(Uuid::new_v4(), None);
        store.insert(&capsule).await.unwrap();

        assert!(store.delete(capsule.id).await.unwrap());
        assert!(!store.delete(capsule.id).await.unwrap());
        assert!(store.fetch(capsule.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_newest_first() {
        let store = MemoryCapsuleStore::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let mut owned = capsule_for(user, None);
        owned.created_at = now - Duration::hours(2);
        let mut received = capsule_for(Uuid::new_v4(), Some(user));
        received.created_at = now - Duration::hours(1);
        let unrelated = capsule_for(Uuid::new_v4(), None);

        store.insert(&owned).await.unwrap();
        store.insert(&received).await.unwrap();
        store.insert(&unrelated).await.unwrap();

        let page = store
            .list_for_user(user, true, PageRequest::default())
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, received.id);
        assert_eq!(page.items[1].id, owned.id);
    }

    #[tokio::test]
    async fn test_list_can_exclude_locked() {
        let store = MemoryCapsuleStore::new();
        let user = Uuid::new_v4();

        let locked = capsule_for(user, None);
        let mut unlocked = capsule_for(user, None);
        unlocked.state = CapsuleState::Unlocked;
        unlocked.unlocked_at = Some(OffsetDateTime::now_utc());

        store.insert(&locked).await.unwrap();
        store.insert(&unlocked).await.unwrap();

        let page = store
            .list_for_user(user, false, PageRequest::default())
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, unlocked.id);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store = MemoryCapsuleStore::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        for i in 0..5 {
            let mut capsule = capsule_for(user, None);
            capsule.created_at = now - Duration::minutes(i);
            store.insert(&capsule).await.unwrap();
        }

        let page = store
            .list_for_user(user, true, PageRequest::new(2, 2))
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        assert!(page.has_prev());
    }

    #[tokio::test]
    async fn test_due_for_unlock_oldest_first() {
        let store = MemoryCapsuleStore::new();
        let now = OffsetDateTime::now_utc();

        let mut oldest = capsule_for(Uuid::new_v4(), None);
        oldest.unlock_at = now - Duration::days(2);
        let mut newer = capsule_for(Uuid::new_v4(), None);
        newer.unlock_at = now - Duration::days(1);
        let mut future = capsule_for(Uuid::new_v4(), None);
        future.unlock_at = now + Duration::days(1);
        let mut already = capsule_for(Uuid::new_v4(), None);
        already.unlock_at = now - Duration::days(3);
        already.state = CapsuleState::Unlocked;

        for c in [&oldest, &newer, &future, &already] {
            store.insert(c).await.unwrap();
        }

        let due = store.due_for_unlock(now, 100).await.unwrap();
        let ids: Vec<Uuid> = due.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![oldest.id, newer.id]);

        let capped = store.due_for_unlock(now, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, oldest.id);
    }

    #[tokio::test]
    async fn test_mark_unlocked_flip_semantics() {
        let store = MemoryCapsuleStore::new();
        let capsule = capsule_for(Uuid::new_v4(), None);
        store.insert(&capsule).await.unwrap();

        let at = OffsetDateTime::now_utc();
        assert_eq!(
            store.mark_unlocked(capsule.id, at).await.unwrap(),
            UnlockFlip::Flipped
        );
        assert_eq!(
            store.mark_unlocked(capsule.id, at + Duration::seconds(5)).await.unwrap(),
            UnlockFlip::AlreadyUnlocked
        );
        assert_eq!(
            store.mark_unlocked(Uuid::new_v4(), at).await.unwrap(),
            UnlockFlip::Gone
        );

        // The first caller's timestamp sticks.
        let fetched = store.fetch(capsule.id).await.unwrap().unwrap();
        assert_eq!(fetched.unlocked_at, Some(at));
        assert!(fetched.is_unlocked());
    }

    #[tokio::test]
    async fn test_stats_for_user() {
        let store = MemoryCapsuleStore::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let mut soon = capsule_for(user, None);
        soon.unlock_at = now + Duration::days(3);
        let mut distant = capsule_for(user, None);
        distant.unlock_at = now + Duration::days(300);
        let mut unlocked = capsule_for(Uuid::new_v4(), Some(user));
        unlocked.state = CapsuleState::Unlocked;
        unlocked.content_kind = ContentKind::Image;

        for c in [&soon, &distant, &unlocked] {
            store.insert(c).await.unwrap();
        }
        // Someone else's capsule stays out of the numbers.
        store.insert(&capsule_for(Uuid::new_v4(), None)).await.unwrap();

        let stats = store.stats_for_user(user).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.locked, 2);
        assert_eq!(stats.unlocked, 1);
        assert_eq!(stats.unlocking_soon, 1);
        assert_eq!(stats.by_kind.text, 2);
        assert_eq!(stats.by_kind.image, 1);
    }
}
