use async_trait::async_trait;
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use common::capsule::{
    Capsule, CapsuleChanges, CapsuleState, CapsuleStats, CapsuleStore, ContentKind, KindBreakdown,
    Page, PageRequest, StoreError, UnlockFlip,
};

use crate::database::types::{DLocator, DTimestamp, DUuid};
use crate::database::Database;

/// Row shape of the capsules table. Converted to the domain type at the
/// module boundary so nothing outside sees database wrappers.
#[derive(Debug, Clone, sqlx::FromRow)]
struct CapsuleRow {
    id: DUuid,
    owner_id: DUuid,
    recipient_id: Option<DUuid>,
    recipient_email: Option<String>,
    description: Option<String>,
    filename: String,
    content_kind: String,
    payload_size: i64,
    locator: DLocator,
    iv: Vec<u8>,
    state: String,
    unlock_at: DTimestamp,
    unlocked_at: Option<DTimestamp>,
    created_at: DTimestamp,
    updated_at: DTimestamp,
}

impl From<CapsuleRow> for Capsule {
    fn from(row: CapsuleRow) -> Self {
        Capsule {
            id: row.id.into(),
            owner_id: row.owner_id.into(),
            recipient_id: row.recipient_id.map(Into::into),
            recipient_email: row.recipient_email,
            description: row.description,
            filename: row.filename,
            content_kind: ContentKind::parse(&row.content_kind),
            payload_size: row.payload_size as u64,
            locator: row.locator.into(),
            iv: row.iv,
            state: CapsuleState::parse(&row.state),
            unlock_at: row.unlock_at.into(),
            unlocked_at: row.unlocked_at.map(Into::into),
            created_at: row.created_at.into(),
            updated_at: row.updated_at.into(),
        }
    }
}

#[async_trait]
impl CapsuleStore for Database {
    async fn insert(&self, capsule: &Capsule) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO capsules (
                id, owner_id, recipient_id, recipient_email, description,
                filename, content_kind, payload_size, locator, iv,
                state, unlock_at, unlocked_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(DUuid::from(capsule.id))
        .bind(DUuid::from(capsule.owner_id))
        .bind(capsule.recipient_id.map(DUuid::from))
        .bind(capsule.recipient_email.as_deref())
        .bind(capsule.description.as_deref())
        .bind(&capsule.filename)
        .bind(capsule.content_kind.as_str())
        .bind(capsule.payload_size as i64)
        .bind(DLocator::from(capsule.locator.clone()))
        .bind(&capsule.iv)
        .bind(capsule.state.as_str())
        .bind(DTimestamp::from(capsule.unlock_at))
        .bind(capsule.unlocked_at.map(DTimestamp::from))
        .bind(DTimestamp::from(capsule.created_at))
        .bind(DTimestamp::from(capsule.updated_at))
        .execute(&**self)
        .await
        .map_err(StoreError::new)?;

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Capsule>, StoreError> {
        let row = sqlx::query_as::<_, CapsuleRow>(
            r#"
            SELECT
                id, owner_id, recipient_id, recipient_email, description,
                filename, content_kind, payload_size, locator, iv,
                state, unlock_at, unlocked_at, created_at, updated_at
            FROM capsules
            WHERE id = ?1
            "#,
        )
        .bind(DUuid::from(id))
        .fetch_optional(&**self)
        .await
        .map_err(StoreError::new)?;

        Ok(row.map(Capsule::from))
    }

    async fn update_fields(&self, id: Uuid, changes: CapsuleChanges) -> Result<bool, StoreError> {
        let Some(existing) = self.fetch(id).await? else {
            return Ok(false);
        };

        let description = changes.description.or(existing.description);
        let unlock_at = changes.unlock_at.unwrap_or(existing.unlock_at);
        // The payload coordinates move as one unit or not at all.
        let (filename, content_kind, payload_size, locator, iv) = match changes.payload {
            Some(p) => (p.filename, p.content_kind, p.payload_size, p.locator, p.iv),
            None => (
                existing.filename,
                existing.content_kind,
                existing.payload_size,
                existing.locator,
                existing.iv,
            ),
        };

        let result = sqlx::query(
            r#"
            UPDATE capsules
            SET description = ?1, unlock_at = ?2, filename = ?3, content_kind = ?4,
                payload_size = ?5, locator = ?6, iv = ?7, updated_at = ?8
            WHERE id = ?9
            "#,
        )
        .bind(description)
        .bind(DTimestamp::from(unlock_at))
        .bind(filename)
        .bind(content_kind.as_str())
        .bind(payload_size as i64)
        .bind(DLocator::from(locator))
        .bind(iv)
        .bind(DTimestamp::now())
        .bind(DUuid::from(id))
        .execute(&**self)
        .await
        .map_err(StoreError::new)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM capsules WHERE id = ?1")
            .bind(DUuid::from(id))
            .execute(&**self)
            .await
            .map_err(StoreError::new)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        include_locked: bool,
        page: PageRequest,
    ) -> Result<Page<Capsule>, StoreError> {
        let user = DUuid::from(user_id);

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM capsules
            WHERE (owner_id = ?1 OR recipient_id = ?2) AND (?3 OR state = 'unlocked')
            "#,
        )
        .bind(user)
        .bind(user)
        .bind(include_locked)
        .fetch_one(&**self)
        .await
        .map_err(StoreError::new)?;
        let total = count_row.get::<i64, _>("count") as u64;

        let rows = sqlx::query_as::<_, CapsuleRow>(
            r#"
            SELECT
                id, owner_id, recipient_id, recipient_email, description,
                filename, content_kind, payload_size, locator, iv,
                state, unlock_at, unlocked_at, created_at, updated_at
            FROM capsules
            WHERE (owner_id = ?1 OR recipient_id = ?2) AND (?3 OR state = 'unlocked')
            ORDER BY created_at DESC, id DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(user)
        .bind(user)
        .bind(include_locked)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&**self)
        .await
        .map_err(StoreError::new)?;

        Ok(Page {
            items: rows.into_iter().map(Capsule::from).collect(),
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
        let rows = sqlx::query_as::<_, CapsuleRow>(
            r#"
            SELECT
                id, owner_id, recipient_id, recipient_email, description,
                filename, content_kind, payload_size, locator, iv,
                state, unlock_at, unlocked_at, created_at, updated_at
            FROM capsules
            WHERE state = 'locked' AND unlock_at <= ?1
            ORDER BY unlock_at ASC
            LIMIT ?2
            "#,
        )
        .bind(DTimestamp::from(now))
        .bind(limit as i64)
        .fetch_all(&**self)
        .await
        .map_err(StoreError::new)?;

        Ok(rows.into_iter().map(Capsule::from).collect())
    }

    async fn mark_unlocked(&self, id: Uuid, at: OffsetDateTime) -> Result<UnlockFlip, StoreError> {
        // Single conditional write. Exactly one of any set of racing
        // callers sees a row flip here.
        let result = sqlx::query(
            r#"
            UPDATE capsules
            SET state = 'unlocked', unlocked_at = ?1, updated_at = ?2
            WHERE id = ?3 AND state = 'locked'
            "#,
        )
        .bind(DTimestamp::from(at))
        .bind(DTimestamp::from(at))
        .bind(DUuid::from(id))
        .execute(&**self)
        .await
        .map_err(StoreError::new)?;

        if result.rows_affected() > 0 {
            return Ok(UnlockFlip::Flipped);
        }

        let row = sqlx::query("SELECT 1 AS present FROM capsules WHERE id = ?1")
            .bind(DUuid::from(id))
            .fetch_optional(&**self)
            .await
            .map_err(StoreError::new)?;

        Ok(match row {
            Some(_) => UnlockFlip::AlreadyUnlocked,
            None => UnlockFlip::Gone,
        })
    }

    async fn stats_for_user(&self, user_id: Uuid) -> Result<CapsuleStats, StoreError> {
        let user = DUuid::from(user_id);
        let now = OffsetDateTime::now_utc();
        let soon = now + Duration::days(7);

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(state = 'locked'), 0) AS locked,
                COALESCE(SUM(state = 'unlocked'), 0) AS unlocked,
                COALESCE(SUM(state = 'locked' AND unlock_at >= ?3 AND unlock_at <= ?4), 0)
                    AS unlocking_soon
            FROM capsules
            WHERE owner_id = ?1 OR recipient_id = ?2
            "#,
        )
        .bind(user)
        .bind(user)
        .bind(DTimestamp::from(now))
        .bind(DTimestamp::from(soon))
        .fetch_one(&**self)
        .await
        .map_err(StoreError::new)?;

        let mut stats = CapsuleStats {
            total: row.get::<i64, _>("total") as u64,
            locked: row.get::<i64, _>("locked") as u64,
            unlocked: row.get::<i64, _>("unlocked") as u64,
            unlocking_soon: row.get::<i64, _>("unlocking_soon") as u64,
            by_kind: KindBreakdown::default(),
        };

        let kind_rows = sqlx::query(
            r#"
            SELECT content_kind, COUNT(*) AS count
            FROM capsules
            WHERE owner_id = ?1 OR recipient_id = ?2
            GROUP BY content_kind
            "#,
        )
        .bind(user)
        .bind(user)
        .fetch_all(&**self)
        .await
        .map_err(StoreError::new)?;

        for row in kind_rows {
            let count = row.get::<i64, _>("count") as u64;
            match ContentKind::parse(&row.get::<String, _>("content_kind")) {
                ContentKind::Text => stats.by_kind.text += count,
                ContentKind::Image => stats.by_kind.image += count,
                ContentKind::Video => stats.by_kind.video += count,
                ContentKind::Audio => stats.by_kind.audio += count,
                ContentKind::Other => stats.by_kind.other += count,
            }
        }

        Ok(stats)
    }
}
