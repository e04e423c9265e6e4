use async_trait::async_trait;
use time::{OffsetDateTime, Time};
use uuid::Uuid;

use common::notify::{Notification, Notifier, NotifyError};

use crate::database::types::{DBool, DTimestamp, DUuid};
use crate::database::Database;

#[derive(Debug, Clone, sqlx::FromRow)]
struct NotificationRow {
    id: DUuid,
    user_id: DUuid,
    capsule_id: Option<DUuid>,
    message: String,
    read: DBool,
    created_at: DTimestamp,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id.into(),
            user_id: row.user_id.into(),
            capsule_id: row.capsule_id.map(Into::into),
            message: row.message,
            read: row.read.into(),
            created_at: row.created_at.into(),
        }
    }
}

#[async_trait]
impl Notifier for Database {
    async fn notify(
        &self,
        user_id: Uuid,
        message: &str,
        capsule_id: Option<Uuid>,
    ) -> Result<(), NotifyError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, capsule_id, message, read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(DUuid::new())
        .bind(DUuid::from(user_id))
        .bind(capsule_id.map(DUuid::from))
        .bind(message)
        .bind(DBool::from(false))
        .bind(DTimestamp::now())
        .execute(&**self)
        .await
        .map_err(NotifyError::new)?;

        Ok(())
    }
}

impl Database {
    /// Read back a user's feed, newest first.
    ///
    /// # Arguments
    /// * `unread_only` - Drop notifications that were already read
    /// * `today_only` - Narrow to notifications created since UTC midnight
    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        today_only: bool,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let since = if today_only {
            OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT)
        } else {
            OffsetDateTime::UNIX_EPOCH
        };

        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, capsule_id, message, read, created_at
            FROM notifications
            WHERE user_id = ?1 AND (?2 OR read = 0) AND created_at >= ?3
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(DUuid::from(user_id))
        .bind(!unread_only)
        .bind(DTimestamp::from(since))
        .fetch_all(&**self)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    /// Flip one notification to read. Scoped to the owner so a caller
    /// cannot mark someone else's notice. Returns whether a row changed.
    pub async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2")
            .bind(DUuid::from(id))
            .bind(DUuid::from(user_id))
            .execute(&**self)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
