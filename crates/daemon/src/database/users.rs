use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use common::directory::{DirectoryError, UserDirectory, UserRecord};
use common::identity::{IdentityError, IdentityProvider, Principal};

use crate::database::types::{DTimestamp, DUuid};
use crate::database::Database;

#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: DUuid,
    email: String,
    display_name: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            id: row.id.into(),
            email: row.email,
            display_name: row.display_name,
        }
    }
}

/// Turn user input into a LIKE pattern with wildcards escaped, so a
/// literal `%` in the query searches for `%`.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl UserDirectory for Database {
    async fn lookup(&self, id: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name FROM users WHERE id = ?1",
        )
        .bind(DUuid::from(id))
        .fetch_optional(&**self)
        .await
        .map_err(DirectoryError::new)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        // The email column is COLLATE NOCASE, so plain equality matches
        // case-insensitively.
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&**self)
        .await
        .map_err(DirectoryError::new)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_display_name(&self, name: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name FROM users WHERE display_name = ?1",
        )
        .bind(name)
        .fetch_optional(&**self)
        .await
        .map_err(DirectoryError::new)?;

        Ok(row.map(UserRecord::from))
    }

    async fn search(
        &self,
        query: &str,
        exclude: Uuid,
        limit: u32,
    ) -> Result<Vec<UserRecord>, DirectoryError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = like_pattern(query);

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, display_name
            FROM users
            WHERE id != ?1
              AND (email LIKE ?2 ESCAPE '\' OR display_name LIKE ?3 ESCAPE '\')
            ORDER BY display_name ASC
            LIMIT ?4
            "#,
        )
        .bind(DUuid::from(exclude))
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&**self)
        .await
        .map_err(DirectoryError::new)?;

        Ok(rows.into_iter().map(UserRecord::from).collect())
    }
}

#[async_trait]
impl IdentityProvider for Database {
    async fn resolve(&self, token: &str) -> Result<Option<Principal>, IdentityError> {
        let row = sqlx::query(
            r#"
            SELECT u.id AS id, u.email AS email
            FROM api_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.token = ?1
            "#,
        )
        .bind(token)
        .fetch_optional(&**self)
        .await
        .map_err(IdentityError::new)?;

        Ok(row.map(|row| {
            let id: DUuid = row.get("id");
            Principal {
                id: id.into(),
                email: row.get("email"),
            }
        }))
    }
}

impl Database {
    /// Insert a user row. Accounts normally arrive out of band; this
    /// exists for provisioning scripts and tests.
    pub async fn create_user(
        &self,
        email: &str,
        display_name: &str,
    ) -> Result<UserRecord, sqlx::Error> {
        let id = DUuid::new();
        sqlx::query(
            "INSERT INTO users (id, email, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id)
        .bind(email)
        .bind(display_name)
        .bind(DTimestamp::now())
        .execute(&**self)
        .await?;

        Ok(UserRecord {
            id: id.into(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        })
    }

    /// Mint a bearer token for a user.
    pub async fn issue_token(&self, user_id: Uuid) -> Result<String, sqlx::Error> {
        let token = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO api_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(&token)
            .bind(DUuid::from(user_id))
            .bind(DTimestamp::now())
            .execute(&**self)
            .await?;

        Ok(token)
    }
}
