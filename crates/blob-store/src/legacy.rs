//! Legacy chunked blob store in SQLite.
//!
//! Older deployments kept ciphertext as ordered chunks in the metadata
//! database. Records migrated from there still point at this store, so it
//! stays readable (and deletable) indefinitely. New writes only happen
//! through migration tooling and tests; the routing facade never sends a
//! fresh payload here.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Result;

/// Chunk size used when splitting payloads, matching the layout the
/// migrated records were written with.
pub const CHUNK_SIZE: usize = 255 * 1024;

/// SQLite-backed chunk store.
#[derive(Debug, Clone)]
pub struct LegacyStore {
    pool: SqlitePool,
}

impl LegacyStore {
    /// Open (or create) a legacy store at the given file path.
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory legacy store.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Store a payload as chunks, returning the new blob id.
    pub async fn put(&self, data: Bytes) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let chunks: Vec<&[u8]> = if data.is_empty() {
            Vec::new()
        } else {
            data.chunks(CHUNK_SIZE).collect()
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO legacy_blobs (id, size, chunk_count, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(data.len() as i64)
        .bind(chunks.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (seq, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO legacy_blob_chunks (blob_id, seq, data)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(&id_str)
            .bind(seq as i64)
            .bind(*chunk)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// Reassemble a payload from its chunks. Absent blobs are `None`.
    pub async fn get(&self, id: Uuid) -> Result<Option<Bytes>> {
        let id_str = id.to_string();

        let blob = sqlx::query(
            r#"
            SELECT size, chunk_count FROM legacy_blobs WHERE id = ?
            "#,
        )
        .bind(&id_str)
        .fetch_optional(&self.pool)
        .await?;

        let Some(blob) = blob else {
            return Ok(None);
        };
        let size: i64 = blob.get("size");

        let rows = sqlx::query(
            r#"
            SELECT data FROM legacy_blob_chunks
            WHERE blob_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(&id_str)
        .fetch_all(&self.pool)
        .await?;

        let mut data = BytesMut::with_capacity(size as usize);
        for row in rows {
            let chunk: Vec<u8> = row.get("data");
            data.extend_from_slice(&chunk);
        }

        Ok(Some(data.freeze()))
    }

    /// Delete a blob and its chunks. Returns whether the blob existed.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let id_str = id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM legacy_blob_chunks WHERE blob_id = ?
            "#,
        )
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            DELETE FROM legacy_blobs WHERE id = ?
            "#,
        )
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
impl LegacyStore {
    /// Count stored blobs (test-only).
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM legacy_blobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_small_payload() {
        let store = LegacyStore::in_memory().await.unwrap();
        let data = Bytes::from("a small sealed payload");

        let id = store.put(data.clone()).await.unwrap();
        let back = store.get(id).await.unwrap().unwrap();
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn test_round_trip_multi_chunk_payload() {
        let store = LegacyStore::in_memory().await.unwrap();
        // Two full chunks plus a partial third
        let data = Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 1024]);

        let id = store.put(data.clone()).await.unwrap();
        let back = store.get(id).await.unwrap().unwrap();
        assert_eq!(back.len(), data.len());
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let store = LegacyStore::in_memory().await.unwrap();
        let id = store.put(Bytes::new()).await.unwrap();
        let back = store.get(id).await.unwrap().unwrap();
        assert!(back.is_empty());
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = LegacyStore::in_memory().await.unwrap();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = LegacyStore::in_memory().await.unwrap();
        let id = store.put(Bytes::from("data")).await.unwrap();

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("legacy.db");
        let data = Bytes::from(vec![3u8; CHUNK_SIZE + 17]);

        let id = {
            let store = LegacyStore::new(&db_path).await.unwrap();
            store.put(data.clone()).await.unwrap()
        };

        let store = LegacyStore::new(&db_path).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap(), data);
    }
}
