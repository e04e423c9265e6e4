use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use url::Url;

use super::DatabaseSetupError;

pub(crate) async fn connect_sqlite(url: &Url) -> Result<SqlitePool, DatabaseSetupError> {
    let is_memory = url.as_str().ends_with(":memory:");

    let mut options = SqliteConnectOptions::from_str(url.as_str())
        .map_err(DatabaseSetupError::Unavailable)?
        .create_if_missing(true);
    if !is_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    // Pooled in-memory connections each see a private database, so the
    // memory path is pinned to a single connection.
    let max_connections = if is_memory { 1 } else { 5 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(DatabaseSetupError::Unavailable)
}

pub(crate) async fn migrate_sqlite(pool: &SqlitePool) -> Result<(), DatabaseSetupError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(DatabaseSetupError::MigrationFailed)
}
