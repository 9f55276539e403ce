//! SQLite connections.
//!
//! All store access runs on short-lived, per-operation connections; there is
//! no pool and no cross-request reuse. The business store must already exist
//! (it belongs to the platform, not to this engine); the index database is
//! engine-owned and created on first use.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;

/// Open the business store. Fails if the file does not exist.
pub async fn connect_store(path: &Path) -> Result<SqliteConnection, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(false);
    options.connect().await
}

/// Open the engine-owned index database, creating file and schema on first
/// use.
pub async fn connect_index(path: &Path) -> Result<SqliteConnection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let mut conn = options.connect().await?;
    ensure_index_schema(&mut conn).await?;
    Ok(conn)
}

async fn ensure_index_schema(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_records (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            document TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}
