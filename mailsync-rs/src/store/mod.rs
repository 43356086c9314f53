//! Local relational store (SQLite through sqlx)
//!
//! One pool per shard. Every store type is a thin handle over a
//! [`SqlitePool`] and can be cloned freely.

pub mod accounts;
pub mod folders;
pub mod messages;
pub mod schema;

pub use accounts::AccountStore;
pub use folders::FolderStore;
pub use messages::MessageStore;
pub use schema::init_db;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Pool size of a shard that does not configure one
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// How long a writer waits for the shard's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Open a file-backed pool for `url` and create the schema
///
/// WAL lets readers run next to the single writer; writers queue on the
/// busy timeout.
pub async fn open(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    connect(options, max_connections).await
}

/// Open a private in-memory database
///
/// An in-memory database lives in its connection, so the pool holds exactly one.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    connect(options, 1).await
}

async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    init_db(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_shard_uses_wal_and_pool_size() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("shard.db").display());
        let pool = open(&url, 3).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(&pool).await.unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(pool.options().get_max_connections(), 3);
    }

    #[tokio::test]
    async fn test_in_memory_databases_are_private() {
        let first = open_in_memory().await.unwrap();
        let second = open_in_memory().await.unwrap();
        assert_eq!(first.options().get_max_connections(), 1);

        sqlx::query("INSERT INTO accounts (id, namespace_id, email_address, provider) VALUES (1, 1, 'a@example.com', 'custom')")
            .execute(&first)
            .await
            .unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts").fetch_one(&second).await.unwrap();
        assert_eq!(count, 0);
    }
}
