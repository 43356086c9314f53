use crate::error::Result;
use sqlx::SqlitePool;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY,
        namespace_id INTEGER NOT NULL,
        email_address TEXT NOT NULL,
        provider TEXT NOT NULL,
        sync_should_run INTEGER NOT NULL DEFAULT 1,
        sync_host TEXT,
        desired_sync_host TEXT,
        sync_state TEXT,
        sync_error TEXT,
        last_synced_at TEXT,
        credential_ref TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS folders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        name TEXT NOT NULL,
        canonical_name TEXT,
        sync_status TEXT NOT NULL DEFAULT 'idle',
        sync_cursor INTEGER,
        reconciled_at TEXT,
        UNIQUE (account_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        is_draft INTEGER NOT NULL DEFAULT 0,
        is_read INTEGER NOT NULL DEFAULT 0,
        is_starred INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        name TEXT NOT NULL DEFAULT '',
        display_name TEXT NOT NULL,
        UNIQUE (account_id, name, display_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS message_categories (
        message_id INTEGER NOT NULL REFERENCES messages(id),
        category_id INTEGER NOT NULL REFERENCES categories(id),
        PRIMARY KEY (message_id, category_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS remote_uids (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        folder_id INTEGER NOT NULL REFERENCES folders(id),
        msg_uid INTEGER NOT NULL,
        message_id INTEGER NOT NULL REFERENCES messages(id),
        has_draft_marker INTEGER NOT NULL DEFAULT 0,
        is_seen INTEGER NOT NULL DEFAULT 0,
        is_starred INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        extra_flags TEXT NOT NULL DEFAULT '[]',
        UNIQUE (account_id, folder_id, msg_uid)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS remote_uid_categories (
        remote_uid_id INTEGER NOT NULL REFERENCES remote_uids(id),
        category_id INTEGER NOT NULL REFERENCES categories(id),
        PRIMARY KEY (remote_uid_id, category_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_remote_uids_message ON remote_uids(message_id)",
    "CREATE INDEX IF NOT EXISTS idx_accounts_desired_host ON accounts(desired_sync_host)",
];

/// Create the sync tables if they do not exist yet
pub async fn init_db(pool: &SqlitePool) -> Result<()> {
    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
