//! Category rows and derived message state, always inside the caller's transaction

use crate::error::Result;
use crate::model::CategoryRef;
use sqlx::SqliteConnection;

/// Id of the category for `category`, created on first use
pub async fn get_or_create(conn: &mut SqliteConnection, account_id: i64, category: &CategoryRef) -> Result<i64> {
    sqlx::query(
        "INSERT INTO categories (account_id, name, display_name) VALUES (?, ?, ?) \
         ON CONFLICT (account_id, name, display_name) DO NOTHING",
    )
    .bind(account_id)
    .bind(category.name())
    .bind(category.display_name())
    .execute(&mut *conn)
    .await?;

    let (id,): (i64,) = sqlx::query_as(
        "SELECT id FROM categories WHERE account_id = ? AND name = ? AND display_name = ?",
    )
    .bind(account_id)
    .bind(category.name())
    .bind(category.display_name())
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Replace the categories a RemoteUid contributes
pub async fn set_remote_uid_categories(conn: &mut SqliteConnection, remote_uid_id: i64, category_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM remote_uid_categories WHERE remote_uid_id = ?")
        .bind(remote_uid_id)
        .execute(&mut *conn)
        .await?;

    for category_id in category_ids {
        sqlx::query("INSERT OR IGNORE INTO remote_uid_categories (remote_uid_id, category_id) VALUES (?, ?)")
            .bind(remote_uid_id)
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Recompute a message from every RemoteUid it has, across all folders
///
/// Categories are the union of the RemoteUids' categories. `is_draft` needs
/// a draft marker on a RemoteUid whose folder currently has the drafts role.
pub async fn recompute_message(conn: &mut SqliteConnection, message_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM message_categories WHERE message_id = ?")
        .bind(message_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO message_categories (message_id, category_id)
        SELECT DISTINCT ru.message_id, ruc.category_id
        FROM remote_uids ru
        JOIN remote_uid_categories ruc ON ruc.remote_uid_id = ru.id
        WHERE ru.message_id = ?
        "#,
    )
    .bind(message_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE messages SET
            is_draft = EXISTS (
                SELECT 1 FROM remote_uids ru
                JOIN folders f ON f.id = ru.folder_id
                WHERE ru.message_id = messages.id
                  AND ru.has_draft_marker = 1
                  AND f.canonical_name = 'drafts'
            ),
            is_read = EXISTS (
                SELECT 1 FROM remote_uids WHERE message_id = messages.id AND is_seen = 1
            ),
            is_starred = EXISTS (
                SELECT 1 FROM remote_uids WHERE message_id = messages.id AND is_starred = 1
            )
        WHERE id = ?
        "#,
    )
    .bind(message_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
