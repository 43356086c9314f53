//! Messages, RemoteUids and categories
//!
//! Creating messages and RemoteUids belongs to the ingestion path; the sync
//! core only reads them and lets the reconciliation engine mutate their
//! flag state.

use crate::error::Result;
use crate::model::{CanonicalFlag, Category, Message, RemoteUid};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct MessageStore {
    db: SqlitePool,
}

impl MessageStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert_message(&self, account_id: i64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO messages (account_id) VALUES (?)")
            .bind(account_id)
            .execute(&self.db)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Attach `message_id` to a remote uid in `folder_id`
    pub async fn insert_remote_uid(
        &self,
        account_id: i64,
        folder_id: i64,
        msg_uid: u32,
        message_id: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO remote_uids (account_id, folder_id, msg_uid, message_id) VALUES (?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(folder_id)
        .bind(msg_uid)
        .bind(message_id)
        .execute(&self.db)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Load a message with its categories, ordered by category id
    pub async fn get(&self, message_id: i64) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, (i64, i64, bool, bool, bool)>(
            "SELECT id, account_id, is_draft, is_read, is_starred FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.db)
        .await?;

        let Some((id, account_id, is_draft, is_read, is_starred)) = row else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT c.id, c.account_id, c.name, c.display_name FROM categories c \
             JOIN message_categories mc ON mc.category_id = c.id \
             WHERE mc.message_id = ? ORDER BY c.id",
        )
        .bind(message_id)
        .fetch_all(&self.db)
        .await?;

        let categories = rows.iter().map(row_to_category).collect::<Result<Vec<_>>>()?;

        Ok(Some(Message {
            id,
            account_id,
            is_draft,
            is_read,
            is_starred,
            categories,
        }))
    }

    pub async fn remote_uid(&self, account_id: i64, folder_id: i64, msg_uid: u32) -> Result<Option<RemoteUid>> {
        let row = sqlx::query(
            "SELECT id, account_id, folder_id, msg_uid, message_id, has_draft_marker, \
             is_seen, is_starred, is_deleted, extra_flags \
             FROM remote_uids WHERE account_id = ? AND folder_id = ? AND msg_uid = ?",
        )
        .bind(account_id)
        .bind(folder_id)
        .bind(msg_uid)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_remote_uid).transpose()
    }

    pub async fn categories(&self, account_id: i64) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, account_id, name, display_name FROM categories WHERE account_id = ? ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_category).collect()
    }
}

fn row_to_category(row: &SqliteRow) -> Result<Category> {
    let name: String = row.try_get("name")?;
    Ok(Category {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        name: CanonicalFlag::from_name(&name),
        display_name: row.try_get("display_name")?,
    })
}

fn row_to_remote_uid(row: &SqliteRow) -> Result<RemoteUid> {
    let extra_flags: String = row.try_get("extra_flags")?;
    Ok(RemoteUid {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        folder_id: row.try_get("folder_id")?,
        msg_uid: row.try_get("msg_uid")?,
        message_id: row.try_get("message_id")?,
        has_draft_marker: row.try_get("has_draft_marker")?,
        is_seen: row.try_get("is_seen")?,
        is_starred: row.try_get("is_starred")?,
        is_deleted: row.try_get("is_deleted")?,
        extra_flags: serde_json::from_str(&extra_flags)?,
    })
}
