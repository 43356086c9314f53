use crate::error::Result;
use crate::model::{Folder, FolderRole, FolderSyncStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Folder rows and per-folder sync status
#[derive(Clone)]
pub struct FolderStore {
    db: SqlitePool,
}

impl FolderStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn list(&self, account_id: i64) -> Result<Vec<Folder>> {
        let rows = sqlx::query(
            "SELECT id, account_id, name, canonical_name, sync_status, sync_cursor \
             FROM folders WHERE account_id = ? ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_folder).collect()
    }

    pub async fn get(&self, folder_id: i64) -> Result<Option<Folder>> {
        let row = sqlx::query(
            "SELECT id, account_id, name, canonical_name, sync_status, sync_cursor \
             FROM folders WHERE id = ?",
        )
        .bind(folder_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_folder).transpose()
    }

    /// Return the folder named `name`, creating it with `role` if needed
    ///
    /// An existing folder keeps its stored role: role changes are applied by
    /// the reconciliation engine so that affected messages get recomputed.
    pub async fn upsert(&self, account_id: i64, name: &str, role: Option<FolderRole>) -> Result<Folder> {
        sqlx::query(
            "INSERT INTO folders (account_id, name, canonical_name) VALUES (?, ?, ?) \
             ON CONFLICT (account_id, name) DO NOTHING",
        )
        .bind(account_id)
        .bind(name)
        .bind(role.map(|r| r.as_str()))
        .execute(&self.db)
        .await?;

        let row = sqlx::query(
            "SELECT id, account_id, name, canonical_name, sync_status, sync_cursor \
             FROM folders WHERE account_id = ? AND name = ?",
        )
        .bind(account_id)
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        row_to_folder(&row)
    }

    pub async fn set_status(&self, folder_id: i64, status: FolderSyncStatus) -> Result<()> {
        sqlx::query("UPDATE folders SET sync_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(folder_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Mark every given folder stopped in one transaction
    pub async fn mark_stopped(&self, folder_ids: &[i64]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for folder_id in folder_ids {
            sqlx::query("UPDATE folders SET sync_status = 'stopped' WHERE id = ?")
                .bind(folder_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(count = folder_ids.len(), "Folders marked stopped");
        Ok(())
    }

    pub async fn set_cursor(&self, folder_id: i64, cursor: Option<u64>) -> Result<()> {
        sqlx::query("UPDATE folders SET sync_cursor = ? WHERE id = ?")
            .bind(cursor.map(|c| c as i64))
            .bind(folder_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

pub(crate) fn row_to_folder(row: &SqliteRow) -> Result<Folder> {
    let canonical_name: Option<String> = row.try_get("canonical_name")?;
    let sync_status: String = row.try_get("sync_status")?;
    let sync_cursor: Option<i64> = row.try_get("sync_cursor")?;

    Ok(Folder {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        name: row.try_get("name")?,
        // Unknown role names are treated as no role
        role: canonical_name.and_then(|name| name.parse().ok()),
        sync_status: FolderSyncStatus::parse(&sync_status),
        sync_cursor: sync_cursor.map(|c| c as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewAccount;
    use crate::store::AccountStore;

    async fn store() -> FolderStore {
        let pool = crate::store::open_in_memory().await.unwrap();
        AccountStore::new(pool.clone())
            .insert(&NewAccount::new(1, "a@example.com", "custom"))
            .await
            .unwrap();
        FolderStore::new(pool)
    }

    #[tokio::test]
    async fn test_upsert_is_unique_per_account_and_name() {
        let store = store().await;

        let inbox = store.upsert(1, "INBOX", Some(FolderRole::Inbox)).await.unwrap();
        let again = store.upsert(1, "INBOX", Some(FolderRole::Archive)).await.unwrap();

        assert_eq!(inbox.id, again.id);
        assert_eq!(again.role, Some(FolderRole::Inbox));
        assert_eq!(again.sync_status, FolderSyncStatus::Idle);
        assert_eq!(store.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_and_cursor() {
        let store = store().await;
        let inbox = store.upsert(1, "INBOX", Some(FolderRole::Inbox)).await.unwrap();
        let other = store.upsert(1, "Receipts", None).await.unwrap();

        store.set_status(inbox.id, FolderSyncStatus::Running).await.unwrap();
        store.set_cursor(inbox.id, Some(1234)).await.unwrap();
        store.mark_stopped(&[inbox.id, other.id]).await.unwrap();

        let inbox = store.get(inbox.id).await.unwrap().unwrap();
        assert_eq!(inbox.sync_status, FolderSyncStatus::Stopped);
        assert_eq!(inbox.sync_cursor, Some(1234));

        let other = store.get(other.id).await.unwrap().unwrap();
        assert_eq!(other.role, None);
        assert_eq!(other.sync_status, FolderSyncStatus::Stopped);
    }
}
