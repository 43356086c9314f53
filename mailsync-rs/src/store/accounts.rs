use crate::error::{Result, SyncError};
use crate::model::{Account, NewAccount, SyncState};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

const ACCOUNT_COLUMNS: &str = "id, namespace_id, email_address, provider, sync_should_run, \
     sync_host, desired_sync_host, sync_state, sync_error, last_synced_at, credential_ref";

/// Account rows and fleet placement
#[derive(Clone)]
pub struct AccountStore {
    db: SqlitePool,
}

impl AccountStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Provision an account row (the namespace shares the account id)
    pub async fn insert(&self, account: &NewAccount) -> Result<Account> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, namespace_id, email_address, provider,
                sync_should_run, desired_sync_host, credential_ref
            ) VALUES (?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(account.id)
        .bind(account.id)
        .bind(&account.email_address)
        .bind(&account.provider)
        .bind(&account.desired_sync_host)
        .bind(&account.credential_ref)
        .execute(&self.db)
        .await?;

        info!(account_id = account.id, email = %account.email_address, "Account provisioned");
        self.get(account.id).await
    }

    pub async fn find(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|row| row_to_account(&row)).transpose()
    }

    pub async fn get(&self, id: i64) -> Result<Account> {
        self.find(id).await?.ok_or(SyncError::AccountNotFound(id))
    }

    /// Accounts that should be synced by `host` right now
    ///
    /// Accounts waiting for operator attention are left out.
    pub async fn list_desired_on(&self, host: &str) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts \
             WHERE desired_sync_host = ? AND sync_should_run = 1 \
             AND (sync_state IS NULL OR sync_state != 'invalid') \
             ORDER BY id",
            ACCOUNT_COLUMNS
        ))
        .bind(host)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    /// Record that `host` now runs the account's sync
    pub async fn claim(&self, id: i64, host: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET sync_host = ?, sync_state = 'running', sync_error = NULL WHERE id = ?",
        )
        .bind(host)
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::AccountNotFound(id));
        }
        Ok(())
    }

    /// Give the account up, unless another host already took it over
    pub async fn release(&self, id: i64, host: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET sync_host = NULL,
                sync_state = CASE WHEN sync_state = 'invalid' THEN 'invalid' ELSE 'stopped' END
            WHERE id = ? AND sync_host = ?
            "#,
        )
        .bind(id)
        .bind(host)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn set_desired_host(&self, id: i64, host: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET desired_sync_host = ? WHERE id = ?")
            .bind(host)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::AccountNotFound(id));
        }
        Ok(())
    }

    /// Flip `sync_should_run`, returning the new value
    pub async fn toggle_sync(&self, id: i64) -> Result<bool> {
        let (should_run,): (bool,) = sqlx::query_as(
            "UPDATE accounts SET sync_should_run = NOT sync_should_run WHERE id = ? RETURNING sync_should_run",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(SyncError::AccountNotFound(id))?;

        Ok(should_run)
    }

    /// Park the account until an operator fixes its credentials
    pub async fn mark_invalid(&self, id: i64, reason: &str) -> Result<()> {
        warn!(account_id = id, reason, "Account needs operator attention");

        sqlx::query("UPDATE accounts SET sync_state = 'invalid', sync_error = ? WHERE id = ?")
            .bind(reason)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Operator reset of an invalid account
    pub async fn clear_invalid(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET sync_state = 'stopped', sync_error = NULL WHERE id = ? AND sync_state = 'invalid'",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn record_synced(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_synced_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let sync_state: Option<String> = row.try_get("sync_state")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    let last_synced_at = match last_synced_at {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map_err(|e| SyncError::Parse(format!("last_synced_at {:?}: {}", s, e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(Account {
        id: row.try_get("id")?,
        namespace_id: row.try_get("namespace_id")?,
        email_address: row.try_get("email_address")?,
        provider: row.try_get("provider")?,
        sync_should_run: row.try_get("sync_should_run")?,
        sync_host: row.try_get("sync_host")?,
        desired_sync_host: row.try_get("desired_sync_host")?,
        sync_state: sync_state.as_deref().and_then(SyncState::parse),
        sync_error: row.try_get("sync_error")?,
        last_synced_at,
        credential_ref: row.try_get("credential_ref")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> AccountStore {
        AccountStore::new(crate::store::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = store().await;
        let account = store
            .insert(&NewAccount::new(1, "alice@example.com", "gmail").with_desired_host("sync-1"))
            .await
            .unwrap();

        assert_eq!(account.namespace_id, 1);
        assert!(account.sync_should_run);
        assert_eq!(account.desired_sync_host.as_deref(), Some("sync-1"));
        assert_eq!(account.sync_host, None);
        assert_eq!(account.sync_state, None);

        assert!(matches!(store.get(99).await, Err(SyncError::AccountNotFound(99))));
    }

    #[tokio::test]
    async fn test_list_desired_on_skips_disabled_and_invalid() {
        let store = store().await;
        for id in 1..=4 {
            store
                .insert(&NewAccount::new(id, format!("u{}@example.com", id), "custom").with_desired_host("sync-1"))
                .await
                .unwrap();
        }
        store
            .insert(&NewAccount::new(5, "other@example.com", "custom").with_desired_host("sync-2"))
            .await
            .unwrap();

        assert!(!store.toggle_sync(2).await.unwrap());
        store.mark_invalid(3, "invalid_grant").await.unwrap();

        let ids: Vec<i64> = store
            .list_desired_on("sync-1")
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 4]);

        let invalid = store.get(3).await.unwrap();
        assert_eq!(invalid.sync_state, Some(SyncState::Invalid));
        assert_eq!(invalid.sync_error.as_deref(), Some("invalid_grant"));
    }

    #[tokio::test]
    async fn test_claim_and_release() {
        let store = store().await;
        store.insert(&NewAccount::new(7, "bob@example.com", "custom")).await.unwrap();

        store.claim(7, "sync-1").await.unwrap();
        let account = store.get(7).await.unwrap();
        assert_eq!(account.sync_host.as_deref(), Some("sync-1"));
        assert_eq!(account.sync_state, Some(SyncState::Running));

        // Another host does not own it
        store.release(7, "sync-2").await.unwrap();
        assert_eq!(store.get(7).await.unwrap().sync_host.as_deref(), Some("sync-1"));

        store.release(7, "sync-1").await.unwrap();
        let account = store.get(7).await.unwrap();
        assert_eq!(account.sync_host, None);
        assert_eq!(account.sync_state, Some(SyncState::Stopped));
    }

    #[tokio::test]
    async fn test_record_synced() {
        let store = store().await;
        store.insert(&NewAccount::new(8, "c@example.com", "custom")).await.unwrap();

        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc);
        store.record_synced(8, at).await.unwrap();

        assert_eq!(store.get(8).await.unwrap().last_synced_at, Some(at));
    }
}
