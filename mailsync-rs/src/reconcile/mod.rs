//! Metadata reconciliation engine
//!
//! Applies a folder's [`FlagBatch`] to the local category model:
//!
//! 1. Unknown remote ids are skipped; ingestion owns message creation
//! 2. Each RemoteUid's category set is replaced by what the batch asserts
//! 3. Each touched message is recomputed from all of its RemoteUids, so one
//!    folder never erases what another folder contributed
//! 4. `is_draft` only holds through a drafts-role folder
//! 5. Extra flags are bounded to [`EXTRA_FLAGS_MAX_BYTES`]
//!
//! A batch commits in one transaction whose first statement is a write, so
//! concurrent batches on a WAL shard queue on the busy timeout instead of
//! failing a read-to-write upgrade. Dropping the future before it completes
//! rolls the transaction back.

pub mod categories;
pub mod extra_flags;

pub use extra_flags::{bounded_extra_flags, EXTRA_FLAGS_MAX_BYTES};

use crate::error::{Result, SyncError};
use crate::model::{CanonicalFlag, FlagBatch, FolderRole};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// RemoteUids whose flag state was written
    pub updated: usize,
    /// Remote ids with no RemoteUid in this folder
    pub skipped_unknown: usize,
    /// RemoteUids whose extra flags had to be truncated
    pub truncated: usize,
    /// Messages recomputed
    pub recomputed: usize,
    pub role_changed: bool,
}

/// Apply `batch` for one folder of one account
pub async fn update(
    pool: &SqlitePool,
    account_id: i64,
    folder_id: i64,
    folder_role: Option<FolderRole>,
    batch: &FlagBatch,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let mut tx = pool.begin().await?;

    // Opens with a write so the shard's write lock is held before anything is read
    let stored: Option<(Option<String>,)> = sqlx::query_as(
        "UPDATE folders SET reconciled_at = ? WHERE id = ? AND account_id = ? RETURNING canonical_name",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(folder_id)
    .bind(account_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (stored_role,) = stored.ok_or(SyncError::FolderNotFound(folder_id))?;

    let role_name = folder_role.map(|role| role.as_str());
    let mut touched = BTreeSet::new();

    if stored_role.as_deref() != role_name {
        info!(
            account_id,
            folder_id,
            from = stored_role.as_deref().unwrap_or("none"),
            to = role_name.unwrap_or("none"),
            "Folder role changed"
        );

        sqlx::query("UPDATE folders SET canonical_name = ? WHERE id = ?")
            .bind(role_name)
            .bind(folder_id)
            .execute(&mut *tx)
            .await?;

        // Derived state of every message in the folder depends on the role
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT DISTINCT message_id FROM remote_uids WHERE folder_id = ?")
            .bind(folder_id)
            .fetch_all(&mut *tx)
            .await?;
        touched.extend(rows.into_iter().map(|(id,)| id));
        report.role_changed = true;
    }

    for (msg_uid, record) in batch {
        let remote_uid: Option<(i64, i64)> = sqlx::query_as(
            "SELECT id, message_id FROM remote_uids WHERE account_id = ? AND folder_id = ? AND msg_uid = ?",
        )
        .bind(account_id)
        .bind(folder_id)
        .bind(msg_uid)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((remote_uid_id, message_id)) = remote_uid else {
            debug!(account_id, folder_id, msg_uid, "Skipping unknown remote uid");
            report.skipped_unknown += 1;
            continue;
        };

        let mut category_ids = Vec::new();
        for category in record.category_refs() {
            category_ids.push(categories::get_or_create(&mut tx, account_id, &category).await?);
        }
        categories::set_remote_uid_categories(&mut tx, remote_uid_id, &category_ids).await?;

        let (extra_flags, dropped) = bounded_extra_flags(&record.extra_flags)?;
        if dropped > 0 {
            warn!(account_id, folder_id, msg_uid, dropped, "Extra flags truncated");
            report.truncated += 1;
        }

        sqlx::query(
            r#"
            UPDATE remote_uids SET
                has_draft_marker = ?,
                is_seen = ?,
                is_starred = ?,
                is_deleted = COALESCE(?, is_deleted),
                extra_flags = ?
            WHERE id = ?
            "#,
        )
        .bind(record.has_draft_marker)
        .bind(record.is_seen)
        .bind(record.canonical_flags.contains(&CanonicalFlag::Starred))
        .bind(record.has_deleted_marker)
        .bind(&extra_flags)
        .bind(remote_uid_id)
        .execute(&mut *tx)
        .await?;

        report.updated += 1;
        touched.insert(message_id);
    }

    for message_id in &touched {
        categories::recompute_message(&mut tx, *message_id).await?;
    }
    report.recomputed = touched.len();

    tx.commit().await?;

    debug!(
        account_id,
        folder_id,
        updated = report.updated,
        skipped = report.skipped_unknown,
        recomputed = report.recomputed,
        "Flag batch reconciled"
    );
    Ok(report)
}

/// Drop a folder that no longer exists remotely
///
/// Its RemoteUids go away and the messages they belonged to are recomputed
/// from what is left. Messages themselves are kept.
pub async fn remove_folder(pool: &SqlitePool, account_id: i64, folder_id: i64) -> Result<usize> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM remote_uid_categories WHERE remote_uid_id IN \
         (SELECT id FROM remote_uids WHERE account_id = ? AND folder_id = ?)",
    )
    .bind(account_id)
    .bind(folder_id)
    .execute(&mut *tx)
    .await?;

    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT message_id FROM remote_uids WHERE account_id = ? AND folder_id = ?",
    )
    .bind(account_id)
    .bind(folder_id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM remote_uids WHERE account_id = ? AND folder_id = ?")
        .bind(account_id)
        .bind(folder_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM folders WHERE id = ? AND account_id = ?")
        .bind(folder_id)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    for (message_id,) in &rows {
        categories::recompute_message(&mut tx, *message_id).await?;
    }

    tx.commit().await?;

    info!(account_id, folder_id, messages = rows.len(), "Folder removed");
    Ok(rows.len())
}
