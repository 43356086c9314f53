//! Integration tests for the metadata reconciliation engine

mod common;

use common::{generic, gmail, label, memory_pool};
use mailsync_rs::model::{normalize_batch, FlagBatch, Folder, FolderRole, GmailLabel, RemoteFlags};
use mailsync_rs::reconcile::{self, EXTRA_FLAGS_MAX_BYTES};
use mailsync_rs::store::{self, FolderStore, MessageStore};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

struct Fixture {
    pool: SqlitePool,
    folders: FolderStore,
    messages: MessageStore,
}

impl Fixture {
    async fn new(provider: &str) -> Self {
        Self::with_pool(memory_pool().await, provider).await
    }

    async fn with_pool(pool: SqlitePool, provider: &str) -> Self {
        common::add_account(&pool, 1, provider).await;
        Self {
            folders: FolderStore::new(pool.clone()),
            messages: MessageStore::new(pool.clone()),
            pool,
        }
    }

    async fn folder(&self, name: &str, role: Option<FolderRole>) -> Folder {
        self.folders.upsert(1, name, role).await.unwrap()
    }

    /// A message with one RemoteUid per `(folder, uid)`
    async fn message(&self, uids: &[(&Folder, u32)]) -> i64 {
        let message_id = self.messages.insert_message(1).await.unwrap();
        for (folder, uid) in uids {
            self.messages
                .insert_remote_uid(1, folder.id, *uid, message_id)
                .await
                .unwrap();
        }
        message_id
    }

    /// Normalize and apply one batch, as a folder worker does
    async fn apply(&self, folder: &Folder, role: Option<FolderRole>, remote: Vec<(u32, RemoteFlags)>) -> reconcile::ReconcileReport {
        let remote: BTreeMap<u32, RemoteFlags> = remote.into_iter().collect();
        let folder = Folder {
            role,
            ..folder.clone()
        };
        let (batch, _) = normalize_batch(&folder, &remote);
        reconcile::update(&self.pool, 1, folder.id, role, &batch).await.unwrap()
    }

    async fn is_draft(&self, message_id: i64) -> bool {
        self.messages.get(message_id).await.unwrap().unwrap().is_draft
    }
}

#[tokio::test]
async fn test_draft_marker_only_counts_in_drafts_folder() {
    let fx = Fixture::new("custom").await;
    let drafts = fx.folder("Drafts", Some(FolderRole::Drafts)).await;
    let archive = fx.folder("Archive", Some(FolderRole::Archive)).await;

    let in_drafts = fx.message(&[(&drafts, 1)]).await;
    let in_archive = fx.message(&[(&archive, 1)]).await;

    fx.apply(&drafts, Some(FolderRole::Drafts), vec![(1, generic(&["\\Draft"]))]).await;
    fx.apply(&archive, Some(FolderRole::Archive), vec![(1, generic(&["\\Draft"]))]).await;

    assert!(fx.is_draft(in_drafts).await);
    assert!(!fx.is_draft(in_archive).await);
}

#[tokio::test]
async fn test_draft_flips_with_folder_role() {
    let fx = Fixture::new("custom").await;
    let folder = fx.folder("Drafts", Some(FolderRole::Drafts)).await;
    let message_id = fx.message(&[(&folder, 7)]).await;

    fx.apply(&folder, Some(FolderRole::Drafts), vec![(7, generic(&["\\Draft"]))]).await;
    assert!(fx.is_draft(message_id).await);

    // Same folder now reported as trash; the batch need not mention the uid
    let report = fx.apply(&folder, Some(FolderRole::Trash), vec![]).await;
    assert!(report.role_changed);
    assert!(!fx.is_draft(message_id).await);

    let report = fx.apply(&folder, Some(FolderRole::Drafts), vec![]).await;
    assert!(report.role_changed);
    assert!(fx.is_draft(message_id).await);
}

#[tokio::test]
async fn test_draft_cleared_when_marker_disappears() {
    let fx = Fixture::new("custom").await;
    let drafts = fx.folder("Drafts", Some(FolderRole::Drafts)).await;
    let message_id = fx.message(&[(&drafts, 3)]).await;

    fx.apply(&drafts, Some(FolderRole::Drafts), vec![(3, generic(&["\\Draft"]))]).await;
    assert!(fx.is_draft(message_id).await);

    fx.apply(&drafts, Some(FolderRole::Drafts), vec![(3, generic(&["\\Seen"]))]).await;
    assert!(!fx.is_draft(message_id).await);
}

#[tokio::test]
async fn test_gmail_draft_in_all_mail_is_not_a_draft() {
    let fx = Fixture::new("gmail").await;
    let all_mail = fx.folder("[Gmail]/All Mail", Some(FolderRole::All)).await;
    let unset = fx.folder("Receipts", None).await;
    let message_id = fx.message(&[(&all_mail, 1), (&unset, 1)]).await;

    fx.apply(&all_mail, Some(FolderRole::All), vec![(1, gmail(&["\\Draft"], vec![label("\\Draft")]))])
        .await;
    fx.apply(&unset, None, vec![(1, gmail(&["\\Draft"], vec![]))]).await;

    assert!(!fx.is_draft(message_id).await);
}

#[tokio::test]
async fn test_categories_are_the_union_across_folders() {
    let fx = Fixture::new("gmail").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    let all_mail = fx.folder("[Gmail]/All Mail", Some(FolderRole::All)).await;
    let message_id = fx.message(&[(&inbox, 10), (&all_mail, 20)]).await;

    fx.apply(&inbox, Some(FolderRole::Inbox), vec![(10, gmail(&[], vec![label("\\Important")]))])
        .await;
    fx.apply(&all_mail, Some(FolderRole::All), vec![(20, gmail(&[], vec![label("\\Starred")]))])
        .await;

    let message = fx.messages.get(message_id).await.unwrap().unwrap();
    let mut names = message.canonical_names();
    names.sort_unstable();
    assert_eq!(names, vec!["important", "starred"]);
    assert!(message.is_starred);

    // Re-applying folder A must not erase folder B's contribution
    fx.apply(&inbox, Some(FolderRole::Inbox), vec![(10, gmail(&[], vec![label("\\Important")]))])
        .await;
    let message = fx.messages.get(message_id).await.unwrap().unwrap();
    assert_eq!(message.categories.len(), 2);
}

#[tokio::test]
async fn test_numeric_label_becomes_display_category() {
    let fx = Fixture::new("gmail").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    let message_id = fx.message(&[(&inbox, 1)]).await;

    fx.apply(
        &inbox,
        Some(FolderRole::Inbox),
        vec![(1, gmail(&[], vec![GmailLabel::Id(42), label("\\Important"), label("Receipts")]))],
    )
    .await;

    let message = fx.messages.get(message_id).await.unwrap().unwrap();
    let mut display = message.display_names();
    display.sort_unstable();
    assert_eq!(display, vec!["42", "Receipts", "important"]);

    let numeric = message
        .categories
        .iter()
        .find(|c| c.display_name == "42")
        .unwrap();
    assert_eq!(numeric.name, None);
}

#[tokio::test]
async fn test_canonical_category_rows_are_reused() {
    let fx = Fixture::new("gmail").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    let first = fx.message(&[(&inbox, 1)]).await;
    let second = fx.message(&[(&inbox, 2)]).await;

    fx.apply(
        &inbox,
        Some(FolderRole::Inbox),
        vec![
            (1, gmail(&[], vec![label("\\Important")])),
            (2, gmail(&[], vec![label("\\Important")])),
        ],
    )
    .await;

    let categories = fx.messages.categories(1).await.unwrap();
    assert_eq!(categories.len(), 1);

    let first = fx.messages.get(first).await.unwrap().unwrap();
    let second = fx.messages.get(second).await.unwrap().unwrap();
    assert_eq!(first.categories[0].id, second.categories[0].id);
}

#[tokio::test]
async fn test_extra_flags_are_bounded() {
    let fx = Fixture::new("custom").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    fx.message(&[(&inbox, 1)]).await;

    let keywords: Vec<String> = (0..50).map(|i| format!("$Some-Long-Keyword-Number-{:02}", i)).collect();
    let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();

    let report = fx.apply(&inbox, Some(FolderRole::Inbox), vec![(1, generic(&keywords))]).await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.truncated, 1);

    let uid = fx.messages.remote_uid(1, inbox.id, 1).await.unwrap().unwrap();
    let serialized = serde_json::to_string(&uid.extra_flags).unwrap();
    assert!(serialized.len() <= EXTRA_FLAGS_MAX_BYTES);
    assert!(!uid.extra_flags.is_empty());
    assert_eq!(uid.extra_flags[0], "$Some-Long-Keyword-Number-00");
}

#[tokio::test]
async fn test_unknown_uids_are_skipped() {
    let fx = Fixture::new("custom").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    let message_id = fx.message(&[(&inbox, 1)]).await;

    let report = fx
        .apply(
            &inbox,
            Some(FolderRole::Inbox),
            vec![(1, generic(&["\\Seen"])), (2, generic(&["\\Seen"])), (3, generic(&[]))],
        )
        .await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped_unknown, 2);
    assert!(fx.messages.get(message_id).await.unwrap().unwrap().is_read);
    assert!(fx.messages.remote_uid(1, inbox.id, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_record_does_not_sink_the_batch() {
    let fx = Fixture::new("custom").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    let good = fx.message(&[(&inbox, 1)]).await;
    fx.message(&[(&inbox, 2)]).await;

    let mut remote = BTreeMap::new();
    remote.insert(1, generic(&["\\Seen"]));
    remote.insert(2, generic(&["bad\u{0}flag"]));

    let (batch, malformed) = normalize_batch(&inbox, &remote);
    assert_eq!(malformed, 1);

    let report = reconcile::update(&fx.pool, 1, inbox.id, inbox.role, &batch).await.unwrap();
    assert_eq!(report.updated, 1);
    assert!(fx.messages.get(good).await.unwrap().unwrap().is_read);
}

#[tokio::test]
async fn test_batches_apply_in_order() {
    let fx = Fixture::new("gmail").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    let message_id = fx.message(&[(&inbox, 1)]).await;

    fx.apply(
        &inbox,
        Some(FolderRole::Inbox),
        vec![(1, gmail(&[], vec![label("\\Important"), label("\\Starred")]))],
    )
    .await;

    // Batch 1 removes starred
    fx.apply(&inbox, Some(FolderRole::Inbox), vec![(1, gmail(&[], vec![label("\\Important")]))])
        .await;

    // Batch 2 adds an unrelated label
    fx.apply(
        &inbox,
        Some(FolderRole::Inbox),
        vec![(1, gmail(&[], vec![label("\\Important"), label("Travel")]))],
    )
    .await;

    let message = fx.messages.get(message_id).await.unwrap().unwrap();
    let mut display = message.display_names();
    display.sort_unstable();
    assert_eq!(display, vec!["Travel", "important"]);
    assert!(!message.is_starred);
}

#[tokio::test]
async fn test_generic_folder_contributes_its_category() {
    let fx = Fixture::new("custom").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;
    let receipts = fx.folder("Receipts", None).await;
    let message_id = fx.message(&[(&inbox, 1), (&receipts, 5)]).await;

    fx.apply(&inbox, Some(FolderRole::Inbox), vec![(1, generic(&["\\Flagged"]))]).await;
    fx.apply(&receipts, None, vec![(5, generic(&["\\Deleted"]))]).await;

    let message = fx.messages.get(message_id).await.unwrap().unwrap();
    let mut display = message.display_names();
    display.sort_unstable();
    assert_eq!(display, vec!["Receipts", "inbox", "starred"]);

    let uid = fx.messages.remote_uid(1, receipts.id, 5).await.unwrap().unwrap();
    assert!(uid.is_deleted);
}

#[tokio::test]
async fn test_empty_batch_without_role_change_is_a_noop() {
    let fx = Fixture::new("custom").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;

    let report = reconcile::update(&fx.pool, 1, inbox.id, Some(FolderRole::Inbox), &FlagBatch::new())
        .await
        .unwrap();

    assert_eq!(report, reconcile::ReconcileReport::default());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_folders_on_file_shard() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("shard0.db").display());
    let fx = Fixture::with_pool(store::open(&url, 8).await.unwrap(), "custom").await;

    let mut folders = Vec::new();
    for i in 0..4 {
        folders.push(fx.folder(&format!("Folder {}", i), None).await);
    }

    // Every message lives in all four folders, so the workers contend on it
    let mut message_ids = Vec::new();
    for uid in 1..=50u32 {
        let uids: Vec<(&Folder, u32)> = folders.iter().map(|folder| (folder, uid)).collect();
        message_ids.push(fx.message(&uids).await);
    }

    let mut workers = Vec::new();
    for folder in &folders {
        let pool = fx.pool.clone();
        let folder = folder.clone();
        workers.push(tokio::spawn(async move {
            for round in 0..20 {
                let flags: &[&str] = if round % 2 == 0 { &["\\Flagged"] } else { &["\\Seen"] };
                let remote: BTreeMap<u32, RemoteFlags> = (1..=50).map(|uid| (uid, generic(flags))).collect();
                let (batch, _) = normalize_batch(&folder, &remote);
                reconcile::update(&pool, 1, folder.id, None, &batch).await?;
            }
            Ok::<_, mailsync_rs::error::SyncError>(())
        }));
    }

    for worker in workers {
        worker.await.unwrap().unwrap();
    }

    for message_id in message_ids {
        let message = fx.messages.get(message_id).await.unwrap().unwrap();
        assert!(message.is_read);
        assert!(!message.is_starred);

        let mut display = message.display_names();
        display.sort_unstable();
        assert_eq!(display, vec!["Folder 0", "Folder 1", "Folder 2", "Folder 3"]);
    }
}

#[tokio::test]
async fn test_update_stamps_folder() {
    let fx = Fixture::new("custom").await;
    let inbox = fx.folder("INBOX", Some(FolderRole::Inbox)).await;

    reconcile::update(&fx.pool, 1, inbox.id, Some(FolderRole::Inbox), &FlagBatch::new())
        .await
        .unwrap();

    let (stamped,): (Option<String>,) = sqlx::query_as("SELECT reconciled_at FROM folders WHERE id = ?")
        .bind(inbox.id)
        .fetch_one(&fx.pool)
        .await
        .unwrap();
    assert!(stamped.is_some());
}
