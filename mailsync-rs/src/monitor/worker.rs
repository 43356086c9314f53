use super::types::SyncDeps;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::heartbeat::HeartbeatKey;
use crate::model::{normalize_batch, AccountSnapshot, Folder, FolderSyncStatus};
use crate::reconcile;
use crate::remote::MailboxSession;
use crate::store::{AccountStore, FolderStore};
use crate::supervisor::{retry_with_logging, LogContext};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Keeps one folder in sync, forever
pub struct FolderWorker {
    account: AccountSnapshot,
    /// Folder with the role the remote currently reports
    folder: Folder,
    deps: SyncDeps,
    config: Arc<SyncConfig>,
}

impl FolderWorker {
    pub fn new(account: AccountSnapshot, folder: Folder, deps: SyncDeps, config: Arc<SyncConfig>) -> Self {
        Self {
            account,
            folder,
            deps,
            config,
        }
    }

    pub fn folder(&self) -> &Folder {
        &self.folder
    }

    /// Run the sync loop under the retry supervisor until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let ctx = LogContext::new("folder worker", self.account.id, self.account.provider.clone())
            .with_folder(self.folder.name.clone());

        let worker = Arc::clone(&self);
        retry_with_logging(
            move || {
                let worker = Arc::clone(&worker);
                async move { worker.sync().await }
            },
            &self.config.restart,
            &self.config.escalation,
            &ctx,
            &shutdown,
        )
        .await
    }

    async fn sync(&self) -> Result<()> {
        let folders = FolderStore::new(self.deps.pool.clone());
        let mut session = open_session(&self.account, &self.deps).await?;

        folders.set_status(self.folder.id, FolderSyncStatus::Running).await?;
        let mut cursor = folders
            .get(self.folder.id)
            .await?
            .ok_or(SyncError::FolderNotFound(self.folder.id))?
            .sync_cursor;

        loop {
            let fetched = session.fetch_flags(&self.folder, cursor).await?;
            let (batch, malformed) = normalize_batch(&self.folder, &fetched.records);

            let report = reconcile::update(
                &self.deps.pool,
                self.account.id,
                self.folder.id,
                self.folder.role,
                &batch,
            )
            .await?;

            debug!(
                fetched = fetched.records.len(),
                malformed,
                updated = report.updated,
                skipped = report.skipped_unknown,
                "Folder poll complete"
            );

            if fetched.cursor.is_some() && fetched.cursor != cursor {
                folders.set_cursor(self.folder.id, fetched.cursor).await?;
                cursor = fetched.cursor;
            }

            AccountStore::new(self.deps.pool.clone())
                .record_synced(self.account.id, Utc::now())
                .await?;

            let key = HeartbeatKey::device(self.account.id, self.folder.id, self.config.device_id);
            if let Err(e) = self.deps.heartbeat.touch(&key).await {
                warn!(key = %key, error = %e, "Heartbeat touch failed");
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}

/// Connect and log in with a fresh credential
pub(crate) async fn open_session(account: &AccountSnapshot, deps: &SyncDeps) -> Result<Box<dyn MailboxSession>> {
    let credential = deps.tokens.get_token(account).await?;
    let mut session = deps.connector.connect(account).await?;

    if let Err(e) = session.login(&credential).await {
        if matches!(e, SyncError::Auth(_)) {
            deps.tokens.invalidate(account.id).await;
        }
        return Err(e);
    }

    Ok(session)
}
