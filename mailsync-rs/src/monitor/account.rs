use super::types::{MonitorExit, MonitorState, SyncDeps};
use super::worker::{open_session, FolderWorker};
use super::workers::{WorkerExit, WorkerSet};
use crate::config::SyncConfig;
use crate::error::{ErrorKind, Result, SyncError};
use crate::heartbeat::HeartbeatSelector;
use crate::model::{AccountSnapshot, Folder};
use crate::reconcile;
use crate::store::{AccountStore, FolderStore};
use crate::supervisor::LogContext;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Supervises the folder workers of one account
pub struct AccountSyncMonitor {
    account: AccountSnapshot,
    deps: SyncDeps,
    config: Arc<SyncConfig>,
    state: watch::Sender<MonitorState>,
}

impl AccountSyncMonitor {
    /// Bind the monitor to an account snapshot taken at launch
    pub fn new(account: AccountSnapshot, deps: SyncDeps, config: Arc<SyncConfig>) -> Self {
        let (state, _) = watch::channel(MonitorState::Starting);
        Self {
            account,
            deps,
            config,
            state,
        }
    }

    pub fn account(&self) -> &AccountSnapshot {
        &self.account
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` fires or an error needs escalation
    ///
    /// Cleanup runs on every exit path that reaches the end of this future;
    /// if the future is dropped instead, the worker set's drop guard still
    /// aborts the workers and marks their folders stopped.
    pub async fn run(self, shutdown: CancellationToken) -> Result<MonitorExit> {
        let ctx = LogContext::new("account monitor", self.account.id, self.account.provider.clone());

        async move {
            info!(account = %self.account, "Starting account sync");
            let mut workers = WorkerSet::new(shutdown.child_token(), self.deps.pool.clone());

            self.state.send_replace(MonitorState::Running);
            let outcome = self.supervise(&mut workers, &shutdown).await;

            self.state.send_replace(MonitorState::Cleanup);
            self.cleanup(&mut workers).await;
            self.state.send_replace(MonitorState::Stopped);

            match &outcome {
                Ok(exit) => info!(?exit, "Account sync stopped"),
                Err(e) => error!(error = %e, "Account sync failed"),
            }
            outcome
        }
        .instrument(ctx.span())
        .await
    }

    async fn supervise(&self, workers: &mut WorkerSet, shutdown: &CancellationToken) -> Result<MonitorExit> {
        let mut refresh = tokio::time::interval(self.config.folder_refresh_interval());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(MonitorExit::Shutdown),
                Some(exit) = workers.join_next() => match exit {
                    WorkerExit::Stopped(folder_id) => {
                        debug!(folder_id, "Folder worker stopped");
                    }
                    WorkerExit::Failed(folder_id, e) => {
                        if e.needs_attention() {
                            return self.pause(e).await;
                        }
                        error!(folder_id, error = %e, "Folder worker escalated");
                        return Err(e);
                    }
                    WorkerExit::Panicked(message) => {
                        return Err(SyncError::TaskPanicked(format!("folder worker: {}", message)));
                    }
                },
                _ = refresh.tick() => {
                    if let Err(e) = self.refresh_folders(workers).await {
                        match e.kind() {
                            ErrorKind::Permanent => return self.pause(e).await,
                            ErrorKind::Fatal => return Err(e),
                            ErrorKind::Transient | ErrorKind::DataIntegrity => {
                                warn!(error = %e, "Folder refresh failed, keeping current workers");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Make the worker set match the remote folder list
    async fn refresh_folders(&self, workers: &mut WorkerSet) -> Result<()> {
        let mut session = open_session(&self.account, &self.deps).await?;
        let remote = session.list_folders().await?;
        drop(session);

        let folders = FolderStore::new(self.deps.pool.clone());
        let mut listed = HashSet::new();

        for remote_folder in remote {
            let stored = folders.upsert(self.account.id, &remote_folder.name, remote_folder.role).await?;
            listed.insert(stored.id);

            match workers.role_of(stored.id) {
                Some(role) if role == remote_folder.role => continue,
                Some(_) => {
                    info!(folder = %stored.name, "Folder role changed, restarting worker");
                    workers.stop(stored.id, self.config.shutdown_grace()).await;
                }
                None => {}
            }

            let folder = Folder {
                role: remote_folder.role,
                ..stored
            };
            workers.spawn(FolderWorker::new(
                self.account.clone(),
                folder,
                self.deps.clone(),
                Arc::clone(&self.config),
            ));
        }

        for folder in folders.list(self.account.id).await? {
            if listed.contains(&folder.id) {
                continue;
            }
            info!(folder = %folder.name, "Folder gone remotely");
            workers.stop(folder.id, self.config.shutdown_grace()).await;
            reconcile::remove_folder(&self.deps.pool, self.account.id, folder.id).await?;
        }

        Ok(())
    }

    /// Stop syncing until an operator fixes the account
    async fn pause(&self, e: SyncError) -> Result<MonitorExit> {
        warn!(error = %e, "Pausing account sync");
        AccountStore::new(self.deps.pool.clone())
            .mark_invalid(self.account.id, &e.to_string())
            .await?;
        Ok(MonitorExit::NeedsAttention(e.to_string()))
    }

    async fn cleanup(&self, workers: &mut WorkerSet) {
        let folder_ids = workers.shutdown(self.config.shutdown_grace()).await;

        if let Err(e) = FolderStore::new(self.deps.pool.clone()).mark_stopped(&folder_ids).await {
            error!(error = %e, "Failed to record stopped folders");
        }

        let selector = HeartbeatSelector::new(self.account.id, None, Some(self.config.device_id));
        match self.deps.heartbeat.clear(&selector).await {
            Ok(cleared) => debug!(cleared, "Heartbeat entries cleared"),
            Err(e) => warn!(error = %e, "Failed to clear heartbeat entries"),
        }
    }
}

/// A monitor running on its own task
pub struct MonitorHandle {
    account_id: i64,
    shutdown: CancellationToken,
    state: watch::Receiver<MonitorState>,
    task: JoinHandle<Result<MonitorExit>>,
}

impl MonitorHandle {
    pub fn spawn(monitor: AccountSyncMonitor, parent: &CancellationToken) -> Self {
        let account_id = monitor.account().id;
        let shutdown = parent.child_token();
        let state = monitor.subscribe();
        let task = tokio::spawn(monitor.run(shutdown.clone()));

        Self {
            account_id,
            shutdown,
            state,
            task,
        }
    }

    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Resolves once the monitor reaches `wanted`
    pub async fn wait_for(&mut self, wanted: MonitorState) -> Result<()> {
        self.state
            .wait_for(|state| *state == wanted)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::TaskPanicked(format!("monitor {} went away", self.account_id)))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request shutdown and wait for the monitor's exit
    pub async fn shutdown(self) -> Result<MonitorExit> {
        self.shutdown.cancel();
        self.join().await
    }

    pub async fn join(self) -> Result<MonitorExit> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SyncError::TaskPanicked(format!(
                "account monitor {}: {}",
                self.account_id, e
            ))),
        }
    }
}
