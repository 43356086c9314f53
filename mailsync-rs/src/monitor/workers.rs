//! The set of folder workers owned by one monitor

use super::worker::FolderWorker;
use crate::error::{Result, SyncError};
use crate::model::FolderRole;
use crate::store::FolderStore;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct WorkerEntry {
    generation: u64,
    role: Option<FolderRole>,
    token: CancellationToken,
    /// Cancelled once the worker future has completed or been dropped
    done: CancellationToken,
    abort: AbortHandle,
}

/// How a worker left the set on its own
#[derive(Debug)]
pub enum WorkerExit {
    Stopped(i64),
    Failed(i64, SyncError),
    Panicked(String),
}

/// Running folder workers, keyed by folder id
///
/// Dropping the set aborts every worker and, if [`WorkerSet::shutdown`] did
/// not run, marks their folders stopped in the background.
pub struct WorkerSet {
    root: CancellationToken,
    tasks: JoinSet<(i64, u64, Result<()>)>,
    entries: HashMap<i64, WorkerEntry>,
    next_generation: u64,
    started: BTreeSet<i64>,
    pool: SqlitePool,
    cleaned: bool,
}

impl WorkerSet {
    pub fn new(root: CancellationToken, pool: SqlitePool) -> Self {
        Self {
            root,
            tasks: JoinSet::new(),
            entries: HashMap::new(),
            next_generation: 0,
            started: BTreeSet::new(),
            pool,
            cleaned: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn folder_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Role the running worker was started with, `None` if there is no worker
    pub fn role_of(&self, folder_id: i64) -> Option<Option<FolderRole>> {
        self.entries.get(&folder_id).map(|entry| entry.role)
    }

    pub fn spawn(&mut self, worker: FolderWorker) {
        let folder_id = worker.folder().id;
        let role = worker.folder().role;
        let generation = self.next_generation;
        self.next_generation += 1;

        let token = self.root.child_token();
        let done = CancellationToken::new();
        let guard = done.clone().drop_guard();
        let worker = Arc::new(worker);
        let worker_token = token.clone();

        let abort = self.tasks.spawn(async move {
            let _guard = guard;
            let result = worker.run(worker_token).await;
            (folder_id, generation, result)
        });

        debug!(folder_id, generation, "Folder worker started");
        self.started.insert(folder_id);
        self.entries.insert(
            folder_id,
            WorkerEntry {
                generation,
                role,
                token,
                done,
                abort,
            },
        );
    }

    /// Cancel one worker and wait up to `grace` for it, then abort it
    pub async fn stop(&mut self, folder_id: i64, grace: Duration) {
        let Some(entry) = self.entries.remove(&folder_id) else {
            return;
        };

        entry.token.cancel();
        if tokio::time::timeout(grace, entry.done.cancelled()).await.is_err() {
            warn!(folder_id, "Folder worker did not stop in time, aborting");
            entry.abort.abort();
        }
        self.started.remove(&folder_id);
    }

    /// Next worker that ended by itself; superseded or stopped workers are skipped
    ///
    /// Returns `None` when no worker is running. Cancel safe.
    pub async fn join_next(&mut self) -> Option<WorkerExit> {
        loop {
            match self.tasks.join_next().await? {
                Ok((folder_id, generation, result)) => {
                    let current = self
                        .entries
                        .get(&folder_id)
                        .map_or(false, |entry| entry.generation == generation);
                    if !current {
                        continue;
                    }
                    self.entries.remove(&folder_id);

                    return Some(match result {
                        Ok(()) => WorkerExit::Stopped(folder_id),
                        Err(e) => WorkerExit::Failed(folder_id, e),
                    });
                }
                Err(e) if e.is_cancelled() => continue,
                Err(e) => return Some(WorkerExit::Panicked(e.to_string())),
            }
        }
    }

    /// Stop every worker within `grace`, aborting stragglers
    ///
    /// Returns the folders that had a worker since the set was created.
    pub async fn shutdown(&mut self, grace: Duration) -> Vec<i64> {
        self.root.cancel();

        let drained = tokio::time::timeout(grace, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(remaining = self.tasks.len(), "Folder workers did not stop in time, aborting");
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        self.entries.clear();
        self.cleaned = true;
        std::mem::take(&mut self.started).into_iter().collect()
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        self.root.cancel();
        self.tasks.abort_all();

        if self.cleaned || self.started.is_empty() {
            return;
        }

        let folder_ids: Vec<i64> = std::mem::take(&mut self.started).into_iter().collect();
        let folders = FolderStore::new(self.pool.clone());

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = folders.mark_stopped(&folder_ids).await {
                        warn!(error = %e, "Failed to mark folders stopped");
                    }
                });
            }
            Err(_) => warn!(?folder_ids, "No runtime left to mark folders stopped"),
        }
    }
}
