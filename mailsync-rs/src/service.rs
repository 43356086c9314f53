//! Process-level scheduler
//!
//! Polls every shard for accounts whose `desired_sync_host` is this host
//! and keeps exactly one monitor running for each of them.

use crate::auth::TokenProvider;
use crate::config::SyncConfig;
use crate::error::{ErrorKind, Result, SyncError};
use crate::heartbeat::HeartbeatRegistry;
use crate::model::Account;
use crate::monitor::{AccountSyncMonitor, MonitorExit, MonitorHandle, SyncDeps};
use crate::remote::MailboxConnector;
use crate::shard::ShardDirectory;
use crate::store::AccountStore;
use crate::supervisor::FatalAction;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A running monitor and the shard its account was found on
struct Assigned {
    handle: MonitorHandle,
    shard_id: i64,
    pool: SqlitePool,
}

pub struct SyncService {
    config: Arc<SyncConfig>,
    shards: ShardDirectory,
    connector: Arc<dyn MailboxConnector>,
    tokens: Arc<dyn TokenProvider>,
    heartbeat: Arc<dyn HeartbeatRegistry>,
    monitors: HashMap<i64, Assigned>,
}

impl SyncService {
    pub fn new(
        config: Arc<SyncConfig>,
        shards: ShardDirectory,
        connector: Arc<dyn MailboxConnector>,
        tokens: Arc<dyn TokenProvider>,
        heartbeat: Arc<dyn HeartbeatRegistry>,
    ) -> Self {
        Self {
            config,
            shards,
            connector,
            tokens,
            heartbeat,
            monitors: HashMap::new(),
        }
    }

    /// Account ids with a live monitor, sorted
    pub fn running(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.monitors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Schedule accounts until `shutdown` fires
    ///
    /// Returns an error only when a monitor escalates and the escalation
    /// policy says to stop the process.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(host = %self.config.hostname, shards = self.shards.len(), "Sync service started");

        let mut poll = tokio::time::interval(self.config.account_poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                _ = poll.tick() => {
                    if let Err(e) = self.poll_once(&shutdown).await {
                        if e.kind() == ErrorKind::Fatal {
                            break Err(e);
                        }
                        warn!(error = %e, "Account poll failed");
                    }
                }
            }
        };

        self.stop_all().await;
        info!("Sync service stopped");
        outcome
    }

    /// One scheduling pass: reap, stop, start
    ///
    /// A shard that cannot be listed, or an account that cannot be started,
    /// only affects itself. Every monitor is handled before an escalation is
    /// returned.
    pub async fn poll_once(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let mut escalation = self.reap().await;

        let mut desired: BTreeMap<i64, (Account, i64, SqlitePool)> = BTreeMap::new();
        let mut unavailable = HashSet::new();
        for (shard_id, pool) in self.shards.pools() {
            match AccountStore::new(pool.clone()).list_desired_on(&self.config.hostname).await {
                Ok(accounts) => {
                    for account in accounts {
                        desired.insert(account.id, (account, shard_id, pool.clone()));
                    }
                }
                Err(e) => {
                    warn!(shard_id, error = %e, "Cannot list accounts on shard, keeping its monitors");
                    unavailable.insert(shard_id);
                }
            }
        }

        let moved: Vec<i64> = self
            .monitors
            .iter()
            .filter(|(id, assigned)| {
                !desired.contains_key(id) && !unavailable.contains(&assigned.shard_id)
            })
            .map(|(id, _)| *id)
            .collect();
        for account_id in moved {
            info!(account_id, "Account no longer assigned here, stopping");
            if let Some(assigned) = self.monitors.remove(&account_id) {
                let outcome = assigned.handle.shutdown().await;
                let result = self.finish(account_id, &assigned.pool, outcome).await;
                escalation = escalation.and(result);
            }
        }

        for (account_id, (account, shard_id, pool)) in desired {
            if self.monitors.contains_key(&account_id) {
                continue;
            }
            if let Err(e) = self.start(account, shard_id, pool, shutdown).await {
                warn!(account_id, error = %e, "Failed to start monitor");
            }
        }

        escalation
    }

    async fn start(
        &mut self,
        account: Account,
        shard_id: i64,
        pool: SqlitePool,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        AccountStore::new(pool.clone()).claim(account.id, &self.config.hostname).await?;

        let deps = SyncDeps {
            pool: pool.clone(),
            connector: Arc::clone(&self.connector),
            tokens: Arc::clone(&self.tokens),
            heartbeat: Arc::clone(&self.heartbeat),
        };
        let monitor = AccountSyncMonitor::new(account.snapshot(), deps, Arc::clone(&self.config));

        info!(account_id = account.id, shard_id, email = %account.email_address, "Starting monitor");
        self.monitors.insert(
            account.id,
            Assigned {
                handle: MonitorHandle::spawn(monitor, shutdown),
                shard_id,
                pool,
            },
        );
        Ok(())
    }

    /// Collect monitors that ended by themselves
    async fn reap(&mut self) -> Result<()> {
        let finished: Vec<i64> = self
            .monitors
            .iter()
            .filter(|(_, assigned)| assigned.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        let mut escalation = Ok(());
        for account_id in finished {
            if let Some(assigned) = self.monitors.remove(&account_id) {
                let outcome = assigned.handle.join().await;
                let result = self.finish(account_id, &assigned.pool, outcome).await;
                escalation = escalation.and(result);
            }
        }
        escalation
    }

    /// Release the account and apply the escalation policy to failures
    async fn finish(&self, account_id: i64, pool: &SqlitePool, outcome: Result<MonitorExit>) -> Result<()> {
        release(pool, account_id, &self.config.hostname).await;

        match outcome {
            Ok(MonitorExit::Shutdown) => Ok(()),
            Ok(MonitorExit::NeedsAttention(reason)) => {
                warn!(account_id, reason = %reason, "Account parked until an operator steps in");
                Ok(())
            }
            Err(e) => match self.config.escalation.on_fatal {
                FatalAction::RestartMonitor => {
                    error!(account_id, error = %e, "Monitor failed, restarting on next poll");
                    Ok(())
                }
                FatalAction::StopProcess => {
                    error!(account_id, error = %e, "Monitor failed, stopping the process");
                    Err(SyncError::Escalated {
                        account_id,
                        source: Box::new(e),
                    })
                }
            },
        }
    }

    async fn stop_all(&mut self) {
        for (account_id, assigned) in self.monitors.drain().collect::<Vec<_>>() {
            match assigned.handle.shutdown().await {
                Ok(_) => {}
                Err(e) => warn!(account_id, error = %e, "Monitor failed during shutdown"),
            }
            release(&assigned.pool, account_id, &self.config.hostname).await;
        }
    }
}

async fn release(pool: &SqlitePool, account_id: i64, host: &str) {
    if let Err(e) = AccountStore::new(pool.clone()).release(account_id, host).await {
        warn!(account_id, error = %e, "Failed to release account");
    }
}
