//! Fakes and helpers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mailsync_rs::auth::{Credential, StaticTokenProvider};
use mailsync_rs::config::SyncConfig;
use mailsync_rs::heartbeat::{HeartbeatRegistry, MemoryHeartbeatRegistry};
use mailsync_rs::model::{
    AccountSnapshot, Folder, FolderRole, GenericFlagRecord, GmailFlagRecord, GmailLabel, NewAccount,
    RemoteFlags,
};
use mailsync_rs::monitor::SyncDeps;
use mailsync_rs::remote::{FetchedFlags, MailboxConnector, MailboxSession, RemoteFolder};
use mailsync_rs::store::{self, AccountStore};
use mailsync_rs::supervisor::RestartPolicy;
use mailsync_rs::{Result, SyncError};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Remote mailbox state shared by every session of a fake connector
#[derive(Default)]
pub struct FakeMailbox {
    folders: Mutex<Vec<RemoteFolder>>,
    flags: Mutex<HashMap<String, BTreeMap<u32, RemoteFlags>>>,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<HashMap<String, usize>>,
    revoked: Mutex<bool>,
}

impl FakeMailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_folders(&self, folders: &[(&str, Option<FolderRole>)]) {
        *self.folders.lock().unwrap() = folders
            .iter()
            .map(|(name, role)| RemoteFolder::new(*name, *role))
            .collect();
    }

    pub fn set_flags(&self, folder: &str, records: BTreeMap<u32, RemoteFlags>) {
        self.flags.lock().unwrap().insert(folder.to_string(), records);
    }

    /// Make every fetch of `folder` fail with a connection error
    pub fn fail_folder(&self, folder: &str) {
        self.failing.lock().unwrap().insert(folder.to_string());
    }

    pub fn revoke(&self) {
        *self.revoked.lock().unwrap() = true;
    }

    pub fn fetch_count(&self, folder: &str) -> usize {
        self.fetches.lock().unwrap().get(folder).copied().unwrap_or(0)
    }
}

pub struct FakeConnector {
    mailbox: Arc<FakeMailbox>,
}

impl FakeConnector {
    pub fn new(mailbox: Arc<FakeMailbox>) -> Arc<Self> {
        Arc::new(Self { mailbox })
    }
}

#[async_trait]
impl MailboxConnector for FakeConnector {
    async fn connect(&self, _account: &AccountSnapshot) -> Result<Box<dyn MailboxSession>> {
        Ok(Box::new(FakeSession {
            mailbox: Arc::clone(&self.mailbox),
        }))
    }
}

struct FakeSession {
    mailbox: Arc<FakeMailbox>,
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn login(&mut self, _credential: &Credential) -> Result<()> {
        if *self.mailbox.revoked.lock().unwrap() {
            return Err(SyncError::GrantRevoked("invalid_grant".to_string()));
        }
        Ok(())
    }

    async fn list_folders(&mut self) -> Result<Vec<RemoteFolder>> {
        Ok(self.mailbox.folders.lock().unwrap().clone())
    }

    async fn fetch_flags(&mut self, folder: &Folder, _since: Option<u64>) -> Result<FetchedFlags> {
        *self
            .mailbox
            .fetches
            .lock()
            .unwrap()
            .entry(folder.name.clone())
            .or_default() += 1;

        if self.mailbox.failing.lock().unwrap().contains(&folder.name) {
            return Err(SyncError::Connection(format!("{} unavailable", folder.name)));
        }

        let records = self
            .mailbox
            .flags
            .lock()
            .unwrap()
            .get(&folder.name)
            .cloned()
            .unwrap_or_default();

        Ok(FetchedFlags {
            records,
            cursor: Some(1),
        })
    }
}

pub fn generic(flags: &[&str]) -> RemoteFlags {
    RemoteFlags::Generic(GenericFlagRecord {
        flags: flags.iter().map(|f| f.to_string()).collect(),
        modseq: None,
    })
}

pub fn gmail(flags: &[&str], labels: Vec<GmailLabel>) -> RemoteFlags {
    RemoteFlags::Gmail(GmailFlagRecord {
        flags: flags.iter().map(|f| f.to_string()).collect(),
        labels,
        modseq: None,
    })
}

pub fn label(name: &str) -> GmailLabel {
    GmailLabel::Name(name.to_string())
}

/// Fast timings so monitors react within a test
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        hostname: "sync-test".to_string(),
        device_id: 0,
        poll_interval_ms: 20,
        folder_refresh_interval_ms: 50,
        account_poll_interval_ms: 50,
        shutdown_grace_ms: 1000,
        restart: RestartPolicy::Fixed { delay_ms: 5 },
        ..SyncConfig::default()
    }
}

pub async fn memory_pool() -> SqlitePool {
    store::open_in_memory().await.unwrap()
}

pub async fn add_account(pool: &SqlitePool, id: i64, provider: &str) -> AccountSnapshot {
    let account = NewAccount {
        credential_ref: Some(format!("secret-{}", id)),
        ..NewAccount::new(id, format!("user{}@example.com", id), provider).with_desired_host("sync-test")
    };
    AccountStore::new(pool.clone())
        .insert(&account)
        .await
        .unwrap()
        .snapshot()
}

pub fn tokens_for(ids: &[i64]) -> Arc<StaticTokenProvider> {
    let provider = ids.iter().fold(StaticTokenProvider::new(), |provider, id| {
        provider.with_password(format!("secret-{}", id), "password")
    });
    Arc::new(provider)
}

pub fn deps(
    pool: &SqlitePool,
    mailbox: &Arc<FakeMailbox>,
    heartbeat: &Arc<MemoryHeartbeatRegistry>,
    account_ids: &[i64],
) -> SyncDeps {
    SyncDeps {
        pool: pool.clone(),
        connector: FakeConnector::new(Arc::clone(mailbox)),
        tokens: tokens_for(account_ids),
        heartbeat: Arc::clone(heartbeat) as Arc<dyn HeartbeatRegistry>,
    }
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
