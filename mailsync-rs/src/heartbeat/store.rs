use super::types::{HeartbeatEntry, HeartbeatKey, HeartbeatSelector};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Shared liveness store
///
/// Writes are last-writer-wins per key: only the owning worker touches its key.
#[async_trait]
pub trait HeartbeatRegistry: Send + Sync {
    /// Record "alive now" for `key`
    async fn touch(&self, key: &HeartbeatKey) -> Result<()>;

    async fn query(&self, selector: &HeartbeatSelector) -> Result<Vec<HeartbeatEntry>>;

    /// Remove matching entries, returning how many were removed
    async fn clear(&self, selector: &HeartbeatSelector) -> Result<usize>;
}

/// In-process registry, also the backing store of the registry server
#[derive(Default)]
pub struct MemoryHeartbeatRegistry {
    entries: RwLock<BTreeMap<HeartbeatKey, DateTime<Utc>>>,
}

impl MemoryHeartbeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn touch_at(&self, key: HeartbeatKey, at: DateTime<Utc>) {
        self.entries.write().await.insert(key, at);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every entry older than `threshold`, across all accounts
    pub async fn stale_entries(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<HeartbeatEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(key, last_seen)| HeartbeatEntry {
                key: *key,
                last_seen: *last_seen,
            })
            .filter(|entry| entry.is_stale(now, threshold))
            .collect()
    }
}

#[async_trait]
impl HeartbeatRegistry for MemoryHeartbeatRegistry {
    async fn touch(&self, key: &HeartbeatKey) -> Result<()> {
        self.touch_at(*key, Utc::now()).await;
        Ok(())
    }

    async fn query(&self, selector: &HeartbeatSelector) -> Result<Vec<HeartbeatEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(HeartbeatKey::account(selector.account_id)..)
            .take_while(|(key, _)| key.account_id == selector.account_id)
            .filter(|(key, _)| selector.matches(key))
            .map(|(key, last_seen)| HeartbeatEntry {
                key: *key,
                last_seen: *last_seen,
            })
            .collect())
    }

    async fn clear(&self, selector: &HeartbeatSelector) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !selector.matches(key));
        Ok(before - entries.len())
    }
}
