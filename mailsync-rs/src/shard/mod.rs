//! Sharded account directory
//!
//! Account ids carry their shard in the top 16 bits, so resolving an account
//! never needs a lookup table.

use crate::config::DatabaseHost;
use crate::error::{Result, SyncError};
use crate::store;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

/// Number of low bits holding the per-shard row id
pub const SHARD_SHIFT: u32 = 48;

pub fn shard_id(account_id: i64) -> i64 {
    account_id >> SHARD_SHIFT
}

/// Open pools for every enabled shard
#[derive(Clone, Default)]
pub struct ShardDirectory {
    shards: BTreeMap<i64, SqlitePool>,
}

impl ShardDirectory {
    pub async fn connect(hosts: &[DatabaseHost]) -> Result<Self> {
        let mut shards = BTreeMap::new();

        for host in hosts {
            for shard in &host.shards {
                if shard.disabled {
                    info!(host = %host.name, shard_id = shard.id, "Skipping disabled shard");
                    continue;
                }

                let pool = store::open(&shard.url, shard.max_connections).await?;
                info!(
                    host = %host.name,
                    shard_id = shard.id,
                    max_connections = shard.max_connections,
                    "Shard connected"
                );
                shards.insert(shard.id, pool);
            }
        }

        Ok(Self { shards })
    }

    /// Build a directory over pools that are already open
    pub fn from_pools(pools: impl IntoIterator<Item = (i64, SqlitePool)>) -> Self {
        Self {
            shards: pools.into_iter().collect(),
        }
    }

    /// Pool owning `account_id`
    pub fn resolve(&self, account_id: i64) -> Result<SqlitePool> {
        let shard_id = shard_id(account_id);
        self.shards
            .get(&shard_id)
            .cloned()
            .ok_or(SyncError::ShardNotFound { account_id, shard_id })
    }

    pub fn pools(&self) -> impl Iterator<Item = (i64, &SqlitePool)> {
        self.shards.iter().map(|(id, pool)| (*id, pool))
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}
