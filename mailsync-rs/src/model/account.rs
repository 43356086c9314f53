use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync lifecycle recorded on the account row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Running,
    Stopped,
    /// Credentials revoked or invalid: waiting for an operator
    Invalid,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Running => "running",
            SyncState::Stopped => "stopped",
            SyncState::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SyncState::Running),
            "stopped" => Some(SyncState::Stopped),
            "invalid" => Some(SyncState::Invalid),
            _ => None,
        }
    }
}

/// Flag dialect spoken by the account's provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Labels (canonical, user and numeric ids) next to IMAP flags
    Gmail,
    /// Plain IMAP system flags and keywords
    Generic,
}

/// A synchronized remote mailbox owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub namespace_id: i64,
    pub email_address: String,
    pub provider: String,
    pub sync_should_run: bool,
    pub sync_host: Option<String>,
    pub desired_sync_host: Option<String>,
    pub sync_state: Option<SyncState>,
    pub sync_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub credential_ref: Option<String>,
}

impl Account {
    pub fn dialect(&self) -> Dialect {
        Dialect::for_provider(&self.provider)
    }

    /// Freeze the identity a monitor binds at launch
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id,
            namespace_id: self.namespace_id,
            email_address: self.email_address.clone(),
            provider: self.provider.clone(),
            credential_ref: self.credential_ref.clone(),
        }
    }
}

impl Dialect {
    pub fn for_provider(provider: &str) -> Self {
        match provider.to_lowercase().as_str() {
            "gmail" | "google" => Dialect::Gmail,
            _ => Dialect::Generic,
        }
    }
}

/// Immutable account identity, safe to share with every worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub id: i64,
    pub namespace_id: i64,
    pub email_address: String,
    pub provider: String,
    pub credential_ref: Option<String>,
}

impl AccountSnapshot {
    pub fn dialect(&self) -> Dialect {
        Dialect::for_provider(&self.provider)
    }
}

impl fmt::Display for AccountSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> ({})", self.id, self.email_address, self.provider)
    }
}

/// Fields needed to provision an account row
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: i64,
    pub email_address: String,
    pub provider: String,
    pub desired_sync_host: Option<String>,
    pub credential_ref: Option<String>,
}

impl NewAccount {
    pub fn new(id: i64, email_address: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id,
            email_address: email_address.into(),
            provider: provider.into(),
            desired_sync_host: None,
            credential_ref: None,
        }
    }

    pub fn with_desired_host(mut self, host: impl Into<String>) -> Self {
        self.desired_sync_host = Some(host.into());
        self
    }
}
