//! Remote mailbox protocol seam
//!
//! Wire-level IMAP handling lives behind these traits. A connector opens one
//! session per folder worker; sessions are not shared between workers.

use crate::auth::Credential;
use crate::error::Result;
use crate::model::{AccountSnapshot, Folder, FolderRole, RemoteFlags};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A folder as listed by the remote server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub name: String,
    pub role: Option<FolderRole>,
}

impl RemoteFolder {
    pub fn new(name: impl Into<String>, role: Option<FolderRole>) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// One `fetch_flags` result: raw flag records and the position to resume from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedFlags {
    pub records: BTreeMap<u32, RemoteFlags>,
    pub cursor: Option<u64>,
}

#[async_trait]
pub trait MailboxSession: Send {
    async fn login(&mut self, credential: &Credential) -> Result<()>;

    async fn list_folders(&mut self) -> Result<Vec<RemoteFolder>>;

    /// Flags changed since `since`; batch size is up to the implementation
    async fn fetch_flags(&mut self, folder: &Folder, since: Option<u64>) -> Result<FetchedFlags>;
}

#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self, account: &AccountSnapshot) -> Result<Box<dyn MailboxSession>>;
}
