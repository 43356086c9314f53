use crate::model::flags::CanonicalFlag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical role of a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderRole {
    Inbox,
    Drafts,
    Sent,
    Trash,
    Spam,
    Archive,
    All,
    Important,
    Starred,
}

impl FolderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderRole::Inbox => "inbox",
            FolderRole::Drafts => "drafts",
            FolderRole::Sent => "sent",
            FolderRole::Trash => "trash",
            FolderRole::Spam => "spam",
            FolderRole::Archive => "archive",
            FolderRole::All => "all",
            FolderRole::Important => "important",
            FolderRole::Starred => "starred",
        }
    }

    /// Category a message gets from living in a folder with this role
    pub fn canonical_flag(&self) -> CanonicalFlag {
        match self {
            FolderRole::Inbox => CanonicalFlag::Inbox,
            FolderRole::Drafts => CanonicalFlag::Drafts,
            FolderRole::Sent => CanonicalFlag::Sent,
            FolderRole::Trash => CanonicalFlag::Trash,
            FolderRole::Spam => CanonicalFlag::Spam,
            FolderRole::Archive => CanonicalFlag::Archive,
            FolderRole::All => CanonicalFlag::All,
            FolderRole::Important => CanonicalFlag::Important,
            FolderRole::Starred => CanonicalFlag::Starred,
        }
    }
}

impl FromStr for FolderRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbox" => Ok(FolderRole::Inbox),
            "drafts" => Ok(FolderRole::Drafts),
            "sent" => Ok(FolderRole::Sent),
            "trash" => Ok(FolderRole::Trash),
            "spam" | "junk" => Ok(FolderRole::Spam),
            "archive" => Ok(FolderRole::Archive),
            "all" => Ok(FolderRole::All),
            "important" => Ok(FolderRole::Important),
            "starred" => Ok(FolderRole::Starred),
            other => Err(format!("unknown folder role: {}", other)),
        }
    }
}

impl fmt::Display for FolderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-folder worker status persisted for restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderSyncStatus {
    Idle,
    Running,
    Stopped,
}

impl FolderSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderSyncStatus::Idle => "idle",
            FolderSyncStatus::Running => "running",
            FolderSyncStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => FolderSyncStatus::Running,
            "stopped" => FolderSyncStatus::Stopped,
            _ => FolderSyncStatus::Idle,
        }
    }
}

/// A named mailbox partition of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub role: Option<FolderRole>,
    pub sync_status: FolderSyncStatus,
    /// Highest remote position already reconciled (provider-defined)
    pub sync_cursor: Option<u64>,
}
