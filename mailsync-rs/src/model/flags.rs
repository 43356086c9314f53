//! Remote flag dialects and the normalized flag record
//!
//! Providers report message state in two shapes:
//! - Gmail: IMAP flags plus `X-GM-LABELS`, where labels are system labels
//!   (`\Important`), user labels (`foo`) or bare numeric label ids (`42`)
//! - Generic IMAP: system flags (`\Seen`, `\Draft`, ...) and keywords
//!
//! Both are normalized at the boundary into a [`FlagRecord`], the only shape
//! the reconciliation engine consumes.

use crate::error::{Result, SyncError};
use crate::model::folder::Folder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// Labels with a canonical category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalFlag {
    Inbox,
    Important,
    Starred,
    Sent,
    Drafts,
    Trash,
    Spam,
    Archive,
    All,
}

impl CanonicalFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalFlag::Inbox => "inbox",
            CanonicalFlag::Important => "important",
            CanonicalFlag::Starred => "starred",
            CanonicalFlag::Sent => "sent",
            CanonicalFlag::Drafts => "drafts",
            CanonicalFlag::Trash => "trash",
            CanonicalFlag::Spam => "spam",
            CanonicalFlag::Archive => "archive",
            CanonicalFlag::All => "all",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "inbox" => Some(CanonicalFlag::Inbox),
            "important" => Some(CanonicalFlag::Important),
            "starred" => Some(CanonicalFlag::Starred),
            "sent" => Some(CanonicalFlag::Sent),
            "drafts" => Some(CanonicalFlag::Drafts),
            "trash" => Some(CanonicalFlag::Trash),
            "spam" => Some(CanonicalFlag::Spam),
            "archive" => Some(CanonicalFlag::Archive),
            "all" => Some(CanonicalFlag::All),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized state of one remote message in one folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagRecord {
    pub canonical_flags: BTreeSet<CanonicalFlag>,
    /// Labels without a canonical mapping, kept as display-only categories
    pub custom_flags: BTreeSet<String>,
    /// Keywords that are not labels, stored on the RemoteUid only
    pub extra_flags: BTreeSet<String>,
    pub has_draft_marker: bool,
    /// `None` when the dialect does not report deletion
    pub has_deleted_marker: Option<bool>,
    pub is_seen: bool,
}

impl FlagRecord {
    pub fn with_canonical(mut self, flag: CanonicalFlag) -> Self {
        self.canonical_flags.insert(flag);
        self
    }

    pub fn with_custom(mut self, label: impl Into<String>) -> Self {
        self.custom_flags.insert(label.into());
        self
    }

    pub fn with_draft_marker(mut self) -> Self {
        self.has_draft_marker = true;
        self
    }
}

/// Remote identifier -> normalized flags, for one folder and one polling cycle
pub type FlagBatch = BTreeMap<u32, FlagRecord>;

/// A Gmail label; numeric label ids arrive untyped and stay opaque
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GmailLabel {
    Id(u64),
    Name(String),
}

impl fmt::Display for GmailLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GmailLabel::Id(id) => write!(f, "{}", id),
            GmailLabel::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailFlagRecord {
    pub flags: Vec<String>,
    pub labels: Vec<GmailLabel>,
    pub modseq: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericFlagRecord {
    pub flags: Vec<String>,
    pub modseq: Option<u64>,
}

/// Flag state as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dialect", rename_all = "lowercase")]
pub enum RemoteFlags {
    Gmail(GmailFlagRecord),
    Generic(GenericFlagRecord),
}

impl RemoteFlags {
    pub fn modseq(&self) -> Option<u64> {
        match self {
            RemoteFlags::Gmail(record) => record.modseq,
            RemoteFlags::Generic(record) => record.modseq,
        }
    }

    /// Convert into the engine's record shape
    ///
    /// Fails with [`SyncError::MalformedRecord`] when a token is empty or
    /// contains control characters.
    pub fn normalize(&self, uid: u32, folder: &Folder) -> Result<FlagRecord> {
        let mut record = FlagRecord::default();

        match self {
            RemoteFlags::Gmail(gmail) => {
                for flag in &gmail.flags {
                    apply_imap_flag(&mut record, uid, flag)?;
                }
                for label in &gmail.labels {
                    apply_gmail_label(&mut record, uid, label)?;
                }
            }
            RemoteFlags::Generic(generic) => {
                for flag in &generic.flags {
                    apply_imap_flag(&mut record, uid, flag)?;
                }
                // Generic IMAP reports the full flag list, so absence is meaningful
                record.has_deleted_marker = Some(record.has_deleted_marker.unwrap_or(false));
                match folder.role {
                    Some(role) => {
                        record.canonical_flags.insert(role.canonical_flag());
                    }
                    None => {
                        record.custom_flags.insert(folder.name.clone());
                    }
                }
            }
        }

        Ok(record)
    }
}

fn check_token(uid: u32, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(SyncError::MalformedRecord {
            uid,
            reason: "empty flag".to_string(),
        });
    }
    if token.chars().any(|c| c.is_control()) {
        return Err(SyncError::MalformedRecord {
            uid,
            reason: format!("control character in flag {:?}", token),
        });
    }
    Ok(())
}

fn apply_imap_flag(record: &mut FlagRecord, uid: u32, flag: &str) -> Result<()> {
    check_token(uid, flag)?;

    if !flag.starts_with('\\') {
        record.extra_flags.insert(flag.to_string());
        return Ok(());
    }

    match flag.to_lowercase().as_str() {
        "\\seen" => record.is_seen = true,
        "\\flagged" => {
            record.canonical_flags.insert(CanonicalFlag::Starred);
        }
        "\\draft" => record.has_draft_marker = true,
        "\\deleted" => record.has_deleted_marker = Some(true),
        // \Answered, \Recent and server-specific system flags carry no category
        _ => {}
    }

    Ok(())
}

fn apply_gmail_label(record: &mut FlagRecord, uid: u32, label: &GmailLabel) -> Result<()> {
    let name = match label {
        GmailLabel::Id(id) => {
            record.custom_flags.insert(id.to_string());
            return Ok(());
        }
        GmailLabel::Name(name) => name,
    };

    check_token(uid, name)?;

    let Some(system) = name.strip_prefix('\\') else {
        record.custom_flags.insert(name.clone());
        return Ok(());
    };

    match system.to_lowercase().as_str() {
        "inbox" => {
            record.canonical_flags.insert(CanonicalFlag::Inbox);
        }
        "important" => {
            record.canonical_flags.insert(CanonicalFlag::Important);
        }
        "starred" => {
            record.canonical_flags.insert(CanonicalFlag::Starred);
        }
        "sent" => {
            record.canonical_flags.insert(CanonicalFlag::Sent);
        }
        "draft" | "drafts" => {
            record.canonical_flags.insert(CanonicalFlag::Drafts);
            record.has_draft_marker = true;
        }
        "trash" => {
            record.canonical_flags.insert(CanonicalFlag::Trash);
        }
        "spam" | "junk" => {
            record.canonical_flags.insert(CanonicalFlag::Spam);
        }
        _ => {
            record.custom_flags.insert(name.clone());
        }
    }

    Ok(())
}

/// Normalize a fetched batch, dropping malformed records
///
/// Returns the batch together with the number of skipped records.
pub fn normalize_batch(folder: &Folder, remote: &BTreeMap<u32, RemoteFlags>) -> (FlagBatch, usize) {
    let mut batch = FlagBatch::new();
    let mut skipped = 0;

    for (uid, flags) in remote {
        match flags.normalize(*uid, folder) {
            Ok(record) => {
                batch.insert(*uid, record);
            }
            Err(e) => {
                warn!(folder = %folder.name, error = %e, "Skipping malformed flag record");
                skipped += 1;
            }
        }
    }

    (batch, skipped)
}
