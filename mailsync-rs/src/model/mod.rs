//! Domain types shared by the store, the reconciliation engine and the monitors

pub mod account;
pub mod flags;
pub mod folder;
pub mod message;

pub use account::{Account, AccountSnapshot, Dialect, NewAccount, SyncState};
pub use flags::{
    normalize_batch, CanonicalFlag, FlagBatch, FlagRecord, GenericFlagRecord, GmailFlagRecord,
    GmailLabel, RemoteFlags,
};
pub use folder::{Folder, FolderRole, FolderSyncStatus};
pub use message::{Category, CategoryRef, Message, RemoteUid};
