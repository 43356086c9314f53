//! Account sync monitors
//!
//! One [`AccountSyncMonitor`] per account owns a [`WorkerSet`] with one
//! supervised [`FolderWorker`] per folder:
//!
//! ```text
//! Starting -> Running -> Cleanup -> Stopped
//!               |  ^
//!               v  |  every folder_refresh_interval:
//!          list folders, start new workers, stop removed ones,
//!          restart workers whose folder role changed
//! ```
//!
//! A retryable worker failure restarts only that worker. Credential
//! failures park the account (`NeedsAttention`); fatal errors leave through
//! `Err` so the service can apply its escalation policy.

pub mod account;
pub mod types;
pub mod worker;
pub mod workers;

pub use account::{AccountSyncMonitor, MonitorHandle};
pub use types::{MonitorExit, MonitorState, SyncDeps};
pub use worker::FolderWorker;
pub use workers::{WorkerExit, WorkerSet};
