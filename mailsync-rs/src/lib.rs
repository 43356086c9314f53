//! mailsync-rs: mailbox sync supervisor and metadata reconciliation
//!
//! Keeps one restartable sync running per account across a fleet of
//! processes, and folds remote flag/label state into a local category
//! model.
//!
//! # Features
//!
//! - **Retry supervisor**: restarts failing tasks in place, escalates
//!   tasks that return when they must run forever
//! - **Account monitors**: one per account, one supervised worker per folder,
//!   folder set refreshed on an interval
//! - **Reconciliation**: Gmail labels and generic IMAP flags normalized into
//!   categories, draft state bound to the drafts folder role
//! - **Heartbeat registry**: `account:folder:device` liveness keys, served
//!   over a small TCP line protocol
//! - **Fleet placement**: accounts are claimed by the host named in
//!   `desired_sync_host`, across SQLite shards
//!
//! # Example
//!
//! ```no_run
//! use mailsync_rs::heartbeat::{HeartbeatClient, HeartbeatRegistry, HeartbeatSelector};
//!
//! #[tokio::main]
//! async fn main() -> mailsync_rs::Result<()> {
//!     let registry = HeartbeatClient::new("127.0.0.1:7480");
//!     let cleared = registry.clear(&HeartbeatSelector::account(5)).await?;
//!     println!("{} folders cleared.", cleared);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`supervisor`]: retry supervisor and restart/escalation policies
//! - [`monitor`]: account monitors and folder workers
//! - [`reconcile`]: metadata reconciliation engine
//! - [`heartbeat`]: liveness registry, server and client
//! - [`service`]: per-process scheduler
//! - [`store`], [`shard`]: local database and shard directory
//! - [`auth`], [`remote`]: credential and mailbox protocol seams

pub mod auth;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod reconcile;
pub mod remote;
pub mod service;
pub mod shard;
pub mod store;
pub mod supervisor;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorKind, Result, SyncError};
