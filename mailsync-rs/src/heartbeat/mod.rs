//! Heartbeat registry
//!
//! Folder workers record progress under `account:folder:device` keys.
//! Schedulers and operators read those timestamps to spot stalled syncs, and
//! clear them to force a folder to be treated as never synced. An entry
//! never carries failure state: staleness is the signal.

pub mod client;
pub mod protocol;
pub mod server;
pub mod store;
pub mod types;

pub use client::HeartbeatClient;
pub use server::HeartbeatServer;
pub use store::{HeartbeatRegistry, MemoryHeartbeatRegistry};
pub use types::{HeartbeatEntry, HeartbeatKey, HeartbeatSelector};
