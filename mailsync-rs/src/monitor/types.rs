use crate::auth::TokenProvider;
use crate::heartbeat::HeartbeatRegistry;
use crate::remote::MailboxConnector;
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of an account monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Running,
    Cleanup,
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorState::Starting => "starting",
            MonitorState::Running => "running",
            MonitorState::Cleanup => "cleanup",
            MonitorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why a monitor stopped without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    /// Shutdown was requested
    Shutdown,
    /// Credentials are unusable; the account was marked invalid
    NeedsAttention(String),
}

/// Collaborators shared by a monitor and its folder workers
#[derive(Clone)]
pub struct SyncDeps {
    /// Pool of the shard owning the account
    pub pool: SqlitePool,
    pub connector: Arc<dyn MailboxConnector>,
    pub tokens: Arc<dyn TokenProvider>,
    pub heartbeat: Arc<dyn HeartbeatRegistry>,
}
