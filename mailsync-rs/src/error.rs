use thiserror::Error;

/// How a failure must be handled by the supervisors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network hiccups, temporary provider errors: retry in place
    Transient,
    /// Revoked grant or invalid credential: stop and ask for operator attention
    Permanent,
    /// A single malformed or unresolvable record: skip it
    DataIntegrity,
    /// Programming errors and broken invariants: escalate
    Fatal,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("OAuth grant revoked: {0}")]
    GrantRevoked(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Heartbeat registry error: {0}")]
    Registry(String),

    #[error("Malformed flag record for uid {uid}: {reason}")]
    MalformedRecord { uid: u32, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No shard {shard_id} configured for account {account_id}")]
    ShardNotFound { account_id: i64, shard_id: i64 },

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    #[error("Task must run forever but returned: {0}")]
    MustRunForeverViolation(String),

    #[error("Monitor for account {account_id} escalated: {source}")]
    Escalated {
        account_id: i64,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Gave up after {attempts} consecutive failures: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },
}

impl SyncError {
    /// Classify the error per the sync error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Io(_)
            | SyncError::Connection(_)
            | SyncError::Provider(_)
            | SyncError::Auth(_)
            | SyncError::Database(_)
            | SyncError::Registry(_) => ErrorKind::Transient,
            SyncError::InvalidCredentials(_) | SyncError::GrantRevoked(_) => ErrorKind::Permanent,
            SyncError::MalformedRecord { .. }
            | SyncError::FolderNotFound(_)
            | SyncError::Json(_)
            | SyncError::Parse(_) => ErrorKind::DataIntegrity,
            SyncError::Config(_)
            | SyncError::ShardNotFound { .. }
            | SyncError::AccountNotFound(_)
            | SyncError::MustRunForeverViolation(_)
            | SyncError::TaskPanicked(_)
            | SyncError::Escalated { .. }
            | SyncError::RetriesExhausted { .. } => ErrorKind::Fatal,
        }
    }

    /// Whether the retry supervisor may restart the task after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::DataIntegrity)
    }

    /// Whether the account needs an operator before syncing again
    pub fn needs_attention(&self) -> bool {
        self.kind() == ErrorKind::Permanent
    }
}

impl From<::config::ConfigError> for SyncError {
    fn from(e: ::config::ConfigError) -> Self {
        SyncError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(SyncError::Connection("reset by peer".to_string()).is_retryable());
        assert!(SyncError::Auth("token expired".to_string()).is_retryable());
        assert!(SyncError::Registry("timeout".to_string()).is_retryable());
    }

    #[test]
    fn test_permanent_errors_need_attention() {
        let err = SyncError::GrantRevoked("invalid_grant".to_string());
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(!err.is_retryable());
        assert!(err.needs_attention());

        let err = SyncError::InvalidCredentials("bad password".to_string());
        assert!(err.needs_attention());
    }

    #[test]
    fn test_fatal_errors_escalate() {
        let err = SyncError::MustRunForeverViolation("folder worker".to_string());
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(!err.is_retryable());

        let err = SyncError::RetriesExhausted {
            attempts: 3,
            last: Box::new(SyncError::Connection("refused".to_string())),
        };
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("3 consecutive failures"));
    }

    #[test]
    fn test_malformed_record_is_data_integrity() {
        let err = SyncError::MalformedRecord {
            uid: 7,
            reason: "empty flag".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }
}
