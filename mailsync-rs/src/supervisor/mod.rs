//! Retry supervision for must-run-forever tasks
//!
//! Every long-running task in the sync engine (folder workers, account
//! monitors) runs under [`retry_with_logging`]:
//!
//! - transient failures are logged with the task's [`LogContext`] and the
//!   task is restarted according to its [`RestartPolicy`]
//! - permanent and fatal failures propagate to the caller untouched
//! - a normal return is a [`MustRunForeverViolation`](crate::SyncError::MustRunForeverViolation)
//! - a shutdown request stops the in-flight attempt and returns `Ok(())`

pub mod policy;
pub mod retry;

pub use policy::{EscalationPolicy, FatalAction, RestartPolicy};
pub use retry::{retry_with_logging, LogContext};
