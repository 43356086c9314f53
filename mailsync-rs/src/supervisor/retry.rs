use crate::error::{Result, SyncError};
use crate::supervisor::policy::{EscalationPolicy, RestartPolicy};
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Identity attached to every log line of a supervised task
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: &'static str,
    pub account_id: i64,
    pub provider: String,
    pub folder: Option<String>,
}

impl LogContext {
    pub fn new(component: &'static str, account_id: i64, provider: impl Into<String>) -> Self {
        Self {
            component,
            account_id,
            provider: provider.into(),
            folder: None,
        }
    }

    /// Narrow the context to one folder
    pub fn with_folder(&self, folder: impl Into<String>) -> Self {
        Self {
            folder: Some(folder.into()),
            ..self.clone()
        }
    }

    pub fn span(&self) -> Span {
        info_span!(
            "sync",
            component = self.component,
            account_id = self.account_id,
            provider = %self.provider,
            folder = self.folder.as_deref().unwrap_or("-"),
        )
    }

    pub fn describe(&self) -> String {
        match &self.folder {
            Some(folder) => format!(
                "{} for account {} ({}) folder {}",
                self.component, self.account_id, self.provider, folder
            ),
            None => format!(
                "{} for account {} ({})",
                self.component, self.account_id, self.provider
            ),
        }
    }
}

/// Run `task` forever, restarting it after retryable failures
///
/// Returns `Ok(())` only when `shutdown` is cancelled: the in-flight attempt
/// is dropped, which runs its teardown (open transactions roll back). Every
/// other way out is an error:
/// - a non-retryable error from the task, unchanged
/// - [`SyncError::MustRunForeverViolation`] when the task returns `Ok`
/// - [`SyncError::RetriesExhausted`] when the escalation policy gives up
pub async fn retry_with_logging<F, Fut>(
    mut task: F,
    restart: &RestartPolicy,
    escalation: &EscalationPolicy,
    ctx: &LogContext,
    shutdown: &CancellationToken,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let supervise = async {
        let mut failures: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                debug!("Shutdown already requested, not starting task");
                return Ok(());
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping {}", ctx.component);
                    return Ok(());
                }
                outcome = task() => outcome,
            };

            let e = match outcome {
                Ok(()) => {
                    error!("{} should run forever", ctx.component);
                    return Err(SyncError::MustRunForeverViolation(ctx.describe()));
                }
                Err(e) => e,
            };

            if !e.is_retryable() {
                error!(error = %e, kind = ?e.kind(), "Uncaught error in {}", ctx.component);
                return Err(e);
            }

            if started.elapsed() >= escalation.reset_after() {
                failures = 0;
            }
            failures = failures.saturating_add(1);

            if escalation.should_give_up(failures) {
                error!(error = %e, failures, "Giving up on {}", ctx.component);
                return Err(SyncError::RetriesExhausted {
                    attempts: failures,
                    last: Box::new(e),
                });
            }

            let delay = restart.delay(failures);
            warn!(
                error = %e,
                failures,
                delay_ms = delay.as_millis() as u64,
                "{} failed, restarting",
                ctx.component
            );

            if delay.is_zero() {
                // Let sibling tasks run even when every attempt fails instantly
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    };

    supervise.instrument(ctx.span()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx() -> LogContext {
        LogContext::new("test task", 1, "generic")
    }

    #[tokio::test]
    async fn test_restarts_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let shutdown = CancellationToken::new();

        let counter = Arc::clone(&attempts);
        let result = retry_with_logging(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(SyncError::Connection("connection reset".to_string()))
                    } else {
                        Ok(())
                    }
                }
            },
            &RestartPolicy::Immediate,
            &EscalationPolicy::default(),
            &ctx(),
            &shutdown,
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        match result {
            Err(SyncError::MustRunForeverViolation(desc)) => {
                assert!(desc.contains("account 1"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let shutdown = CancellationToken::new();

        let counter = Arc::clone(&attempts);
        let result = retry_with_logging(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::GrantRevoked("invalid_grant".to_string()))
                }
            },
            &RestartPolicy::Immediate,
            &EscalationPolicy::default(),
            &ctx(),
            &shutdown,
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_cancellation_stops_pending_task() {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = retry_with_logging(
            || async {
                std::future::pending::<()>().await;
                Ok(())
            },
            &RestartPolicy::Immediate,
            &EscalationPolicy::default(),
            &ctx(),
            &shutdown,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff() {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = retry_with_logging(
            || async { Err(SyncError::Connection("refused".to_string())) },
            &RestartPolicy::Fixed { delay_ms: 60_000 },
            &EscalationPolicy::default(),
            &ctx(),
            &shutdown,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_escalation_gives_up() {
        let attempts = Arc::new(AtomicU32::new(0));
        let shutdown = CancellationToken::new();
        let escalation = EscalationPolicy {
            max_consecutive_failures: Some(3),
            ..Default::default()
        };

        let counter = Arc::clone(&attempts);
        let result = retry_with_logging(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::Provider("temporary failure".to_string()))
                }
            },
            &RestartPolicy::Immediate,
            &escalation,
            &ctx(),
            &shutdown,
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result {
            Err(SyncError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, SyncError::Provider(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_log_context_describe() {
        let ctx = LogContext::new("folder worker", 42, "gmail").with_folder("INBOX");
        assert_eq!(
            ctx.describe(),
            "folder worker for account 42 (gmail) folder INBOX"
        );
    }
}
