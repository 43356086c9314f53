use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay applied between two attempts of a supervised task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Restart right away; backoff is left to the outer process manager
    Immediate,
    /// Wait a fixed delay before each restart
    Fixed { delay_ms: u64 },
    /// Double the delay after each consecutive failure, up to `max_ms`
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Immediate
    }
}

impl RestartPolicy {
    /// Delay before restarting after the `failures`-th consecutive failure
    pub fn delay(&self, failures: u32) -> Duration {
        match self {
            RestartPolicy::Immediate => Duration::ZERO,
            RestartPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            RestartPolicy::Exponential { initial_ms, max_ms } => {
                let shift = failures.saturating_sub(1).min(32);
                let delay = initial_ms.saturating_mul(1u64 << shift);
                Duration::from_millis(delay.min(*max_ms))
            }
        }
    }
}

/// What the process does when a monitor escalates a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalAction {
    /// Drop the monitor and start a fresh one on the next scheduling pass
    #[default]
    RestartMonitor,
    /// Stop the whole sync process and let the process manager restart it
    StopProcess,
}

/// When retrying stops and failures are escalated instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Give up after this many consecutive transient failures (`None` retries forever)
    pub max_consecutive_failures: Option<u32>,
    /// An attempt that ran at least this long resets the failure counter
    pub reset_after_secs: u64,
    /// Reaction of the sync service to a fatal monitor exit
    pub on_fatal: FatalAction,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        EscalationPolicy {
            max_consecutive_failures: None,
            reset_after_secs: 60,
            on_fatal: FatalAction::RestartMonitor,
        }
    }
}

impl EscalationPolicy {
    /// Check if `failures` consecutive failures exhaust the retry budget
    pub fn should_give_up(&self, failures: u32) -> bool {
        self.max_consecutive_failures
            .map(|max| failures >= max)
            .unwrap_or(false)
    }

    pub fn reset_after(&self) -> Duration {
        Duration::from_secs(self.reset_after_secs)
    }
}
