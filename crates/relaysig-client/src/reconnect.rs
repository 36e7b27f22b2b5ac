//! Reconnection decisions and backoff.

use rand::Rng;
use relaysig_core::{CLOSE_GOING_AWAY, CLOSE_NORMAL};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive retries before giving up. Default: 6
    pub max_attempts: u32,
    /// Delay before the first retry, doubled per attempt. Default: 1 second
    pub base_delay: Duration,
    /// Upper bound of the doubled delay. Default: 30 seconds
    pub max_delay: Duration,
    /// Uniform random extra in `[0, jitter)`. Default: 400 ms
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: Duration::from_millis(400),
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic part of the delay for 1-indexed `attempt`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Full delay for `attempt`, jitter included.
    pub fn delay_for<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..jitter_ms)
        };
        self.base_delay_for(attempt) + Duration::from_millis(extra)
    }
}

/// Whether a close with `code` is eligible for reconnection.
pub fn is_retryable(code: u16) -> bool {
    code != CLOSE_NORMAL && code != CLOSE_GOING_AWAY
}

/// Result of consulting the controller after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Not eligible, or a retry is already scheduled.
    Skip,
    /// Schedule attempt `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// The ceiling was reached; nothing is scheduled.
    Exhausted,
}

/// Retry counter plus the single pending-retry handle.
#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempts: u32,
    pending: Option<JoinHandle<()>>,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            pending: None,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Retries scheduled since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Decide what to do after a close with `code`. Counts the attempt when
    /// a retry is granted; the caller must then [`arm`](Self::arm) it.
    pub fn decide(&mut self, user_closed: bool, code: u16) -> RetryDecision {
        if user_closed || !is_retryable(code) || self.is_pending() {
            return RetryDecision::Skip;
        }
        if self.is_exhausted() {
            return RetryDecision::Exhausted;
        }
        self.attempts += 1;
        RetryDecision::Retry {
            attempt: self.attempts,
            delay: self.policy.delay_for(self.attempts, &mut rand::thread_rng()),
        }
    }

    /// Remember the task that will fire the scheduled retry.
    pub fn arm(&mut self, handle: JoinHandle<()>) {
        if let Some(stale) = self.pending.replace(handle) {
            stale.abort();
        }
    }

    /// The scheduled retry is running; forget its handle without aborting it.
    pub fn fired(&mut self) {
        self.pending = None;
    }

    /// Abort the scheduled retry, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
