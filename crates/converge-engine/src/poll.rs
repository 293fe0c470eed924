//! Bounded polling.

use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};
use crate::intent::WaitPolicy;

/// Source of time for polling loops.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time with real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Result of one poll attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Terminal state reached.
    Ready(T),
    /// Still in progress; carries the observed state for logging.
    Pending(String),
}

/// Poll `check` until it reports [`PollStatus::Ready`], an error, or the policy's
/// timeout elapses.
///
/// The check always runs at least once. Sleeps never overshoot the deadline.
pub fn poll_until<T>(
    clock: &dyn Clock,
    policy: &WaitPolicy,
    operation: &str,
    mut check: impl FnMut() -> Result<PollStatus<T>>,
) -> Result<T> {
    let started = clock.now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let observed = match check()? {
            PollStatus::Ready(value) => return Ok(value),
            PollStatus::Pending(observed) => observed,
        };

        let elapsed = clock.now().saturating_duration_since(started);
        if elapsed >= policy.timeout {
            tracing::warn!(operation, attempt, state = %observed, "wait timed out");
            return Err(EngineError::Timeout {
                operation: operation.to_string(),
                elapsed,
            });
        }

        tracing::debug!(operation, attempt, state = %observed, "still waiting");
        clock.sleep(policy.interval.min(policy.timeout - elapsed));
    }
}
