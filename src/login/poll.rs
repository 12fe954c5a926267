//! Deadline-bounded polling.
//!
//! [`poll_until`] repeatedly asks a [`PollOnce`] for a value until one
//! arrives or the overall timeout elapses. It sleeps with Tokio's clock, so
//! tests can drive it with a paused runtime instead of real waiting.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::trace;

/// Timing of a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Wait before the first poll. Counts toward `timeout`.
    pub initial_delay: Duration,
    /// Wait between polls.
    pub interval: Duration,
    /// Overall budget, measured from the start of the call.
    pub timeout: Duration,
}

/// The overall timeout elapsed without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimedOut {
    /// Number of polls attempted.
    pub attempts: u32,
}

/// A single poll attempt.
///
/// Returning `None` means "not yet"; implementations swallow and log their
/// own per-attempt failures.
#[async_trait]
pub trait PollOnce: Send {
    /// The value being waited for.
    type Output: Send;

    /// Makes one attempt.
    async fn poll_once(&mut self) -> Option<Self::Output>;
}

/// Polls until a value arrives or `schedule.timeout` elapses.
///
/// A poll still in flight at the deadline is given at most one further
/// `interval` to finish, so the call never takes longer than
/// `timeout + interval`.
///
/// # Errors
///
/// Returns [`PollTimedOut`] if no poll produced a value in time.
pub async fn poll_until<P: PollOnce>(
    schedule: &PollSchedule,
    poller: &mut P,
) -> Result<P::Output, PollTimedOut> {
    let deadline = Instant::now() + schedule.timeout;
    let hard_stop = deadline + schedule.interval;
    let mut attempts = 0u32;

    if !schedule.initial_delay.is_zero() {
        tokio::time::sleep_until(deadline.min(Instant::now() + schedule.initial_delay)).await;
    }

    loop {
        attempts += 1;
        trace!(attempt = attempts, "Polling");

        if let Ok(Some(value)) = timeout_at(hard_stop, poller.poll_once()).await {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollTimedOut { attempts });
        }

        sleep(schedule.interval.min(deadline - now)).await;
    }
}
