//! Sleep, backoff and cancellation shared by the two waits.

use async_trait::async_trait;
use std::{
    cmp::min,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

use crate::error::AttestationError;

/// Source of delays. Tests swap in a sleeper that returns immediately.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Exponential backoff: doubles from `initial` on every failure, capped at
/// `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial: min(initial, max),
            max,
        }
    }

    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let mut delay = self.initial;
        for _ in 1..failures {
            if delay >= self.max {
                break;
            }
            delay = min(delay.saturating_mul(2), self.max);
        }
        delay
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub(crate) async fn sleep_or_cancel(
    sleeper: &dyn Sleeper,
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), AttestationError> {
    if cancel.is_cancelled() {
        return Err(AttestationError::Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AttestationError::Cancelled),
        () = sleeper.sleep(duration) => Ok(()),
    }
}
