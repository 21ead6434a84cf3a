use fdc_core::FinalizationStatus;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
};

use crate::{
    chain::FinalityOracle,
    error::AttestationError,
    poll::{
        Sleeper,
        TokioSleeper,
        sleep_or_cancel,
    },
};

/// Polls the relay at a fixed interval until a voting round is finalized.
#[derive(Clone)]
pub struct FinalizationWaiter {
    relay: Arc<dyn FinalityOracle>,
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
    timeout: Option<Duration>,
}

impl FinalizationWaiter {
    pub fn new(relay: Arc<dyn FinalityOracle>, interval: Duration) -> Self {
        Self {
            relay,
            sleeper: Arc::new(TokioSleeper),
            interval,
            timeout: None,
        }
    }

    /// Give up once the accumulated wait reaches `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Resolves on the first poll that reports the round finalized and
    /// returns the time spent waiting.
    pub async fn await_finalization(
        &self,
        protocol_id: u64,
        round_id: u64,
        cancel: &CancellationToken,
    ) -> Result<Duration, AttestationError> {
        let mut status = FinalizationStatus::Pending;
        let mut waited = Duration::ZERO;
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(AttestationError::Cancelled);
            }

            polls += 1;
            let finalized = self
                .relay
                .is_finalized(protocol_id, round_id)
                .await
                .map_err(|source| AttestationError::FinalityQueryFailed { round_id, source })?;
            status = status.observe(finalized);

            if status.is_finalized() {
                info!(round_id, polls, waited_secs = waited.as_secs(), "Voting round finalized");
                return Ok(waited);
            }

            if self.timeout.is_some_and(|timeout| waited >= timeout) {
                return Err(AttestationError::FinalizationTimeout { round_id, waited });
            }

            debug!(
                round_id,
                polls,
                "Round not finalized, polling again in {}s",
                self.interval.as_secs()
            );
            sleep_or_cancel(self.sleeper.as_ref(), self.interval, cancel).await?;
            waited += self.interval;
        }
    }
}
