use fdc_core::{
    EncodedRequest,
    Proof,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::{
    config::PollingConfig,
    da::ProofSource,
    error::AttestationError,
    poll::{
        Backoff,
        Sleeper,
        TokioSleeper,
        sleep_or_cancel,
    },
};

/// Polls the DA layer for the proof of a request in a finalized round.
///
/// Two limits apply. Hard failures (transport errors, non-2xx) count as
/// attempts, are retried with exponential backoff and end the retrieval once
/// `max_attempts` is spent. "Not ready yet" answers are polled at the shorter
/// pending interval, do not consume attempts and are bounded separately by
/// `max_pending_polls`. A 2xx answer that cannot be parsed fails at once.
#[derive(Clone)]
pub struct ProofRetriever {
    source: Arc<dyn ProofSource>,
    sleeper: Arc<dyn Sleeper>,
    max_attempts: u32,
    backoff: Backoff,
    pending_interval: Duration,
    max_pending_polls: u32,
}

impl ProofRetriever {
    pub fn new(source: Arc<dyn ProofSource>, polling: &PollingConfig) -> Self {
        Self {
            source,
            sleeper: Arc::new(TokioSleeper),
            max_attempts: polling.proof_max_attempts.max(1),
            backoff: Backoff::new(polling.proof_backoff_initial(), polling.proof_backoff_max()),
            pending_interval: polling.proof_pending_interval(),
            max_pending_polls: polling.proof_max_pending_polls.max(1),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn retrieve_proof(
        &self,
        request: &EncodedRequest,
        round_id: u64,
        cancel: &CancellationToken,
    ) -> Result<Proof, AttestationError> {
        let mut failures = 0u32;
        let mut pending = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(AttestationError::Cancelled);
            }

            match self.source.fetch_proof(round_id, request).await {
                Ok(Some(proof)) => {
                    info!(
                        round_id,
                        merkle_depth = proof.merkle_path.len(),
                        attempts = failures + 1,
                        "Proof retrieved"
                    );
                    return Ok(proof);
                }
                Ok(None) => {
                    pending += 1;
                    if pending >= self.max_pending_polls {
                        return Err(AttestationError::ProofNotMaterialized {
                            round_id,
                            polls: pending,
                        });
                    }
                    debug!(round_id, pending, "Proof not available yet");
                    sleep_or_cancel(self.sleeper.as_ref(), self.pending_interval, cancel).await?;
                }
                Err(err) if err.is_transient() => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        error!(
                            error = ?err,
                            round_id,
                            "Proof retrieval failed after {failures} attempts, giving up"
                        );
                        return Err(AttestationError::ProofRetrievalExhausted {
                            attempts: failures,
                            last_error: err,
                        });
                    }
                    let delay = self.backoff.delay(failures);
                    warn!(
                        error = ?err,
                        round_id,
                        "Proof request failed (attempt {failures}/{}), retrying in {}s",
                        self.max_attempts,
                        delay.as_secs()
                    );
                    sleep_or_cancel(self.sleeper.as_ref(), delay, cancel).await?;
                }
                Err(err) => return Err(AttestationError::MalformedResponse(err.to_string())),
            }
        }
    }
}
