use alloy::primitives::{
    TxHash,
    U256,
};
use fdc_core::{
    EncodedRequest,
    VotingRound,
};
use std::sync::Arc;
use tracing::{
    info,
    warn,
};

use super::{
    AttestationHub,
    EpochSource,
};
use crate::error::AttestationError;

/// Epochs the systems manager may be ahead of the computed round by the time
/// the receipt has been read.
const MAX_EPOCH_LAG: u64 = 2;

/// A request accepted by the hub, with the voting round it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedRequest {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub round: VotingRound,
}

impl SubmittedRequest {
    pub const fn round_id(&self) -> u64 {
        self.round.id
    }
}

/// Pays for and submits encoded requests, then places them in a voting round.
///
/// Submitting the same encoded request twice sends two transactions and pays
/// twice; each lands in whatever round its block falls into.
#[derive(Clone)]
pub struct RequestSubmitter {
    hub: Arc<dyn AttestationHub>,
    epochs: Arc<dyn EpochSource>,
}

impl RequestSubmitter {
    pub fn new(hub: Arc<dyn AttestationHub>, epochs: Arc<dyn EpochSource>) -> Self {
        Self { hub, epochs }
    }

    pub async fn submit(
        &self,
        request: &EncodedRequest,
        fee: U256,
    ) -> Result<SubmittedRequest, AttestationError> {
        let receipt = self
            .hub
            .request_attestation(request, fee)
            .await
            .map_err(|err| {
                match err.mined_tx() {
                    Some(tx_hash) => AttestationError::SubmissionUnconfirmed {
                        tx_hash,
                        source: err,
                    },
                    None => AttestationError::SubmissionReverted(err),
                }
            })?;

        let epoch = self
            .epochs
            .epoch_config()
            .await
            .map_err(AttestationError::EpochConfigUnavailable)?;
        let round = epoch.round_at(receipt.block_timestamp)?;

        match self.epochs.current_voting_epoch_id().await {
            Ok(current) if current < round.id || current > round.id.saturating_add(MAX_EPOCH_LAG) => {
                warn!(
                    round_id = round.id,
                    current_epoch = current,
                    "Computed voting round disagrees with the systems manager"
                );
            }
            Ok(_) => {}
            Err(err) => warn!(error = ?err, "Failed to read current voting epoch"),
        }

        info!(
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            round_id = round.id,
            "Attestation request submitted"
        );

        Ok(SubmittedRequest {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            block_timestamp: receipt.block_timestamp,
            round,
        })
    }
}
