use alloy::primitives::TxHash;
use fdc_core::{
    DecodeError,
    RoundError,
};
use std::{
    fmt,
    time::Duration,
};

use crate::{
    chain::ChainError,
    config::ConfigError,
    da::DaClientError,
    verifier::VerifierClientError,
};

/// Failure of one attestation stage.
///
/// Only [`ProofRetrievalExhausted`](Self::ProofRetrievalExhausted) and
/// [`ProofNotMaterialized`](Self::ProofNotMaterialized) are reached through
/// retries; every other variant is returned on the first occurrence.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("invalid attestation request: {0}")]
    InvalidRequest(#[source] VerifierClientError),
    #[error("request fee lookup failed: {0}")]
    FeeLookupFailed(#[source] ChainError),
    #[error("attestation submission failed: {0}")]
    SubmissionReverted(#[source] ChainError),
    #[error("attestation transaction {tx_hash} was mined but could not be confirmed: {source}")]
    SubmissionUnconfirmed {
        tx_hash: TxHash,
        #[source]
        source: ChainError,
    },
    #[error("could not read voting epoch configuration: {0}")]
    EpochConfigUnavailable(#[source] ChainError),
    #[error("submission does not fall into a voting round: {0}")]
    InvalidRound(#[from] RoundError),
    #[error("finality query for round {round_id} failed: {source}")]
    FinalityQueryFailed {
        round_id: u64,
        #[source]
        source: ChainError,
    },
    #[error("round {round_id} was not finalized within {waited:?}")]
    FinalizationTimeout { round_id: u64, waited: Duration },
    #[error("proof retrieval failed after {attempts} attempts: {last_error}")]
    ProofRetrievalExhausted {
        attempts: u32,
        #[source]
        last_error: DaClientError,
    },
    #[error("proof for round {round_id} not available after {polls} polls")]
    ProofNotMaterialized { round_id: u64, polls: u32 },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unknown attestation type {0:?}")]
    UnknownAttestationType(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<DecodeError> for AttestationError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownAttestationType(name) => Self::UnknownAttestationType(name),
            err @ DecodeError::MalformedResponse { .. } => Self::MalformedResponse(err.to_string()),
        }
    }
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Prepare,
    Fee,
    Submit,
    Finalization,
    Proof,
    Decode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::Fee => "fee",
            Self::Submit => "submit",
            Self::Finalization => "finalization",
            Self::Proof => "proof",
            Self::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// An [`AttestationError`] tagged with the stage it came from.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: AttestationError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: AttestationError) -> Self {
        Self { stage, source }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, AttestationError::Cancelled)
    }
}

/// Failure to build a pipeline from a [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("chain connection failed: {0}")]
    Chain(#[from] ChainError),
    #[error("verifier client setup failed: {0}")]
    Verifier(#[from] VerifierClientError),
    #[error("DA client setup failed: {0}")]
    Da(#[from] DaClientError),
}

pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E> AtStage<T> for Result<T, E>
where
    E: Into<AttestationError>,
{
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|err| PipelineError::new(stage, err.into()))
    }
}
