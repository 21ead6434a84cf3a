//! Voting-round arithmetic.
//!
//! A voting round is a fixed-length window starting at the first voting round
//! start timestamp. The round a request falls into is derived from the
//! timestamp of the block that included the submission, with the same integer
//! division the attestation network uses.

use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("voting epoch duration is zero")]
    ZeroDuration,
    #[error("timestamp {timestamp} precedes the first voting round start {first_round_start}")]
    BeforeFirstRound {
        timestamp: u64,
        first_round_start: u64,
    },
}

/// Epoch configuration read from the systems manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochConfig {
    pub first_voting_round_start_ts: u64,
    pub voting_epoch_duration_seconds: u64,
}

impl EpochConfig {
    pub const fn new(first_voting_round_start_ts: u64, voting_epoch_duration_seconds: u64) -> Self {
        Self {
            first_voting_round_start_ts,
            voting_epoch_duration_seconds,
        }
    }

    /// Round containing `timestamp`:
    /// `floor((timestamp - first_start) / duration)`.
    pub fn round_at(&self, timestamp: u64) -> Result<VotingRound, RoundError> {
        if self.voting_epoch_duration_seconds == 0 {
            return Err(RoundError::ZeroDuration);
        }
        let elapsed = timestamp
            .checked_sub(self.first_voting_round_start_ts)
            .ok_or(RoundError::BeforeFirstRound {
                timestamp,
                first_round_start: self.first_voting_round_start_ts,
            })?;

        Ok(VotingRound {
            id: elapsed / self.voting_epoch_duration_seconds,
            epoch_start_timestamp: self.first_voting_round_start_ts,
            epoch_duration_seconds: self.voting_epoch_duration_seconds,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingRound {
    pub id: u64,
    pub epoch_start_timestamp: u64,
    pub epoch_duration_seconds: u64,
}

impl VotingRound {
    pub const fn start_timestamp(&self) -> u64 {
        self.epoch_start_timestamp
            .saturating_add(self.id.saturating_mul(self.epoch_duration_seconds))
    }

    /// First timestamp of the following round.
    pub const fn end_timestamp(&self) -> u64 {
        self.start_timestamp()
            .saturating_add(self.epoch_duration_seconds)
    }
}

/// Finalization state of one `(protocol id, round id)` pair.
///
/// Only moves forward: once a round is finalized it stays finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalizationStatus {
    #[default]
    Pending,
    Finalized,
}

impl FinalizationStatus {
    /// Fold one relay observation into the status.
    #[must_use]
    pub const fn observe(self, finalized: bool) -> Self {
        match (self, finalized) {
            (Self::Finalized, _) | (Self::Pending, true) => Self::Finalized,
            (Self::Pending, false) => Self::Pending,
        }
    }

    pub const fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized)
    }
}
